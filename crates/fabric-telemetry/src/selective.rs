//! # Selective Span Processor
//!
//! Holds ended spans in a ring buffer instead of exporting them. Spans reach
//! the downstream processor only once their trace is selected, typically
//! because a request in that trace failed. Spans of a trace that is already
//! selected pass straight through.
//!
//! ```text
//!   on_end(span) ──► selected? ──yes──► downstream.on_end
//!                       │
//!                       no
//!                       ▼
//!                ┌──────────────┐   select(trace)   ┌────────────┐
//!                │ ring (65536) │ ────────────────► │ downstream │
//!                └──────────────┘  flush matching   └────────────┘
//! ```
//!
//! The ring overwrites its oldest slot on wrap. The selection table is
//! compacted to its newest half once it grows past `SELECTION_CAPACITY`.

use opentelemetry::trace::{TraceId, TraceResult};
use opentelemetry::Context;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::trace::{Span, SpanProcessor};
use opentelemetry_sdk::Resource;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Ring buffer slots.
pub const RING_CAPACITY: usize = 65_536;

/// Selected traces remembered before compaction.
pub const SELECTION_CAPACITY: usize = 1024;

trait HasTraceId {
    fn trace_id(&self) -> TraceId;
}

impl HasTraceId for SpanData {
    fn trace_id(&self) -> TraceId {
        self.span_context.trace_id()
    }
}

struct SelectiveState<S> {
    ring: Vec<Option<S>>,
    capacity: usize,
    insert_point: usize,
    selected: HashMap<TraceId, u64>,
    generation: u64,
    stopped: bool,
}

impl<S: HasTraceId> SelectiveState<S> {
    fn new(capacity: usize) -> Self {
        Self {
            ring: Vec::new(),
            capacity: capacity.max(1),
            insert_point: 0,
            selected: HashMap::with_capacity(SELECTION_CAPACITY),
            generation: 0,
            stopped: false,
        }
    }

    /// Buffers the span, or hands it back if it must be forwarded.
    fn on_end(&mut self, span: S) -> Option<S> {
        if self.stopped {
            return None;
        }
        if self.selected.contains_key(&span.trace_id()) {
            return Some(span);
        }
        if self.ring.len() < self.capacity {
            self.ring.push(Some(span));
        } else {
            self.ring[self.insert_point] = Some(span);
        }
        self.insert_point = (self.insert_point + 1) % self.capacity;
        None
    }

    /// Records the selection and drains matching spans, oldest first.
    fn select(&mut self, trace_id: TraceId) -> Vec<S> {
        if self.stopped || self.selected.contains_key(&trace_id) {
            return Vec::new();
        }

        let len = self.ring.len();
        let start = if len < self.capacity { 0 } else { self.insert_point };
        let mut flushed = Vec::new();
        for i in 0..len {
            let slot = &mut self.ring[(start + i) % len];
            if slot.as_ref().is_some_and(|s| s.trace_id() == trace_id) {
                flushed.extend(slot.take());
            }
        }

        self.generation += 1;
        self.selected.insert(trace_id, self.generation);
        if self.selected.len() > SELECTION_CAPACITY {
            self.compact();
        }
        flushed
    }

    fn compact(&mut self) {
        let half = (self.selected.len() / 2) as u64;
        self.selected.retain(|_, generation| *generation > half);
        for generation in self.selected.values_mut() {
            *generation -= half;
        }
        self.generation -= half;
    }

    fn is_selected(&self, trace_id: &TraceId) -> bool {
        self.selected.contains_key(trace_id)
    }

    fn buffered(&self) -> usize {
        self.ring.iter().filter(|s| s.is_some()).count()
    }

    fn shutdown(&mut self) {
        self.stopped = true;
        self.ring = Vec::new();
        self.insert_point = 0;
        self.selected.clear();
    }
}

struct Inner<P> {
    state: Mutex<SelectiveState<SpanData>>,
    downstream: RwLock<P>,
}

/// Span processor that exports a trace only after it is selected.
///
/// Clones share state, so keep one clone to call `select` on and hand another
/// to the tracer provider.
pub struct SelectiveProcessor<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for SelectiveProcessor<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: SpanProcessor> fmt::Debug for SelectiveProcessor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SelectiveProcessor")
            .field("buffered", &state.buffered())
            .field("selected", &state.selected.len())
            .field("stopped", &state.stopped)
            .field("downstream", &*self.inner.downstream.read())
            .finish()
    }
}

impl<P: SpanProcessor> SelectiveProcessor<P> {
    pub fn new(downstream: P) -> Self {
        Self::with_capacity(downstream, RING_CAPACITY)
    }

    pub fn with_capacity(downstream: P, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SelectiveState::new(capacity)),
                downstream: RwLock::new(downstream),
            }),
        }
    }

    /// Exports every buffered span of the trace and every later one.
    pub fn select(&self, trace_id: TraceId) {
        if trace_id == TraceId::INVALID {
            return;
        }
        let flushed = self.inner.state.lock().select(trace_id);
        if !flushed.is_empty() {
            debug!(trace_id = %trace_id, spans = flushed.len(), "Trace selected");
        }
        let downstream = self.inner.downstream.read();
        for span in flushed {
            downstream.on_end(span);
        }
    }

    pub fn is_selected(&self, trace_id: TraceId) -> bool {
        self.inner.state.lock().is_selected(&trace_id)
    }

    /// Spans waiting in the ring.
    pub fn buffered(&self) -> usize {
        self.inner.state.lock().buffered()
    }
}

impl<P: SpanProcessor> SpanProcessor for SelectiveProcessor<P> {
    fn on_start(&self, span: &mut Span, cx: &Context) {
        self.inner.downstream.read().on_start(span, cx);
    }

    fn on_end(&self, span: SpanData) {
        let forward = self.inner.state.lock().on_end(span);
        if let Some(span) = forward {
            self.inner.downstream.read().on_end(span);
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        self.inner.downstream.read().force_flush()
    }

    fn shutdown(&self) -> TraceResult<()> {
        self.inner.state.lock().shutdown();
        self.inner.downstream.read().shutdown()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.downstream.write().set_resource(resource);
    }
}
