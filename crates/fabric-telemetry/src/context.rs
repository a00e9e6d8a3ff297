//! Trace context propagation over the bus.
//!
//! When a request crosses a service boundary the active span's context is
//! written into the W3C `traceparent` header. The receiving connector parses
//! it and parents the handler span on it, so both sides share a trace ID.
//!
//! ## How It Works
//!
//! 1. The publisher calls `PropagatedContext::from_span` on its span
//! 2. `to_traceparent` renders the header value
//! 3. The subscriber calls `parse_traceparent` on the inbound header
//! 4. `attach_to` makes the handler span a child of the remote span

use opentelemetry::{
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context,
};
use serde::{Deserialize, Serialize};
use tracing_opentelemetry::OpenTelemetrySpanExt;

const TRACEPARENT_VERSION: &str = "00";

/// Trace context that can be serialized and sent across process boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagatedContext {
    /// Trace ID (32 hex characters)
    pub trace_id: String,
    /// Parent span ID (16 hex characters)
    pub span_id: String,
    /// Trace flags (sampled, etc.)
    pub trace_flags: u8,
}

impl PropagatedContext {
    /// Create an empty context (no parent trace)
    pub fn empty() -> Self {
        Self {
            trace_id: "00000000000000000000000000000000".to_string(),
            span_id: "0000000000000000".to_string(),
            trace_flags: 0,
        }
    }

    /// Check if this context is valid (has a real trace)
    pub fn is_valid(&self) -> bool {
        !self.trace_id.chars().all(|c| c == '0')
    }

    /// Context of a `tracing` span, as seen by the OpenTelemetry layer.
    ///
    /// Empty when no OpenTelemetry layer is installed.
    pub fn from_span(span: &tracing::Span) -> Self {
        Self::from_span_context(span.context().span().span_context())
    }

    pub fn from_span_context(ctx: &SpanContext) -> Self {
        if !ctx.is_valid() {
            return Self::empty();
        }
        Self {
            trace_id: ctx.trace_id().to_string(),
            span_id: ctx.span_id().to_string(),
            trace_flags: ctx.trace_flags().to_u8(),
        }
    }

    /// Parse a W3C `traceparent` header value.
    pub fn parse_traceparent(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;
        if version.len() != 2 || trace_id.len() != 32 || span_id.len() != 16 || flags.len() != 2 {
            return None;
        }
        TraceId::from_hex(trace_id).ok()?;
        SpanId::from_hex(span_id).ok()?;
        let ctx = Self {
            trace_id: trace_id.to_lowercase(),
            span_id: span_id.to_lowercase(),
            trace_flags: u8::from_str_radix(flags, 16).ok()?,
        };
        ctx.is_valid().then_some(ctx)
    }

    /// Render as a W3C `traceparent` header value. `None` when empty.
    pub fn to_traceparent(&self) -> Option<String> {
        self.is_valid().then(|| {
            format!(
                "{}-{}-{}-{:02x}",
                TRACEPARENT_VERSION, self.trace_id, self.span_id, self.trace_flags
            )
        })
    }

    pub fn trace_id(&self) -> Option<TraceId> {
        if !self.is_valid() {
            return None;
        }
        TraceId::from_hex(&self.trace_id).ok()
    }

    /// Convert to an OpenTelemetry `Context` holding a remote parent.
    pub fn to_context(&self) -> Context {
        if !self.is_valid() {
            return Context::new();
        }
        let trace_id = TraceId::from_hex(&self.trace_id).unwrap_or(TraceId::INVALID);
        let span_id = SpanId::from_hex(&self.span_id).unwrap_or(SpanId::INVALID);
        let span_context = SpanContext::new(
            trace_id,
            span_id,
            TraceFlags::new(self.trace_flags),
            true,
            TraceState::default(),
        );
        Context::new().with_remote_span_context(span_context)
    }

    /// Make `span` a child of this remote context.
    pub fn attach_to(&self, span: &tracing::Span) {
        if self.is_valid() {
            span.set_parent(self.to_context());
        }
    }
}

impl Default for PropagatedContext {
    fn default() -> Self {
        Self::empty()
    }
}
