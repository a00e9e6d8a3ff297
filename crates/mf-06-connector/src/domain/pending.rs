//! # Pending Calls
//!
//! Maps outbound message IDs to the channel their replies are delivered on.
//!
//! 1. The caller registers and receives the reading end of the channel
//! 2. The request is published with the message ID in its frame
//! 3. The reply reader delivers acks, responses and errors by message ID
//! 4. The caller drops its `PendingGuard`, which evicts the entry

use super::wire::Reply;
use dashmap::DashMap;
use shared_types::TracedError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

struct PendingCall {
    sender: mpsc::Sender<Reply>,
    created_at: Instant,
    topic: String,
}

#[derive(Debug, Default)]
pub struct PendingStats {
    pub registered: AtomicU64,
    pub delivered: AtomicU64,
    pub dropped: AtomicU64,
    pub evicted: AtomicU64,
}

#[derive(Default)]
pub struct PendingStore {
    calls: DashMap<u64, PendingCall>,
    next_id: AtomicU64,
    stats: PendingStats,
}

impl std::fmt::Debug for PendingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingStore")
            .field("pending", &self.calls.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next message ID and its reply channel.
    pub fn register(
        self: &Arc<Self>,
        topic: &str,
        capacity: usize,
    ) -> (PendingGuard, mpsc::Receiver<Reply>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        self.calls.insert(
            id,
            PendingCall {
                sender,
                created_at: Instant::now(),
                topic: topic.to_string(),
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        debug!(msg_id = id, topic, "Registered pending call");
        (
            PendingGuard {
                store: self.clone(),
                id,
            },
            receiver,
        )
    }

    /// Hands a reply to the waiting caller. Returns false when no caller
    /// waits on `id` any more.
    pub fn deliver(&self, id: u64, reply: Reply) -> bool {
        let Some(call) = self.calls.get(&id) else {
            debug!(msg_id = id, "Reply for unknown or finished call");
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        match call.sender.try_send(reply) {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(msg_id = id, topic = %call.topic, "Reply buffer full, dropping reply");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => {
                drop(call);
                self.calls.remove(&id);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Fails the call with `err`.
    pub fn fail(&self, id: u64, err: TracedError) -> bool {
        self.deliver(id, Reply::Failed(err))
    }

    pub fn remove(&self, id: u64) -> bool {
        let removed = self.calls.remove(&id).is_some();
        if removed {
            self.stats.evicted.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Fails every waiting call. Used on shutdown.
    pub fn fail_all(&self, err: &TracedError) -> usize {
        let ids: Vec<u64> = self.calls.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.fail(*id, err.clone()))
            .count()
    }

    /// Calls older than `age`, for diagnostics.
    pub fn older_than(&self, age: Duration) -> Vec<u64> {
        self.calls
            .iter()
            .filter(|entry| entry.created_at.elapsed() > age)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.calls.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

/// Evicts its call from the store when dropped.
#[derive(Debug)]
pub struct PendingGuard {
    store: Arc<PendingStore>,
    id: u64,
}

impl PendingGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.store.remove(self.id);
    }
}
