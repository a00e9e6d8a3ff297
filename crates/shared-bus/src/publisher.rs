//! # Transport
//!
//! Defines the publishing side of the bus and the in-memory implementation.

use crate::subscriber::{BusMessage, BusSubscription};
use crate::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_PAYLOAD};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use shared_types::{ErrorKind, TracedError};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Errors from transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("invalid subject: {0:?}")]
    InvalidSubject(String),

    #[error("transport closed")]
    Closed,
}

impl From<TransportError> for TracedError {
    fn from(err: TransportError) -> Self {
        let kind = match err {
            TransportError::PayloadTooLarge { .. } | TransportError::InvalidSubject(_) => {
                ErrorKind::InvalidArgument
            }
            TransportError::Closed => ErrorKind::Internal,
        };
        TracedError::from_error(err).of_kind(kind)
    }
}

/// A subject-addressed message bus.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Publish a payload to a subject.
    ///
    /// Returns the number of subscribers the payload was delivered to.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<usize, TransportError>;

    /// Subscribe to a subject, optionally as a member of a queue group.
    async fn subscribe(
        &self,
        subject: &str,
        queue: Option<&str>,
    ) -> Result<BusSubscription, TransportError>;

    /// Largest payload `publish` accepts.
    fn max_payload(&self) -> usize;

    /// Per-subscriber buffer size.
    fn channel_capacity(&self) -> usize {
        DEFAULT_CHANNEL_CAPACITY
    }
}

#[derive(Debug)]
struct Member {
    id: u64,
    sender: mpsc::Sender<BusMessage>,
}

#[derive(Debug, Default)]
struct QueueGroup {
    members: Vec<Member>,
    next: usize,
}

#[derive(Debug, Default)]
struct SubjectEntry {
    pervasive: Vec<Member>,
    groups: HashMap<String, QueueGroup>,
}

impl SubjectEntry {
    fn len(&self) -> usize {
        self.pervasive.len() + self.groups.values().map(|g| g.members.len()).sum::<usize>()
    }

    fn remove(&mut self, id: u64) {
        self.pervasive.retain(|m| m.id != id);
        for group in self.groups.values_mut() {
            group.members.retain(|m| m.id != id);
        }
        self.groups.retain(|_, g| !g.members.is_empty());
    }
}

type SubjectTable = Arc<RwLock<HashMap<String, SubjectEntry>>>;

/// In-memory implementation of the bus.
///
/// Suitable for single-process operation and tests; networked deployments
/// implement `Transport` over a real broker.
#[derive(Debug)]
pub struct InMemoryBus {
    subjects: SubjectTable,
    next_id: AtomicU64,
    messages_published: AtomicU64,
    closed: AtomicBool,
    max_payload: usize,
    capacity: usize,
}

impl InMemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_PAYLOAD, DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_limits(max_payload: usize, capacity: usize) -> Self {
        Self {
            subjects: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            messages_published: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            max_payload: max_payload.max(1),
            capacity: capacity.max(1),
        }
    }

    /// Number of live subscriptions on a subject.
    #[must_use]
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.subjects.read().get(subject).map_or(0, SubjectEntry::len)
    }

    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// Closes the bus. Every subscription stream ends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subjects.write().clear();
    }

    fn deliver(member: &Member, msg: &BusMessage) -> bool {
        match member.sender.try_send(msg.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subject = %msg.subject, "Subscriber buffer full, message dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<usize, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if payload.len() > self.max_payload {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        let msg = BusMessage {
            subject: subject.to_string(),
            payload,
        };
        let mut delivered = 0;

        let mut subjects = self.subjects.write();
        if let Some(entry) = subjects.get_mut(subject) {
            for member in &entry.pervasive {
                if Self::deliver(member, &msg) {
                    delivered += 1;
                }
            }
            for (name, group) in entry.groups.iter_mut() {
                let len = group.members.len();
                // Round robin, skipping members whose receiver is gone.
                for attempt in 0..len {
                    let idx = (group.next + attempt) % len;
                    let member = &group.members[idx];
                    if member.sender.is_closed() {
                        continue;
                    }
                    group.next = (idx + 1) % len;
                    if Self::deliver(member, &msg) {
                        delivered += 1;
                    } else {
                        debug!(subject, queue = %name, "Queue member rejected message");
                    }
                    break;
                }
            }
        }
        drop(subjects);

        debug!(subject, receivers = delivered, "Message published");
        Ok(delivered)
    }

    async fn subscribe(
        &self,
        subject: &str,
        queue: Option<&str>,
    ) -> Result<BusSubscription, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if subject.is_empty() {
            return Err(TransportError::InvalidSubject(subject.to_string()));
        }

        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let member = Member { id, sender };
        let queue = queue.filter(|q| !q.is_empty()).map(str::to_string);

        {
            let mut subjects = self.subjects.write();
            let entry = subjects.entry(subject.to_string()).or_default();
            match &queue {
                Some(name) => entry.groups.entry(name.clone()).or_default().members.push(member),
                None => entry.pervasive.push(member),
            }
        }
        debug!(subject, queue = ?queue, "New subscription created");

        let table = self.subjects.clone();
        let key = subject.to_string();
        Ok(BusSubscription::new(subject, queue, receiver, move || {
            let mut subjects = table.write();
            if let Some(entry) = subjects.get_mut(&key) {
                entry.remove(id);
                if entry.len() == 0 {
                    subjects.remove(&key);
                }
            }
        }))
    }

    fn max_payload(&self) -> usize {
        self.max_payload
    }

    fn channel_capacity(&self) -> usize {
        self.capacity
    }
}
