//! # Bus Subscription
//!
//! Receiving side of the transport.

use bytes::Bytes;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::debug;

/// A message delivered on a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub subject: String,
    pub payload: Bytes,
}

type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

/// A subscription handle for receiving messages.
///
/// When dropped, the subscription is removed from the transport.
pub struct BusSubscription {
    subject: String,
    queue: Option<String>,
    receiver: mpsc::Receiver<BusMessage>,
    unsubscribe: Option<Unsubscribe>,
}

impl BusSubscription {
    /// Creates a subscription. `unsubscribe` runs once, on drop.
    pub fn new(
        subject: impl Into<String>,
        queue: Option<String>,
        receiver: mpsc::Receiver<BusMessage>,
        unsubscribe: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            subject: subject.into(),
            queue,
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Receive the next message.
    ///
    /// Returns `None` once the transport is closed.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    /// Receive without waiting. `None` when nothing is buffered.
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        self.receiver.try_recv().ok()
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }
}

impl fmt::Debug for BusSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusSubscription")
            .field("subject", &self.subject)
            .field("queue", &self.queue)
            .finish()
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
        debug!(subject = %self.subject, "Subscription dropped");
    }
}

impl Stream for BusSubscription {
    type Item = BusMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
