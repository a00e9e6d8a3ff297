//! # Call Context
//!
//! Every async fabric operation takes a `CallContext`. It carries a
//! cancellation token, an optional deadline and the depth of the call chain.
//! Children inherit the parent's token (cancelling the parent cancels the
//! child) and can only shorten the deadline.

use crate::errors::ErrorKind;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    call_depth: u32,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

impl CallContext {
    /// Root context: never cancelled by a parent, no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            call_depth: 0,
        }
    }

    /// Root context cancelled together with `token`.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
            call_depth: 0,
        }
    }

    /// Child context whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context with the earlier of the two deadlines.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
            call_depth: self.call_depth,
        }
    }

    /// Child context with the same deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            call_depth: self.call_depth,
        }
    }

    pub fn with_call_depth(mut self, depth: u32) -> Self {
        self.call_depth = depth;
        self
    }

    pub fn call_depth(&self) -> u32 {
        self.call_depth
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ErrorKind {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => ErrorKind::Cancelled,
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => ErrorKind::Timeout,
                }
            }
            None => {
                self.token.cancelled().await;
                ErrorKind::Cancelled
            }
        }
    }
}
