//! Lifecycle and ticker callbacks.

use futures::future::BoxFuture;
use shared_types::{CallContext, TracedError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub type CallbackHandler =
    Arc<dyn Fn(CallContext) -> BoxFuture<'static, Result<(), TracedError>> + Send + Sync>;

/// Wraps an async function as a `CallbackHandler`.
pub fn callback<F, Fut>(f: F) -> CallbackHandler
where
    F: Fn(CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TracedError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// A named callback. A zero budget means no bound.
#[derive(Clone)]
pub struct Callback {
    pub name: String,
    pub time_budget: Duration,
    pub interval: Option<Duration>,
    pub handler: CallbackHandler,
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("name", &self.name)
            .field("time_budget", &self.time_budget)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Callback {
    pub fn new(name: impl Into<String>, time_budget: Duration, handler: CallbackHandler) -> Self {
        Self {
            name: name.into(),
            time_budget,
            interval: None,
            handler,
        }
    }

    pub fn ticker(
        name: impl Into<String>,
        interval: Duration,
        time_budget: Duration,
        handler: CallbackHandler,
    ) -> Self {
        Self {
            interval: Some(interval),
            ..Self::new(name, time_budget, handler)
        }
    }

    /// Context the handler runs under.
    pub fn context(&self, parent: &CallContext) -> CallContext {
        if self.time_budget.is_zero() {
            parent.child()
        } else {
            parent.with_timeout(self.time_budget)
        }
    }
}
