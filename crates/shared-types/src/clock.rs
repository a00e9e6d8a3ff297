//! Time sources.
//!
//! Components that age data (the LRU cache, defrag reaping) read time through
//! `TimeSource` so tests can drive the clock by hand.

use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic clock.
pub trait TimeSource: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock. Clones share the same offset.
#[derive(Debug, Clone)]
pub struct MockTimeSource {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl MockTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for MockTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

pub type SharedTimeSource = Arc<dyn TimeSource>;

pub fn system_time_source() -> SharedTimeSource {
    Arc::new(SystemTimeSource)
}
