//! # Defragger
//!
//! Tracks one accumulator per message key. Every `add` tries to integrate;
//! the accumulator is dropped as soon as the message is complete or broken.
//! Accumulators that stop receiving fragments are removed by `reap_expired`.

use crate::domain::{DefragAccumulator, FragError};
use parking_lot::Mutex;
use shared_types::{system_time_source, Frame, HttpMessage, SharedTimeSource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Defragger {
    accumulators: Mutex<HashMap<String, Arc<DefragAccumulator>>>,
    clock: SharedTimeSource,
}

impl Default for Defragger {
    fn default() -> Self {
        Self::new(system_time_source())
    }
}

impl Defragger {
    pub fn new(clock: SharedTimeSource) -> Self {
        Self {
            accumulators: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Adds a fragment of the message identified by `key`. Returns the whole
    /// message once every fragment has arrived.
    pub fn add(&self, key: &str, fragment: HttpMessage) -> Result<Option<HttpMessage>, FragError> {
        // Unfragmented messages skip the bookkeeping
        if Frame::of(&fragment.headers).fragment()? == (1, 1)
            && !self.accumulators.lock().contains_key(key)
        {
            return Ok(Some(fragment));
        }

        let accumulator = self
            .accumulators
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(DefragAccumulator::new(self.clock.clone())))
            .clone();

        let result = accumulator.add(fragment).and_then(|()| accumulator.integrated());
        match &result {
            Ok(Some(_)) => {
                debug!(key, fragments = accumulator.max_count(), "Message reassembled");
                self.accumulators.lock().remove(key);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(key, error = %e, "Dropping malformed message");
                self.accumulators.lock().remove(key);
            }
        }
        result
    }

    /// Removes the accumulator under `key`, if any.
    pub fn remove(&self, key: &str) -> bool {
        self.accumulators.lock().remove(key).is_some()
    }

    /// Removes and returns the keys whose last fragment arrived longer
    /// than `budget` ago.
    pub fn reap_expired(&self, budget: Duration) -> Vec<String> {
        let now = self.clock.now();
        let mut accumulators = self.accumulators.lock();
        let expired: Vec<String> = accumulators
            .iter()
            .filter(|(_, acc)| now.saturating_duration_since(acc.last_activity()) > budget)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            accumulators.remove(key);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Reaped stale accumulators");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.accumulators.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
