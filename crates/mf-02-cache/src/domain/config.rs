//! Cache configuration.
//!
//! # Example
//!
//! ```ignore
//! use mf_02_cache::LruCache;
//! use std::time::Duration;
//!
//! let cache: LruCache<String, u32> = LruCache::<String, u32>::builder()
//!     .max_weight(1000)
//!     .max_age(Duration::from_secs(60))
//!     .bump_on_load(false)
//!     .build();
//! ```

use shared_types::{system_time_source, SharedTimeSource};
use std::time::Duration;

/// Number of age buckets.
pub const NUM_BUCKETS: usize = 8;

pub const DEFAULT_MAX_WEIGHT: usize = 10_000;
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound of the total weight (at least 1)
    pub max_weight: usize,
    /// Elements older than this are evicted
    pub max_age: Duration,
    /// Move an element to the freshest bucket when it is loaded
    pub bump_on_load: bool,
    pub clock: SharedTimeSource,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_weight: DEFAULT_MAX_WEIGHT,
            max_age: DEFAULT_MAX_AGE,
            bump_on_load: true,
            clock: system_time_source(),
        }
    }
}

impl CacheConfig {
    /// Time each bucket covers. Never zero.
    pub fn cycle_duration(&self) -> Duration {
        (self.max_age / NUM_BUCKETS as u32).max(Duration::from_nanos(1))
    }
}
