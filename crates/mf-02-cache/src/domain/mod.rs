//! Domain layer: buckets and configuration.

pub mod bucket;
pub mod config;

pub use bucket::{CacheBucket, CacheElement};
pub use config::{CacheConfig, DEFAULT_MAX_AGE, DEFAULT_MAX_WEIGHT, NUM_BUCKETS};
