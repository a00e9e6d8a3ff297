//! # MF-02 Cache
//!
//! Weighted, age-bucketed LRU cache.
//!
//! Used by the connector to remember how many instances answered a multicast
//! request, and available to services for their own memoization.

pub mod cache;
pub mod domain;

pub use cache::{LruCache, LruCacheBuilder};
pub use domain::{CacheConfig, DEFAULT_MAX_AGE, DEFAULT_MAX_WEIGHT, NUM_BUCKETS};
