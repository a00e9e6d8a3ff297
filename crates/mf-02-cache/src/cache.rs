//! # LRU Cache
//!
//! Elements live in a ring of eight buckets, bucket 0 being the freshest.
//! Each bucket covers `max_age / 8` of time. As time passes the ring cycles:
//! the oldest bucket is dropped, the others shift one position older and an
//! empty bucket 0 is installed. Stores also cycle the ring when the cache is
//! full or when bucket 0 outgrows its share of `max_weight / 8`.
//!
//! Every public operation takes the lock once and runs at most eight cycles
//! before doing its work.

use crate::domain::{CacheBucket, CacheConfig, CacheElement, NUM_BUCKETS};
use parking_lot::Mutex;
use shared_types::SharedTimeSource;
use std::borrow::Borrow;
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::debug;

struct CacheState<K, V> {
    buckets: VecDeque<CacheBucket<K, V>>,
    weight: usize,
    max_weight: usize,
    max_age: Duration,
    cycle_duration: Duration,
    next_cycle: Instant,
    bump_on_load: bool,
    hits: u64,
    misses: u64,
}

impl<K: Eq + Hash, V> CacheState<K, V> {
    fn new(config: &CacheConfig, now: Instant) -> Self {
        let cycle_duration = config.cycle_duration();
        Self {
            buckets: (0..NUM_BUCKETS).map(|_| CacheBucket::default()).collect(),
            weight: 0,
            max_weight: config.max_weight.max(1),
            max_age: config.max_age,
            cycle_duration,
            next_cycle: now + cycle_duration,
            bump_on_load: config.bump_on_load,
            hits: 0,
            misses: 0,
        }
    }

    fn cycle_once(&mut self) {
        if let Some(oldest) = self.buckets.pop_back() {
            self.weight -= oldest.weight();
        }
        self.buckets.push_front(CacheBucket::default());
    }

    fn cycle_age(&mut self, now: Instant) {
        let mut cycles = 0;
        while now >= self.next_cycle && cycles < NUM_BUCKETS {
            self.cycle_once();
            self.next_cycle += self.cycle_duration;
            cycles += 1;
        }
        if cycles == NUM_BUCKETS {
            self.next_cycle = now + self.cycle_duration;
        }
    }

    fn share(&self) -> usize {
        self.max_weight / NUM_BUCKETS
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        for bucket in self.buckets.iter_mut() {
            if let Some((_, element)) = bucket.remove(key) {
                self.weight -= element.weight;
                return Some(element.value);
            }
        }
        None
    }

    fn store(&mut self, key: K, value: V, weight: usize) {
        if weight > self.max_weight {
            debug!(weight, max_weight = self.max_weight, "Dropping element heavier than the cache");
            return;
        }
        let weight = weight.max(1);
        self.remove(&key);

        while self.weight + weight > self.max_weight
            || (!self.buckets[0].is_empty() && self.buckets[0].weight() + weight > self.share())
        {
            self.cycle_once();
            self.next_cycle += self.cycle_duration;
        }

        self.buckets[0].insert(key, CacheElement { value, weight });
        self.weight += weight;
    }

    fn load<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(index) = self.buckets.iter().position(|b| b.contains(key)) else {
            self.misses += 1;
            return None;
        };
        self.hits += 1;

        let index = if index > 0 && self.bump_on_load {
            if let Some((k, element)) = self.buckets[index].remove(key) {
                self.buckets[0].insert(k, element);
            }
            0
        } else {
            index
        };
        self.buckets[index].get(key).map(|e| &e.value)
    }

    fn len(&self) -> usize {
        self.buckets.iter().map(CacheBucket::len).sum()
    }

    fn evict_to_max(&mut self) {
        let mut cycles = 0;
        while self.weight > self.max_weight && cycles < NUM_BUCKETS {
            self.cycle_once();
            cycles += 1;
        }
    }
}

/// Thread-safe LRU cache bounded by total weight and by age.
pub struct LruCache<K, V> {
    state: Mutex<CacheState<K, V>>,
    clock: SharedTimeSource,
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LruCache")
            .field("weight", &state.weight)
            .field("max_weight", &state.max_weight)
            .field("max_age", &state.max_age)
            .finish()
    }
}

impl<K, V> Default for LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Cache with default settings.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn builder() -> LruCacheBuilder {
        LruCacheBuilder::default()
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let now = config.clock.now();
        Self {
            state: Mutex::new(CacheState::new(&config, now)),
            clock: config.clock,
        }
    }

    /// Stores with weight 1.
    pub fn put(&self, key: K, value: V) {
        self.store(key, value, 1);
    }

    /// Stores with the given weight. Elements heavier than the cache are dropped.
    pub fn store(&self, key: K, value: V, weight: usize) {
        let mut state = self.state.lock();
        state.cycle_age(self.clock.now());
        state.store(key, value, weight);
    }

    pub fn load<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut state = self.state.lock();
        state.cycle_age(self.clock.now());
        state.load(key).cloned()
    }

    /// Loads the value under `key`, or stores `value` with weight 1 if absent.
    /// Returns the value in the cache and whether it was loaded.
    pub fn load_or_store(&self, key: K, value: V) -> (V, bool) {
        self.load_or_store_weighted(key, value, 1)
    }

    pub fn load_or_store_weighted(&self, key: K, value: V, weight: usize) -> (V, bool) {
        let mut state = self.state.lock();
        state.cycle_age(self.clock.now());
        if let Some(existing) = state.load(&key) {
            return (existing.clone(), true);
        }
        state.store(key, value.clone(), weight);
        (value, false)
    }

    /// Whether `key` is cached. Does not bump.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut state = self.state.lock();
        state.cycle_age(self.clock.now());
        state.buckets.iter().any(|b| b.contains(key))
    }

    pub fn delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut state = self.state.lock();
        state.cycle_age(self.clock.now());
        state.remove(key)
    }

    pub fn len(&self) -> usize {
        let mut state = self.state.lock();
        state.cycle_age(self.clock.now());
        state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total weight of the cached elements.
    pub fn weight(&self) -> usize {
        let mut state = self.state.lock();
        state.cycle_age(self.clock.now());
        state.weight
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        for _ in 0..NUM_BUCKETS {
            state.cycle_once();
        }
        state.next_cycle = self.clock.now() + state.cycle_duration;
    }

    pub fn max_weight(&self) -> usize {
        self.state.lock().max_weight
    }

    /// Changes the weight limit, evicting the oldest buckets to fit.
    pub fn set_max_weight(&self, max_weight: usize) {
        let mut state = self.state.lock();
        state.cycle_age(self.clock.now());
        state.max_weight = max_weight.max(1);
        state.evict_to_max();
    }

    pub fn max_age(&self) -> Duration {
        self.state.lock().max_age
    }

    /// Changes the age limit and the cycle duration derived from it.
    pub fn set_max_age(&self, max_age: Duration) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.cycle_age(now);
        state.max_age = max_age;
        state.cycle_duration = (max_age / NUM_BUCKETS as u32).max(Duration::from_nanos(1));
        state.next_cycle = now + state.cycle_duration;
    }

    pub fn hits(&self) -> u64 {
        self.state.lock().hits
    }

    pub fn misses(&self) -> u64 {
        self.state.lock().misses
    }
}

/// Fluent builder for `LruCache`.
#[derive(Debug, Default)]
pub struct LruCacheBuilder {
    config: CacheConfig,
}

impl LruCacheBuilder {
    pub fn max_weight(mut self, max_weight: usize) -> Self {
        self.config.max_weight = max_weight;
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.config.max_age = max_age;
        self
    }

    pub fn bump_on_load(mut self, bump: bool) -> Self {
        self.config.bump_on_load = bump;
        self
    }

    pub fn clock(mut self, clock: SharedTimeSource) -> Self {
        self.config.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn build<K, V>(self) -> LruCache<K, V>
    where
        K: Eq + Hash + Clone,
        V: Clone,
    {
        LruCache::with_config(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared_types::MockTimeSource;
    use std::sync::Arc;

    fn mock_cache<K, V>(clock: &MockTimeSource, max_weight: usize, max_age: Duration) -> LruCache<K, V>
    where
        K: Eq + Hash + Clone,
        V: Clone,
    {
        LruCache::<K, V>::builder()
            .max_weight(max_weight)
            .max_age(max_age)
            .clock(Arc::new(clock.clone()))
            .build()
    }

    #[test]
    fn test_weight_eviction_drops_oldest() {
        let cache: LruCache<i32, &str> = LruCache::<i32, &str>::builder()
            .max_weight(16)
            .bump_on_load(false)
            .build();
        for i in 1..=17 {
            cache.store(i, "Foo", 1);
        }

        assert!(cache.load(&1).is_none());
        assert!(cache.load(&2).is_none());
        for i in 3..=17 {
            assert_eq!(cache.load(&i), Some("Foo"), "key {}", i);
        }
        assert_eq!(cache.weight(), 15);
        assert_eq!(cache.len(), 15);
    }

    #[test]
    fn test_age_eviction() {
        let clock = MockTimeSource::new();
        let cache: LruCache<i32, i32> = mock_cache(&clock, 10_000, Duration::from_secs(80));

        for i in 1..=79 {
            cache.put(i, i);
            clock.advance(Duration::from_secs(1));
        }
        assert_eq!(cache.len(), 79);

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.len(), 69);

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.len(), 59);

        clock.advance(Duration::from_secs(9));
        assert_eq!(cache.len(), 59);

        clock.advance(Duration::from_secs(80));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_bump_on_load_keeps_element_fresh() {
        let clock = MockTimeSource::new();
        let cache: LruCache<&str, i32> = mock_cache(&clock, 100, Duration::from_secs(80));
        cache.put("hot", 1);
        cache.put("cold", 2);

        // Walk the ring close to the end of its life, touching "hot" each cycle
        for _ in 0..7 {
            clock.advance(Duration::from_secs(10));
            assert_eq!(cache.load("hot"), Some(1));
        }
        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.load("hot"), Some(1));
        assert!(!cache.contains("cold"));
    }

    #[test]
    fn test_overweight_store_is_dropped() {
        let cache: LruCache<&str, i32> = LruCache::<&str, i32>::builder().max_weight(10).build();
        cache.store("a", 1, 3);
        cache.store("big", 2, 11);
        assert!(cache.load("big").is_none());
        assert_eq!(cache.load("a"), Some(1));

        // Zero weight counts as one
        cache.store("z", 3, 0);
        assert_eq!(cache.weight(), 4);
    }

    #[test]
    fn test_store_replaces_existing() {
        let cache: LruCache<&str, i32> = LruCache::new();
        cache.store("k", 1, 5);
        cache.store("k", 2, 2);
        assert_eq!(cache.load("k"), Some(2));
        assert_eq!(cache.weight(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_load_or_store() {
        let clock = MockTimeSource::new();
        let cache: LruCache<&str, i32> = mock_cache(&clock, 100, Duration::from_secs(8));

        assert_eq!(cache.load_or_store("k", 1), (1, false));
        assert_eq!(cache.load_or_store("k", 2), (1, true));

        // Expired entries are cycled out before the lookup
        clock.advance(Duration::from_secs(9));
        assert_eq!(cache.load_or_store("k", 3), (3, false));
    }

    #[test]
    fn test_delete_and_clear() {
        let cache: LruCache<String, i32> = LruCache::new();
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        assert_eq!(cache.delete("a"), Some(1));
        assert_eq!(cache.delete("a"), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.weight(), 0);
    }

    #[test]
    fn test_set_max_weight_evicts() {
        let cache: LruCache<i32, i32> = LruCache::<i32, i32>::builder().max_weight(80).build();
        for i in 0..80 {
            cache.put(i, i);
        }
        assert_eq!(cache.weight(), 80);

        cache.set_max_weight(40);
        assert!(cache.weight() <= 40);
        assert!(cache.contains(&79));
        assert!(!cache.contains(&0));
    }

    #[test]
    fn test_set_max_age() {
        let clock = MockTimeSource::new();
        let cache: LruCache<i32, i32> = mock_cache(&clock, 100, Duration::from_secs(3600));
        cache.put(1, 1);
        cache.set_max_age(Duration::from_secs(8));
        assert_eq!(cache.max_age(), Duration::from_secs(8));

        clock.advance(Duration::from_secs(8));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let cache: LruCache<i32, i32> = LruCache::new();
        cache.put(1, 1);
        cache.load(&1);
        cache.load(&2);
        cache.load(&3);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Store(u8, u16, usize),
        Load(u8),
        Delete(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (any::<u8>(), any::<u16>(), 0usize..40).prop_map(|(k, v, w)| Op::Store(k, v, w)),
            any::<u8>().prop_map(Op::Load),
            any::<u8>().prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn prop_weight_never_exceeds_max(max in 1usize..64, ops in prop::collection::vec(op(), 1..200)) {
            let cache: LruCache<u8, u16> = LruCache::<u8, u16>::builder().max_weight(max).build();
            let mut last = std::collections::HashMap::new();
            for op in ops {
                match op {
                    Op::Store(k, v, w) => {
                        cache.store(k, v, w);
                        if w <= max {
                            last.insert(k, v);
                        }
                    }
                    Op::Load(k) => {
                        if let Some(v) = cache.load(&k) {
                            prop_assert_eq!(Some(&v), last.get(&k));
                        }
                    }
                    Op::Delete(k) => {
                        cache.delete(&k);
                        last.remove(&k);
                    }
                }
                prop_assert!(cache.weight() <= max);
            }
        }
    }
}
