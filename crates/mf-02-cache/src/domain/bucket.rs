//! Age buckets.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// A cached value and its weight (at least 1).
#[derive(Debug, Clone)]
pub struct CacheElement<V> {
    pub value: V,
    pub weight: usize,
}

/// Elements of one age band. `weight` is the sum of element weights.
#[derive(Debug)]
pub struct CacheBucket<K, V> {
    elements: HashMap<K, CacheElement<V>>,
    weight: usize,
}

impl<K, V> Default for CacheBucket<K, V> {
    fn default() -> Self {
        Self {
            elements: HashMap::new(),
            weight: 0,
        }
    }
}

impl<K: Eq + Hash, V> CacheBucket<K, V> {
    pub fn weight(&self) -> usize {
        self.weight
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&CacheElement<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.elements.get(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.elements.contains_key(key)
    }

    pub fn insert(&mut self, key: K, element: CacheElement<V>) {
        self.weight += element.weight;
        if let Some(old) = self.elements.insert(key, element) {
            self.weight -= old.weight;
        }
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<(K, CacheElement<V>)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (k, element) = self.elements.remove_entry(key)?;
        self.weight -= element.weight;
        Some((k, element))
    }
}
