//! Bounded cache with LRU-by-last-seen eviction.
//!
//! Used by the Host Manager for per-VLAN MAC caches and by the route
//! managers for neighbor caches: both need "at most N entries, evict the
//! least-recently-refreshed one" semantics keyed off an externally supplied
//! `now`, never a wall-clock read from inside the cache itself.

use std::collections::HashMap;
use std::hash::Hash;

/// An entry plus the timestamp (caller-supplied `now` units) it was last touched.
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    last_seen: u64,
}

/// A capacity-bounded map that evicts the least-recently-touched entry
/// when an insert would exceed `capacity`.
#[derive(Debug, Clone)]
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Entry<V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn last_seen(&self, key: &K) -> Option<u64> {
        self.entries.get(key).map(|e| e.last_seen)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Refreshes `key`'s last-seen timestamp without touching its value.
    /// No-op if the key is absent.
    pub fn touch(&mut self, key: &K, now: u64) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_seen = now;
        }
    }

    /// Inserts or refreshes `key`. If this would exceed `capacity` and `key`
    /// is new, the least-recently-seen entry is evicted first and returned.
    pub fn insert(&mut self, key: K, value: V, now: u64) -> Option<(K, V)> {
        let is_new = !self.entries.contains_key(&key);
        let evicted = if is_new && self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };
        self.entries.insert(key, Entry { value, last_seen: now });
        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let oldest_key = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_seen)
            .map(|(k, _)| k.clone())?;
        self.entries
            .remove(&oldest_key)
            .map(|e| (oldest_key, e.value))
    }

    /// Removes every entry whose `last_seen` is older than `now - timeout`.
    /// Returns the removed keys.
    pub fn expire_older_than(&mut self, now: u64, timeout: u64) -> Vec<K> {
        let cutoff = now.saturating_sub(timeout);
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| e.last_seen < cutoff)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
        }
        expired
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, e)| (k, &e.value))
    }
}
