//! Volatile TTL cache.
//!
//! Short-lived memoization of expensive-to-recompute values (rendered
//! profiles and the like). Never persisted and never authoritative: a
//! miss is answered by recomputing from the store. Expired entries are
//! dropped by a periodic sweep, but `get` re-checks age on every hit so a
//! stale entry is a miss even before the next sweep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    written: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn expired(&self) -> bool {
        self.written.elapsed() >= self.ttl
    }
}

/// Time-boxed key/value side-table
pub struct VolatileCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V> VolatileCache<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert (or replace) an entry with its own time-to-live
    pub fn insert(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                written: Instant::now(),
                ttl,
            },
        );
    }

    /// Drop every entry past its own TTL; returns how many were removed
    pub fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.expired());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> VolatileCache<V> {
    /// Fetch an entry if it is still within TTL
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| !entry.expired())
            .map(|entry| entry.value.clone())
    }
}

impl<V> Default for VolatileCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
