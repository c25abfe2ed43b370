//! Small TTL-evicted in-process caches.
//!
//! Used for the message dedup set, the scheduler's recently-evaluated apps and
//! the prober's recently-unreachable peers. Entries are evicted lazily on read
//! and in bulk by `purge`, so no background task is needed.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub struct TtlCache<K, V = ()>
where
    K: Eq + Hash,
{
    ttl: Duration,
    capacity: usize,
    items: DashMap<K, (Instant, V)>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            items: DashMap::with_capacity(capacity.min(1024)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Inserts or refreshes `key`. When full, expired entries are purged first and
    /// then the oldest entry is dropped.
    pub fn insert(&self, key: K, value: V) {
        if self.items.len() >= self.capacity && !self.items.contains_key(&key) {
            self.purge();
            if self.items.len() >= self.capacity {
                let oldest = self
                    .items
                    .iter()
                    .min_by_key(|e| e.value().0)
                    .map(|e| e.key().clone());
                if let Some(oldest) = oldest {
                    self.items.remove(&oldest);
                }
            }
        }
        self.items.insert(key, (Instant::now(), value));
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.items.get(key) {
            Some(entry) if entry.value().0.elapsed() <= self.ttl => {
                return Some(entry.value().1.clone())
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.items.remove(key);
        }
        None
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&self, key: &K) {
        self.items.remove(key);
    }

    /// Drops every expired entry.
    pub fn purge(&self) {
        let ttl = self.ttl;
        self.items.retain(|_, (at, _)| at.elapsed() <= ttl);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keys that are still live.
    pub fn keys(&self) -> Vec<K> {
        let ttl = self.ttl;
        self.items
            .iter()
            .filter(|e| e.value().0.elapsed() <= ttl)
            .map(|e| e.key().clone())
            .collect()
    }
}

impl<K> TtlCache<K, ()>
where
    K: Eq + Hash + Clone,
{
    /// Marks `key` as seen. Returns false if it was already present and live.
    pub fn mark(&self, key: K) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.insert(key, ());
        true
    }
}

#[cfg(test)]
#[path = "ttl_test.rs"]
mod ttl_test;
