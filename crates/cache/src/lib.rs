//! Generic associative cache with optional per-entry TTL and lazy expiry.
//!
//! Used as each peer's local resource cache (`MemoryCache<ResourceHash,
//! Resource>`), but kept generic since nothing about it is resource-specific.
//!
//! Expiry is driven by an explicit `now_ms` timestamp supplied by the
//! caller rather than a wall-clock read: the simulator runs on a virtual
//! timeline that can run faster or slower than real time, so the cache
//! must never call `Instant::now()` itself. Expired entries are evicted
//! the next time they're looked up — there is no background sweep task.

use std::collections::HashMap;
use std::hash::Hash;

struct Entry<V> {
    value: V,
    expires_at_ms: Option<u64>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at_ms, Some(deadline) if now_ms >= deadline)
    }
}

/// A key-value store with optional per-entry expiry.
#[derive(Default)]
pub struct MemoryCache<K, V> {
    entries: HashMap<K, Entry<V>>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert or replace a value, with an optional TTL in milliseconds
    /// relative to `now_ms`.
    pub fn set(&mut self, key: K, value: V, now_ms: u64, ttl_ms: Option<u64>) {
        let expires_at_ms = ttl_ms.map(|ttl| now_ms.saturating_add(ttl));
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at_ms,
            },
        );
    }

    /// Fetch a value, evicting it first if it has expired.
    pub fn get(&mut self, key: &K, now_ms: u64) -> Option<&V> {
        self.evict_if_expired(key, now_ms);
        self.entries.get(key).map(|e| &e.value)
    }

    /// Whether `key` is present and unexpired, evicting it first if stale.
    pub fn has(&mut self, key: &K, now_ms: u64) -> bool {
        self.evict_if_expired(key, now_ms);
        self.entries.contains_key(key)
    }

    pub fn delete(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Unexpired entries as of `now_ms`. Does not evict; callers that want
    /// eviction alongside iteration should `has`/`get` each key first.
    pub fn entries(&self, now_ms: u64) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .filter(move |(_, e)| !e.is_expired(now_ms))
            .map(|(k, e)| (k, &e.value))
    }

    /// Number of unexpired entries as of `now_ms`.
    pub fn size(&self, now_ms: u64) -> usize {
        self.entries(now_ms).count()
    }

    pub fn keys(&self, now_ms: u64) -> impl Iterator<Item = &K> {
        self.entries(now_ms).map(|(k, _)| k)
    }

    fn evict_if_expired(&mut self, key: &K, now_ms: u64) {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(now_ms) {
                self.entries.remove(key);
            }
        }
    }
}
