//! TTL result cache with hit/miss accounting
//!
//! A small concurrent cache for snapshot and query lookups. Entries carry a
//! deadline (per-entry TTL or the cache default) and evict lazily on read.
//! The cache is an accelerator only: correct callers clear it on every
//! mutating operation, and enabling or disabling it must never change
//! results, only latency.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Cache performance counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Reads that found a live entry
    pub hits: u64,
    /// Reads that found nothing (or an expired entry)
    pub misses: u64,
    /// Live entry count at the time of the call
    pub size: usize,
}

impl CacheStats {
    /// Hits as a fraction of all reads; 0.0 when no reads happened
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    deadline: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| d <= now)
    }
}

/// Generic TTL cache
///
/// Keys and values are owned; values are cloned out on read, so `V` should
/// be cheap to clone (or wrapped in `Arc`).
#[derive(Debug)]
pub struct ResultCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Entry<V>>,
    default_ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a cache whose entries never expire unless given an explicit TTL
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a cache with a default per-entry TTL
    #[inline]
    #[must_use]
    pub fn with_ttl(default_ttl: Duration) -> Self {
        Self {
            default_ttl: Some(default_ttl),
            ..Self::new()
        }
    }

    /// Look up a key, evicting it first if expired
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert with the cache's default TTL
    #[inline]
    pub fn insert(&self, key: K, value: V) {
        self.insert_entry(key, value, self.default_ttl);
    }

    /// Insert with an explicit TTL, overriding the default
    #[inline]
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.insert_entry(key, value, Some(ttl));
    }

    fn insert_entry(&self, key: K, value: V, ttl: Option<Duration>) {
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key, Entry { value, deadline });
    }

    /// Remove one entry; true when it was present
    #[inline]
    pub fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry (counters are kept)
    #[inline]
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Current counters and live size
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let size = self.entries.iter().filter(|e| !e.is_expired(now)).count();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size,
        }
    }
}

impl<K, V> Default for ResultCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
