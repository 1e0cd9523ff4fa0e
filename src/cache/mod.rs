//! Bounded in-memory cache with per-entry expiry and LRU eviction.
//!
//! Entries live in an [`IndexMap`] ordered from least to most recently used:
//! a successful read moves the entry to the back, and eviction pops from the
//! front. Every operation goes through a single instance-scoped mutex which
//! is never held across an `.await`.

use std::borrow::Borrow;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    created: Instant,
    ttl: Duration,
    access_count: u64,
    last_access: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration, now: Instant) -> Self {
        Self {
            value,
            created: now,
            ttl,
            access_count: 0,
            last_access: now,
        }
    }

    /// A zero TTL expires on the next read regardless of clock resolution.
    fn is_expired(&self, now: Instant) -> bool {
        self.ttl.is_zero() || now.duration_since(self.created) > self.ttl
    }

    fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.created)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    hits: u64,
    misses: u64,
    evicted: u64,
    expired: u64,
}

struct CacheInner<K, V> {
    entries: IndexMap<K, CacheEntry<V>>,
    counters: Counters,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evicted: u64,
    pub expired: u64,
    pub total_requests: u64,
    /// `hits / (hits + misses)`, 0.0 before the first lookup.
    pub hit_rate: f64,
    pub current_size: usize,
    pub max_size: usize,
    pub fill_ratio: f64,
}

/// A cached value together with its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue<V> {
    pub value: V,
    pub age: Duration,
    pub ttl: Duration,
    pub access_count: u64,
}

/// Per-entry listing returned by [`TtlLruCache::entries`].
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo<K> {
    pub key: K,
    pub age_ms: u64,
    pub ttl_ms: u64,
    pub remaining_ms: u64,
    pub access_count: u64,
    /// Time since the last successful read (or insertion).
    pub idle_ms: u64,
    pub expired: bool,
}

/// Thread-safe TTL + LRU cache.
pub struct TtlLruCache<K, V> {
    inner: Mutex<CacheInner<K, V>>,
    max_size: usize,
    default_ttl: Duration,
}

impl<K, V> TtlLruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache holding at most `max_size` entries (minimum 1).
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: IndexMap::new(),
                counters: Counters::default(),
            }),
            max_size: max_size.max(1),
            default_ttl,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a fresh value.
    ///
    /// An expired entry is removed and counted as both a miss and an expiry.
    /// A hit promotes the entry to most-recently-used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let Some(idx) = inner.entries.get_index_of(key) else {
            inner.counters.misses += 1;
            return None;
        };

        let expired = inner
            .entries
            .get_index(idx)
            .map(|(_, entry)| entry.is_expired(now))
            .unwrap_or(true);

        if expired {
            inner.entries.shift_remove_index(idx);
            inner.counters.misses += 1;
            inner.counters.expired += 1;
            return None;
        }

        let last = inner.entries.len() - 1;
        inner.entries.move_index(idx, last);
        inner.counters.hits += 1;

        let (_, entry) = inner.entries.get_index_mut(last)?;
        entry.access_count += 1;
        entry.last_access = now;
        Some(entry.value.clone())
    }

    /// Insert or replace a value. `None` uses the cache-level default TTL.
    ///
    /// Replacing an existing key updates it in place and marks it most
    /// recently used; inserting a new key past capacity evicts from the LRU
    /// end until the cache is back within bounds.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut inner = self.inner.lock();

        if let Some(idx) = inner.entries.get_index_of(&key) {
            let last = inner.entries.len() - 1;
            inner.entries.move_index(idx, last);
            if let Some((_, entry)) = inner.entries.get_index_mut(last) {
                *entry = CacheEntry::new(value, ttl, now);
            }
            return;
        }

        inner.entries.insert(key, CacheEntry::new(value, ttl, now));

        while inner.entries.len() > self.max_size {
            if inner.entries.shift_remove_index(0).is_some() {
                inner.counters.evicted += 1;
            }
        }
    }

    /// Remove a key. Returns whether it was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().entries.shift_remove(key).is_some()
    }

    /// Remove every entry and reset statistics.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.counters = Counters::default();
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - inner.entries.len();
        inner.counters.expired += removed as u64;

        if removed > 0 {
            debug!(removed, remaining = inner.entries.len(), "Cleaned up expired cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let c = inner.counters;
        let total_requests = c.hits + c.misses;
        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            c.hits as f64 / total_requests as f64
        };
        let current_size = inner.entries.len();

        CacheStats {
            hits: c.hits,
            misses: c.misses,
            evicted: c.evicted,
            expired: c.expired,
            total_requests,
            hit_rate,
            current_size,
            max_size: self.max_size,
            fill_ratio: current_size as f64 / self.max_size as f64,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// The lock is released while `compute` runs, so concurrent callers for
    /// the same key may both compute. Errors are returned and not cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: K,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// Return a value even if it has expired.
    ///
    /// Does not touch statistics or LRU order; meant for explicit stale reads.
    pub fn peek_stale<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().entries.get(key).map(|e| e.value.clone())
    }

    /// Whether `key` holds a fresh entry, optionally no older than `max_age`.
    ///
    /// Read-only: neither statistics nor LRU order change.
    pub fn has_fresh<Q>(&self, key: &Q, max_age: Option<Duration>) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                max_age.map_or(true, |max| entry.age(now) <= max)
            }
            _ => false,
        }
    }

    /// Like [`get`](Self::get) but also returns age, TTL and access count.
    pub fn get_with_metadata<Q>(&self, key: &Q) -> Option<CachedValue<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let value = self.get(key)?;
        let now = Instant::now();
        let inner = self.inner.lock();
        let entry = inner.entries.get(key)?;
        Some(CachedValue {
            value,
            age: entry.age(now),
            ttl: entry.ttl,
            access_count: entry.access_count,
        })
    }

    /// List entries from least to most recently used.
    pub fn entries(&self) -> Vec<EntryInfo<K>> {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .map(|(key, entry)| {
                let age = entry.age(now);
                EntryInfo {
                    key: key.clone(),
                    age_ms: age.as_millis() as u64,
                    ttl_ms: entry.ttl.as_millis() as u64,
                    remaining_ms: entry.ttl.saturating_sub(age).as_millis() as u64,
                    access_count: entry.access_count,
                    idle_ms: now.duration_since(entry.last_access).as_millis() as u64,
                    expired: entry.is_expired(now),
                }
            })
            .collect()
    }
}
