//! In-process TTL Cache
//!
//! Process-wide key/value store shared by every delivery component.
//!
//! - **Lazy expiry**: a read of an expired entry behaves as absent and removes it.
//! - **Periodic sweep**: [`TtlCache::spawn_sweeper`] drops expired entries nobody reads.
//! - **Approximate LRU**: once `max_entries` is reached, the oldest
//!   `eviction_fraction` of entries *by first insertion* is dropped in bulk
//!   before a new key is admitted. Reads do not refresh recency; overwriting
//!   an existing key keeps its original position. This trades eviction
//!   precision for admission that never scans the map.
//! - **Never fails the caller**: (de)serialization problems are logged and the
//!   operation degrades to a no-op returning absent/`false`.
//!
//! Values are stored as `serde_json::Value`; typed access goes through
//! [`TtlCache::get_as`], [`TtlCache::set_as`] and [`TtlCache::update_as`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CacheSettings;
use crate::infrastructure::metrics;

struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
    size: usize,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Default)]
struct CacheInner {
    entries: IndexMap<String, CacheEntry>,
    memory_bytes: usize,
}

impl CacheInner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.shift_remove(key)?;
        self.memory_bytes = self.memory_bytes.saturating_sub(entry.size);
        Some(entry)
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub expired: u64,
    pub estimated_memory_bytes: usize,
}

/// TTL cache with bulk oldest-first eviction.
pub struct TtlCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
    eviction_fraction: f64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
}

impl TtlCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_entries: settings.max_entries.max(1),
            eviction_fraction: settings.eviction_fraction,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Store `value` under `key`, expiring after `ttl` when given.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        let mut inner = self.inner.lock();
        self.insert_locked(&mut inner, key, value, ttl);
        true
    }

    /// Read `key`; expired entries are removed and reported as absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock();
        self.live_value_locked(&mut inner, key).cloned()
    }

    /// Remove `key`. Returns whether a live entry existed.
    pub fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.remove(key) {
            Some(entry) => !entry.is_expired(now),
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Typed read. A value that no longer decodes as `T` is treated as absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache value failed to decode");
                None
            }
        }
    }

    /// Typed write. Serialization failures leave the cache untouched.
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, ttl),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache value failed to encode");
                false
            }
        }
    }

    /// Read-modify-write of a single key under the cache lock.
    ///
    /// Absent (or undecodable) values start from `T::default()`. The entry is
    /// rewritten with `ttl`. Returns the closure's result, or `None` if the
    /// updated value could not be encoded.
    pub fn update_as<T, R, F>(&self, key: &str, ttl: Option<Duration>, f: F) -> Option<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> R,
    {
        let mut inner = self.inner.lock();
        let mut current: T = match self.live_value_locked(&mut inner, key) {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                warn!(key = %key, error = %e, "Cache value failed to decode, resetting");
                T::default()
            }),
            None => T::default(),
        };

        let result = f(&mut current);
        match serde_json::to_value(&current) {
            Ok(value) => {
                self.insert_locked(&mut inner, key, value, ttl);
                Some(result)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache value failed to encode");
                None
            }
        }
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        let mut freed = 0usize;
        inner.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                freed += entry.size;
            }
            keep
        });
        inner.memory_bytes = inner.memory_bytes.saturating_sub(freed);
        let removed = before - inner.entries.len();
        self.expired.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Remove every entry whose key matches `predicate`.
    pub fn delete_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&str) -> bool,
    {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        let mut freed = 0usize;
        inner.entries.retain(|key, entry| {
            let keep = !predicate(key);
            if !keep {
                freed += entry.size;
            }
            keep
        });
        inner.memory_bytes = inner.memory_bytes.saturating_sub(freed);
        before - inner.entries.len()
    }

    /// Drop everything. Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.memory_bytes = 0;
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, estimated_memory_bytes) = {
            let inner = self.inner.lock();
            (inner.entries.len(), inner.memory_bytes)
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            entries,
            max_entries: self.max_entries,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            evictions: self.evictions.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            estimated_memory_bytes,
        }
    }

    /// Run [`TtlCache::sweep`] every `interval` until the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip first immediate tick
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "Cache sweep removed expired entries");
                }
            }
        })
    }

    fn live_value_locked<'a>(&self, inner: &'a mut CacheInner, key: &str) -> Option<&'a Value> {
        let now = Instant::now();
        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            inner.remove(key);
            self.expired.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        inner.entries.get(key).map(|entry| &entry.value)
    }

    fn insert_locked(&self, inner: &mut CacheInner, key: &str, value: Value, ttl: Option<Duration>) {
        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_entries {
            self.evict_oldest_locked(inner);
        }

        let size = key.len() + value.to_string().len();
        let entry = CacheEntry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
            size,
        };

        inner.memory_bytes += size;
        if let Some(previous) = inner.entries.insert(key.to_string(), entry) {
            inner.memory_bytes = inner.memory_bytes.saturating_sub(previous.size);
        }
    }

    fn evict_oldest_locked(&self, inner: &mut CacheInner) {
        let target = ((self.max_entries as f64) * self.eviction_fraction).ceil() as usize;
        let count = target.clamp(1, inner.entries.len());

        let freed: usize = inner.entries.drain(..count).map(|(_, entry)| entry.size).sum();
        inner.memory_bytes = inner.memory_bytes.saturating_sub(freed);

        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        metrics::record_cache_evictions(count);
        debug!(evicted = count, max_entries = self.max_entries, "Cache full, evicted oldest entries");
    }
}
