//! Response caching with TTL for provider completions
//!
//! Entries expire lazily: a read of an entry older than the TTL is a miss,
//! but the entry stays in the map until it is overwritten or evicted.
//! When a write pushes the size above `max_entries`, the `evict_batch`
//! oldest entries (by creation time) are removed in one pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::Result;
use crate::config::CacheConfig;

/// Default time-to-live (30 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
/// Default capacity before eviction
pub const DEFAULT_MAX_ENTRIES: usize = 1000;
/// Default number of entries removed per eviction pass
pub const DEFAULT_EVICT_BATCH: usize = 100;

/// A cached payload with its creation time
struct CacheEntry {
    payload: Bytes,
    created_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Reads served from the cache
    pub hits: AtomicU64,
    /// Reads that found nothing or an expired entry
    pub misses: AtomicU64,
    /// Entries removed by capacity eviction
    pub evictions: AtomicU64,
}

impl CacheStats {
    /// Get current cache hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get current cache miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get current eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Calculate hit rate as a fraction (0.0-1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Thread-safe response cache with lazy TTL expiry and batch eviction
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
    evict_batch: usize,
    stats: CacheStats,
}

impl ResponseCache {
    /// Create a cache with the default TTL and capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TTL, DEFAULT_MAX_ENTRIES, DEFAULT_EVICT_BATCH)
    }

    /// Create a cache from configuration
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_limits(config.ttl, config.max_entries, config.evict_batch)
    }

    /// Create a cache with explicit limits
    #[must_use]
    pub fn with_limits(ttl: Duration, max_entries: usize, evict_batch: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries,
            evict_batch,
            stats: CacheStats::default(),
        }
    }

    /// Get a cached payload if it exists and has not outlived the TTL
    ///
    /// Expired entries are reported as misses and left in place.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache hit");
                Some(entry.payload.clone())
            }
            Some(_) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache entry expired");
                None
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a payload, overwriting any previous entry and resetting its age
    pub fn put(&self, key: &str, payload: impl Into<Bytes>) {
        self.insert_at(key, payload.into(), Instant::now());
    }

    /// Get and deserialize a cached JSON payload
    ///
    /// A payload that no longer decodes as `T` is treated as a miss.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.get(key)?;
        match serde_json::from_slice(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "Cached payload did not decode");
                None
            }
        }
    }

    /// Serialize `value` to JSON bytes and store it
    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.put(key, payload);
        Ok(())
    }

    fn insert_at(&self, key: &str, payload: Bytes, created_at: Instant) {
        let mut entries = self.entries.write();
        entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                created_at,
            },
        );

        if entries.len() > self.max_entries {
            let removed = evict_oldest(&mut entries, self.evict_batch);
            self.stats
                .evictions
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, size = entries.len(), "Evicted oldest cache entries");
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            evictions: self.stats.evictions(),
            size: self.len(),
            hit_rate: self.stats.hit_rate(),
        }
    }

    /// Number of physically stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Return `true` when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Clear all cached entries
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove up to `batch` entries with the oldest `created_at`.
fn evict_oldest(entries: &mut HashMap<String, CacheEntry>, batch: usize) -> usize {
    let mut by_age: Vec<(Instant, String)> = entries
        .iter()
        .map(|(k, e)| (e.created_at, k.clone()))
        .collect();
    by_age.sort_unstable_by_key(|(created_at, _)| *created_at);

    let count = batch.min(by_age.len());
    for (_, key) in by_age.into_iter().take(count) {
        entries.remove(&key);
    }
    count
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total evictions
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}
