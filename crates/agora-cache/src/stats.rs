//! Cache statistics.
//!
//! Counters are per-process approximations maintained with relaxed atomics;
//! they are never synchronized across instances.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Snapshot of cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of writes.
    pub sets: u64,
    /// Number of deletes.
    pub deletes: u64,
    /// Average read latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Number of keys in the store (from the last store refresh).
    pub key_count: u64,
    /// Approximate store memory usage in bytes (from the last store refresh).
    pub memory_used_bytes: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Store-level figures refreshed periodically from backend introspection.
#[derive(Debug, Default)]
struct StoreStats {
    key_count: u64,
    memory_used_bytes: u64,
}

/// Lock-free recorder behind every [`crate::client::CacheClient`].
#[derive(Debug)]
pub struct CacheStatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    read_latency_us: AtomicU64,
    read_samples: AtomicU64,
    store: ArcSwap<StoreStats>,
}

impl CacheStatsRecorder {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            read_latency_us: AtomicU64::new(0),
            read_samples: AtomicU64::new(0),
            store: ArcSwap::from_pointee(StoreStats::default()),
        }
    }

    pub fn record_hit(&self, latency: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.record_read_latency(latency);
    }

    pub fn record_miss(&self, latency: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.record_read_latency(latency);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sets(&self, count: u64) {
        self.sets.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    fn record_read_latency(&self, latency: Duration) {
        self.read_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.read_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Replace the store-level figures with a fresh snapshot.
    pub fn set_store_stats(&self, key_count: u64, memory_used_bytes: u64) {
        self.store.store(Arc::new(StoreStats {
            key_count,
            memory_used_bytes,
        }));
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> CacheStats {
        let samples = self.read_samples.load(Ordering::Relaxed);
        let avg_latency_ms = if samples == 0 {
            0.0
        } else {
            let total_us = self.read_latency_us.load(Ordering::Relaxed);
            (total_us as f64 / samples as f64) / 1000.0
        };
        let store = self.store.load();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            avg_latency_ms,
            key_count: store.key_count,
            memory_used_bytes: store.memory_used_bytes,
        }
    }
}

impl Default for CacheStatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
