//! Cache metrics recorded via the `metrics` facade.
//!
//! The embedding application owns the exporter; this module only emits
//! counters under stable names.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_SETS_TOTAL: &str = "cache_sets_total";
    pub const CACHE_DELETES_TOTAL: &str = "cache_deletes_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "cache_invalidations_total";
}

/// Record a cache hit.
pub fn record_cache_hit(backend: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "backend" => backend).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss(backend: &'static str) {
    counter!(names::CACHE_MISSES_TOTAL, "backend" => backend).increment(1);
}

/// Record a cache write.
pub fn record_cache_set(backend: &'static str) {
    counter!(names::CACHE_SETS_TOTAL, "backend" => backend).increment(1);
}

/// Record a cache delete.
pub fn record_cache_delete(backend: &'static str) {
    counter!(names::CACHE_DELETES_TOTAL, "backend" => backend).increment(1);
}

/// Record a tag- or pattern-based invalidation, with the number of keys dropped.
pub fn record_cache_invalidation(backend: &'static str, keys_removed: u64) {
    counter!(names::CACHE_INVALIDATIONS_TOTAL, "backend" => backend).increment(keys_removed);
}
