//! Typed cache client with tag index and statistics.
//!
//! The client is explicitly constructed and dependency-injected; it owns no
//! global state. Values are stored as JSON text, except plain strings which
//! are stored verbatim so other readers of the same store see them unquoted.
//!
//! No operation raises for transient store errors; failures surface as
//! `None`/`false`/`0` and are logged by the backend.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::CacheBackend;
use crate::metrics;
use crate::pubsub::{self, InvalidationRequest};
use crate::stats::{CacheStats, CacheStatsRecorder};

/// Options for a cache write.
///
/// An explicit struct rather than an untyped options bag: `ttl: None` means
/// no expiry, an empty `tags` list means the key is untagged.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Expiry for the entry; `None` stores without expiry.
    pub ttl: Option<Duration>,
    /// Tags to index the key under for group invalidation.
    pub tags: Vec<String>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Key of the set holding all cache keys carrying a tag.
#[inline]
fn tag_key(tag: &str) -> String {
    format!("tag:{tag}")
}

/// Typed cache client over a [`CacheBackend`].
///
/// Cloning is cheap: clones share the backend and the stats recorder.
#[derive(Clone)]
pub struct CacheClient {
    backend: CacheBackend,
    stats: Arc<CacheStatsRecorder>,
}

impl CacheClient {
    /// Create a new client over the given backend.
    pub fn new(backend: CacheBackend) -> Self {
        Self {
            backend,
            stats: Arc::new(CacheStatsRecorder::new()),
        }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &CacheBackend {
        &self.backend
    }

    fn encode<T: Serialize>(value: &T) -> Option<String> {
        match serde_json::to_value(value) {
            // Plain strings are stored verbatim, without JSON quoting
            Ok(serde_json::Value::String(s)) => Some(s),
            Ok(v) => Some(v.to_string()),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to serialize cache value");
                None
            }
        }
    }

    fn decode<T: DeserializeOwned>(raw: String) -> Option<T> {
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            // Verbatim strings are not valid JSON; re-wrap so typed string
            // reads round-trip
            Err(_) => serde_json::from_value(serde_json::Value::String(raw)).ok(),
        }
    }

    /// Get a typed value. Returns `None` on miss, store error, or when the
    /// stored payload does not deserialize as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let started = Instant::now();
        let raw = self.backend.get_raw(key).await;
        match raw {
            Some(raw) => {
                self.stats.record_hit(started.elapsed());
                metrics::record_cache_hit(self.backend.backend_name());
                tracing::debug!(key = %key, "cache hit");
                Self::decode(raw)
            }
            None => {
                self.stats.record_miss(started.elapsed());
                metrics::record_cache_miss(self.backend.backend_name());
                tracing::debug!(key = %key, "cache miss");
                None
            }
        }
    }

    /// Get a value as JSON. A payload that fails to parse is returned as a
    /// raw string rather than dropped.
    pub async fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        let started = Instant::now();
        match self.backend.get_raw(key).await {
            Some(raw) => {
                self.stats.record_hit(started.elapsed());
                metrics::record_cache_hit(self.backend.backend_name());
                Some(
                    serde_json::from_str(&raw)
                        .unwrap_or_else(|_| serde_json::Value::String(raw)),
                )
            }
            None => {
                self.stats.record_miss(started.elapsed());
                metrics::record_cache_miss(self.backend.backend_name());
                None
            }
        }
    }

    /// Set a value. Returns `false` on serialization or store failure.
    ///
    /// When tags are supplied, the key is added to each tag's key-set after
    /// the value write. The two steps are not transactional; a crash between
    /// them leaves the key untagged, which TTL eventually corrects.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, options: WriteOptions) -> bool {
        let Some(encoded) = Self::encode(value) else {
            return false;
        };
        let written = self.backend.set_raw(key, &encoded, options.ttl).await;
        if !written {
            return false;
        }
        self.stats.record_set();
        metrics::record_cache_set(self.backend.backend_name());
        if !options.tags.is_empty() {
            self.add_tags(key, &options.tags).await;
        }
        true
    }

    /// Delete a key. Returns whether a key was removed.
    pub async fn delete(&self, key: &str) -> bool {
        let removed = self.backend.delete(key).await;
        if removed {
            self.stats.record_delete();
            metrics::record_cache_delete(self.backend.backend_name());
        }
        removed
    }

    /// Check whether a key exists.
    pub async fn exists(&self, key: &str) -> bool {
        self.backend.exists(key).await
    }

    /// Atomically increment a counter key by `by`. A missing key starts at 0.
    /// Returns 0 on store error.
    pub async fn increment(&self, key: &str, by: i64) -> i64 {
        self.backend.incr_by(key, by).await
    }

    /// Set the expiry of an existing key. Returns `false` if the key is absent.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        self.backend.expire(key, ttl).await
    }

    /// Batched typed get. One slot per requested key, in order.
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Vec<Option<T>> {
        let started = Instant::now();
        let raws = self.backend.mget_raw(keys).await;
        let latency = started.elapsed();
        raws.into_iter()
            .map(|raw| match raw {
                Some(raw) => {
                    self.stats.record_hit(latency);
                    metrics::record_cache_hit(self.backend.backend_name());
                    Self::decode(raw)
                }
                None => {
                    self.stats.record_miss(latency);
                    metrics::record_cache_miss(self.backend.backend_name());
                    None
                }
            })
            .collect()
    }

    /// Batched set with a shared TTL; pipelined in Redis mode.
    /// Returns `false` if any value fails to serialize or the write fails.
    pub async fn mset<T: Serialize>(&self, pairs: &[(String, T)], ttl: Option<Duration>) -> bool {
        let mut encoded = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let Some(raw) = Self::encode(value) else {
                return false;
            };
            encoded.push((key.clone(), raw));
        }
        let written = self.backend.mset_raw(&encoded, ttl).await;
        if written {
            self.stats.record_sets(encoded.len() as u64);
        }
        written
    }

    /// Enumerate keys matching a glob pattern. O(n) over the keyspace.
    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        self.backend.scan_keys(pattern).await
    }

    /// Delete all keys matching a glob pattern. Returns the number removed.
    ///
    /// Enumerates the full keyspace; not a production path at scale.
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        let keys = self.backend.scan_keys(pattern).await;
        let removed = self.backend.delete_many(&keys).await;
        if removed > 0 {
            self.stats.record_deletes(removed);
            metrics::record_cache_invalidation(self.backend.backend_name(), removed);
        }
        removed
    }

    /// Add `key` to the key-set of each tag. Best-effort: store failures are
    /// logged by the backend and skipped.
    pub async fn add_tags(&self, key: &str, tags: &[String]) {
        for tag in tags {
            self.backend.set_add(&tag_key(tag), key).await;
        }
    }

    /// Delete every key carrying any of the given tags, then drop the tag
    /// entries themselves. The union is de-duplicated so each key is deleted
    /// once; a second identical call removes nothing.
    pub async fn delete_by_tags(&self, tags: &[String]) -> u64 {
        let mut keys = BTreeSet::new();
        for tag in tags {
            keys.extend(self.backend.set_members(&tag_key(tag)).await);
        }
        let keys: Vec<String> = keys.into_iter().collect();
        let removed = self.backend.delete_many(&keys).await;

        let tag_keys: Vec<String> = tags.iter().map(|t| tag_key(t)).collect();
        self.backend.delete_many(&tag_keys).await;

        if removed > 0 {
            self.stats.record_deletes(removed);
            metrics::record_cache_invalidation(self.backend.backend_name(), removed);
        }
        removed
    }

    /// Apply an invalidation request against this instance only.
    /// Returns the number of keys removed.
    pub async fn apply_invalidation(&self, request: &InvalidationRequest) -> u64 {
        let mut removed = 0;
        if let Some(pattern) = &request.pattern {
            removed += self.delete_pattern(pattern).await;
        }
        if !request.tags.is_empty() {
            removed += self.delete_by_tags(&request.tags).await;
        }
        removed
    }

    /// Invalidate locally, then broadcast the request so other instances do
    /// the same. Delivery is best-effort with no acknowledgment; a dropped
    /// message leaves stale entries until TTL expiry.
    pub async fn invalidate(&self, request: &InvalidationRequest) -> u64 {
        let removed = self.apply_invalidation(request).await;
        pubsub::publish_invalidation(&self.backend, request).await;
        removed
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Refresh store-level figures (key count, memory) from backend
    /// introspection.
    pub async fn refresh_store_stats(&self) {
        let key_count = self.backend.key_count().await;
        let memory = self.backend.memory_used_bytes().await;
        self.stats.set_store_stats(key_count, memory);
    }

    /// Spawn a background task refreshing store-level stats on an interval.
    pub fn spawn_stats_refresh(&self, interval: Duration) {
        let client = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                client.refresh_store_stats().await;
            }
        });
    }
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("backend", &self.backend.backend_name())
            .finish_non_exhaustive()
    }
}
