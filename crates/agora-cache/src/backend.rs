//! Cache store backend: in-process memory mode or shared Redis mode.
//!
//! The backend exposes string-valued primitives; typed access and the tag
//! index live in [`crate::client`]. Redis-mode transient errors are logged at
//! `warn` and surface as `None`/`false`/`0` so a flaky store never fails the
//! calling request.

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A string value with optional expiry, for the memory backend.
#[derive(Clone, Debug)]
pub struct MemoryEntry {
    pub value: String,
    pub expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// In-process store used in memory mode and in tests.
///
/// Plain values and set-typed values (the tag index) live in separate maps,
/// mirroring the string/set key split of the shared store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
    sets: DashMap<String, HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Option<String> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Some(entry.value.clone());
            }
            drop(entry);
            self.entries.remove(key);
        }
        None
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        self.entries
            .insert(key.to_string(), MemoryEntry::new(value.to_string(), ttl));
    }

    fn delete(&self, key: &str) -> bool {
        let had_entry = self.entries.remove(key).is_some();
        let had_set = self.sets.remove(key).is_some();
        had_entry || had_set
    }

    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some() || self.sets.contains_key(key)
    }

    /// Atomic increment: the shard lock held by the entry API makes
    /// read-modify-write safe under concurrent callers.
    fn incr_by(&self, key: &str, by: i64) -> i64 {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| MemoryEntry::new("0".to_string(), None));
        if entry.is_expired() {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }
        let current = entry.value.parse::<i64>().unwrap_or(0);
        let next = current + by;
        entry.value = next.to_string();
        next
    }

    fn expire(&self, key: &str, ttl: Duration) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            _ => false,
        }
    }

    fn scan_keys(&self, pattern: &str) -> Vec<String> {
        let Some(re) = glob_to_regex(pattern) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired() && re.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.extend(
            self.sets
                .iter()
                .filter(|e| re.is_match(e.key()))
                .map(|e| e.key().clone()),
        );
        keys
    }

    fn delete_many(&self, keys: &[String]) -> u64 {
        keys.iter().filter(|k| self.delete(k)).count() as u64
    }

    fn set_add(&self, key: &str, member: &str) {
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
    }

    fn set_members(&self, key: &str) -> Vec<String> {
        self.sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn key_count(&self) -> u64 {
        let live = self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired())
            .count();
        (live + self.sets.len()) as u64
    }

    /// Rough estimate based on key and value byte lengths.
    fn memory_used_bytes(&self) -> u64 {
        let entries: usize = self
            .entries
            .iter()
            .map(|e| e.key().len() + e.value().value.len())
            .sum();
        let sets: usize = self
            .sets
            .iter()
            .map(|e| e.key().len() + e.value().iter().map(String::len).sum::<usize>())
            .sum();
        (entries + sets) as u64
    }

    /// Remove all expired entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }
}

/// Compile a Redis-style glob (`*`, `?`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    regex::Regex::new(&re).ok()
}

/// Cache store backend.
///
/// ## Modes
///
/// - **Memory**: single-instance mode, DashMap-backed, used in tests and
///   deployments without Redis
/// - **Redis**: shared store for multi-instance deployments, pooled
///   connections via deadpool
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: in-process store only
    Memory(Arc<MemoryStore>),

    /// Multi-instance: shared Redis store
    Redis {
        pool: Pool,
        /// Kept for the pub/sub listener, which needs a dedicated connection.
        url: String,
    },
}

impl CacheBackend {
    /// Create a new memory-only cache backend.
    pub fn new_memory() -> Self {
        CacheBackend::Memory(Arc::new(MemoryStore::new()))
    }

    /// Create a new Redis-backed cache backend.
    pub fn new_redis(pool: Pool, url: impl Into<String>) -> Self {
        CacheBackend::Redis {
            pool,
            url: url.into(),
        }
    }

    async fn conn(pool: &Pool) -> Option<deadpool_redis::Connection> {
        match pool.get().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get Redis connection");
                None
            }
        }
    }

    /// Get the raw string value for a key.
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        match self {
            CacheBackend::Memory(store) => store.get(key),
            CacheBackend::Redis { pool, .. } => {
                let mut conn = Self::conn(pool).await?;
                match conn.get::<_, Option<String>>(key).await {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Redis GET error");
                        None
                    }
                }
            }
        }
    }

    /// Set a raw string value, with or without expiry.
    pub async fn set_raw(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        match self {
            CacheBackend::Memory(store) => {
                store.set(key, value, ttl);
                true
            }
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return false;
                };
                let result = match ttl {
                    Some(ttl) => {
                        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                            .await
                    }
                    None => conn.set::<_, _, ()>(key, value).await,
                };
                match result {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Redis SET error");
                        false
                    }
                }
            }
        }
    }

    /// Delete a key. Returns whether a key was removed.
    pub async fn delete(&self, key: &str) -> bool {
        match self {
            CacheBackend::Memory(store) => store.delete(key),
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return false;
                };
                match conn.del::<_, u64>(key).await {
                    Ok(n) => n > 0,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Redis DEL error");
                        false
                    }
                }
            }
        }
    }

    /// Check whether a key exists.
    pub async fn exists(&self, key: &str) -> bool {
        match self {
            CacheBackend::Memory(store) => store.exists(key),
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return false;
                };
                match conn.exists::<_, bool>(key).await {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Redis EXISTS error");
                        false
                    }
                }
            }
        }
    }

    /// Atomically increment a counter key. A missing key starts at 0.
    /// Returns 0 on store error.
    pub async fn incr_by(&self, key: &str, by: i64) -> i64 {
        match self {
            CacheBackend::Memory(store) => store.incr_by(key, by),
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return 0;
                };
                match conn.incr::<_, _, i64>(key, by).await {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Redis INCRBY error");
                        0
                    }
                }
            }
        }
    }

    /// Set the expiry of an existing key. Returns `false` if the key is absent.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        match self {
            CacheBackend::Memory(store) => store.expire(key, ttl),
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return false;
                };
                match conn.expire::<_, bool>(key, ttl.as_secs().max(1) as i64).await {
                    Ok(updated) => updated,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Redis EXPIRE error");
                        false
                    }
                }
            }
        }
    }

    /// Batched get. The result has one slot per requested key, in order.
    pub async fn mget_raw(&self, keys: &[String]) -> Vec<Option<String>> {
        if keys.is_empty() {
            return Vec::new();
        }
        match self {
            CacheBackend::Memory(store) => keys.iter().map(|k| store.get(k)).collect(),
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return vec![None; keys.len()];
                };
                match conn.mget::<_, Vec<Option<String>>>(keys).await {
                    Ok(values) => values,
                    Err(e) => {
                        tracing::warn!(error = %e, "Redis MGET error");
                        vec![None; keys.len()]
                    }
                }
            }
        }
    }

    /// Batched set; in Redis mode all writes go out in one pipeline.
    pub async fn mset_raw(&self, pairs: &[(String, String)], ttl: Option<Duration>) -> bool {
        if pairs.is_empty() {
            return true;
        }
        match self {
            CacheBackend::Memory(store) => {
                for (key, value) in pairs {
                    store.set(key, value, ttl);
                }
                true
            }
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return false;
                };
                let mut pipe = redis::pipe();
                for (key, value) in pairs {
                    match ttl {
                        Some(ttl) => {
                            pipe.set_ex(key, value, ttl.as_secs().max(1)).ignore();
                        }
                        None => {
                            pipe.set(key, value).ignore();
                        }
                    }
                }
                match pipe.query_async::<()>(&mut conn).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "Redis pipelined MSET error");
                        false
                    }
                }
            }
        }
    }

    /// Enumerate keys matching a glob pattern.
    ///
    /// This walks the entire keyspace (SCAN in Redis mode) and is O(n);
    /// callers should keep it off hot paths.
    pub async fn scan_keys(&self, pattern: &str) -> Vec<String> {
        match self {
            CacheBackend::Memory(store) => store.scan_keys(pattern),
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return Vec::new();
                };
                let mut keys = Vec::new();
                match conn.scan_match::<_, String>(pattern).await {
                    Ok(mut iter) => {
                        while let Some(key) = iter.next_item().await {
                            keys.push(key);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(pattern = %pattern, error = %e, "Redis SCAN error");
                    }
                }
                keys
            }
        }
    }

    /// Delete a batch of keys. Returns the number actually removed.
    pub async fn delete_many(&self, keys: &[String]) -> u64 {
        if keys.is_empty() {
            return 0;
        }
        match self {
            CacheBackend::Memory(store) => store.delete_many(keys),
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return 0;
                };
                match conn.del::<_, u64>(keys).await {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::warn!(error = %e, "Redis bulk DEL error");
                        0
                    }
                }
            }
        }
    }

    /// Add a member to a set-typed key.
    pub async fn set_add(&self, key: &str, member: &str) -> bool {
        match self {
            CacheBackend::Memory(store) => {
                store.set_add(key, member);
                true
            }
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return false;
                };
                match conn.sadd::<_, _, ()>(key, member).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Redis SADD error");
                        false
                    }
                }
            }
        }
    }

    /// Read all members of a set-typed key.
    pub async fn set_members(&self, key: &str) -> Vec<String> {
        match self {
            CacheBackend::Memory(store) => store.set_members(key),
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return Vec::new();
                };
                match conn.smembers::<_, Vec<String>>(key).await {
                    Ok(members) => members,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Redis SMEMBERS error");
                        Vec::new()
                    }
                }
            }
        }
    }

    /// Publish a payload on a channel. A no-op in memory mode (there are no
    /// other instances to notify).
    pub async fn publish(&self, channel: &str, payload: &str) -> bool {
        match self {
            CacheBackend::Memory(_) => false,
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return false;
                };
                match conn.publish::<_, _, ()>(channel, payload).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(channel = %channel, error = %e, "Redis PUBLISH error");
                        false
                    }
                }
            }
        }
    }

    /// Total number of keys in the store.
    pub async fn key_count(&self) -> u64 {
        match self {
            CacheBackend::Memory(store) => store.key_count(),
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return 0;
                };
                match redis::cmd("DBSIZE").query_async::<u64>(&mut conn).await {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::warn!(error = %e, "Redis DBSIZE error");
                        0
                    }
                }
            }
        }
    }

    /// Approximate memory used by the store, in bytes.
    pub async fn memory_used_bytes(&self) -> u64 {
        match self {
            CacheBackend::Memory(store) => store.memory_used_bytes(),
            CacheBackend::Redis { pool, .. } => {
                let Some(mut conn) = Self::conn(pool).await else {
                    return 0;
                };
                let info: String = match redis::cmd("INFO")
                    .arg("memory")
                    .query_async(&mut conn)
                    .await
                {
                    Ok(info) => info,
                    Err(e) => {
                        tracing::warn!(error = %e, "Redis INFO error");
                        return 0;
                    }
                };
                parse_used_memory(&info).unwrap_or(0)
            }
        }
    }

    /// Check if Redis is available (for health checks).
    pub async fn is_redis_available(&self) -> bool {
        match self {
            CacheBackend::Memory(_) => false,
            CacheBackend::Redis { pool, .. } => pool.get().await.is_ok(),
        }
    }

    /// Backend mode name, for logs and stats.
    pub fn backend_name(&self) -> &'static str {
        match self {
            CacheBackend::Memory(_) => "memory",
            CacheBackend::Redis { .. } => "redis",
        }
    }

    /// Connection URL for the Redis backend, if any.
    pub fn redis_url(&self) -> Option<&str> {
        match self {
            CacheBackend::Memory(_) => None,
            CacheBackend::Redis { url, .. } => Some(url),
        }
    }
}

fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.strip_prefix("used_memory:"))
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_get_set_delete() {
        let backend = CacheBackend::new_memory();

        assert!(backend.set_raw("k1", "v1", None).await);
        assert_eq!(backend.get_raw("k1").await.as_deref(), Some("v1"));
        assert!(backend.exists("k1").await);

        assert!(backend.delete("k1").await);
        assert!(backend.get_raw("k1").await.is_none());
        assert!(!backend.delete("k1").await);
    }

    #[tokio::test]
    async fn test_memory_ttl_expiry() {
        let backend = CacheBackend::new_memory();

        backend
            .set_raw("short", "v", Some(Duration::from_millis(50)))
            .await;
        assert!(backend.get_raw("short").await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(backend.get_raw("short").await.is_none());
    }

    #[tokio::test]
    async fn test_memory_incr() {
        let backend = CacheBackend::new_memory();

        assert_eq!(backend.incr_by("counter", 1).await, 1);
        assert_eq!(backend.incr_by("counter", 5).await, 6);
        assert_eq!(backend.incr_by("counter", -2).await, 4);
    }

    #[tokio::test]
    async fn test_memory_expire_absent_key() {
        let backend = CacheBackend::new_memory();
        assert!(!backend.expire("nope", Duration::from_secs(1)).await);

        backend.set_raw("yes", "v", None).await;
        assert!(backend.expire("yes", Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn test_memory_scan_glob() {
        let backend = CacheBackend::new_memory();
        backend.set_raw("session:a", "1", None).await;
        backend.set_raw("session:b", "2", None).await;
        backend.set_raw("user:1:data", "3", None).await;

        let mut keys = backend.scan_keys("session:*").await;
        keys.sort();
        assert_eq!(keys, vec!["session:a", "session:b"]);

        // pattern metacharacters outside of glob syntax are literal
        assert!(backend.scan_keys("user:1.data").await.is_empty());
        assert_eq!(backend.scan_keys("user:?:data").await.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_sets() {
        let backend = CacheBackend::new_memory();
        backend.set_add("tag:user_data", "user:1:data").await;
        backend.set_add("tag:user_data", "user:2:data").await;
        backend.set_add("tag:user_data", "user:1:data").await;

        let mut members = backend.set_members("tag:user_data").await;
        members.sort();
        assert_eq!(members, vec!["user:1:data", "user:2:data"]);

        assert!(backend.delete("tag:user_data").await);
        assert!(backend.set_members("tag:user_data").await.is_empty());
    }

    #[tokio::test]
    async fn test_memory_key_count_and_purge() {
        let backend = CacheBackend::new_memory();
        backend.set_raw("a", "1", None).await;
        backend
            .set_raw("b", "2", Some(Duration::from_millis(30)))
            .await;
        backend.set_add("tag:t", "a").await;

        assert_eq!(backend.key_count().await, 3);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(backend.key_count().await, 2);

        if let CacheBackend::Memory(store) = &backend {
            assert_eq!(store.purge_expired(), 1);
        }
    }

    #[tokio::test]
    async fn test_memory_publish_is_noop() {
        let backend = CacheBackend::new_memory();
        assert!(!backend.publish("chan", "payload").await);
        assert!(!backend.is_redis_available().await);
        assert_eq!(backend.backend_name(), "memory");
    }

    #[test]
    fn test_parse_used_memory() {
        let info = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n";
        assert_eq!(parse_used_memory(info), Some(1_048_576));
        assert_eq!(parse_used_memory("# Memory\r\n"), None);
    }
}
