//! Agora cache layer: typed key-value client, tag-based invalidation,
//! cross-instance Pub/Sub, and the TTL-backed session store.
//!
//! The crate runs in one of two modes behind the same API:
//! - **memory**: an in-process [`backend::MemoryStore`], the default and the
//!   test/development mode
//! - **redis**: a `deadpool_redis` pool, selected via configuration, with
//!   automatic fallback to memory when Redis is unreachable at startup
//!
//! All operations degrade rather than fail: a broken store yields misses and
//! no-ops, never errors, so callers treat the cache as strictly optional.

pub mod backend;
pub mod client;
pub mod hooks;
pub mod metrics;
pub mod pubsub;
pub mod session;
pub mod stats;

pub use backend::{CacheBackend, MemoryStore};
pub use client::{CacheClient, WriteOptions};
pub use hooks::{SubscriptionInvalidationHook, customer_tag, start_event_hooks};
pub use pubsub::{INVALIDATION_CHANNEL, InvalidationListener, InvalidationRequest};
pub use session::{SessionPatch, SessionRecord, SessionStore};
pub use stats::{CacheStats, CacheStatsRecorder};

use agora_config::RedisConfig;
use std::time::Duration;

/// Create a cache backend from configuration.
///
/// When Redis is disabled, unreachable, or the pool cannot be built, this
/// falls back to the in-process memory store rather than failing startup.
pub async fn create_cache_backend(config: &RedisConfig) -> CacheBackend {
    if !config.enabled {
        tracing::info!("Redis disabled, using in-process cache only");
        return CacheBackend::new_memory();
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    if let Some(ref mut pool_config) = redis_config.pool {
        pool_config.max_size = config.pool_size;
        pool_config.timeouts.wait = Some(Duration::from_millis(config.timeout_ms));
        pool_config.timeouts.create = Some(Duration::from_millis(config.timeout_ms));
        pool_config.timeouts.recycle = Some(Duration::from_millis(config.timeout_ms));
    }

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to in-process cache."
            );
            return CacheBackend::new_memory();
        }
    };

    // Probe the connection before committing to Redis mode
    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            CacheBackend::new_redis(pool, config.url.clone())
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-process cache."
            );
            CacheBackend::new_memory()
        }
    }
}

/// Create a cache client from configuration.
///
/// In Redis mode this also starts the invalidation listener so broadcasts
/// from other instances are applied locally.
pub async fn create_cache_client(config: &RedisConfig) -> CacheClient {
    let backend = create_cache_backend(config).await;
    let client = CacheClient::new(backend);

    if let Some(url) = client.backend().redis_url() {
        InvalidationListener {
            client: client.clone(),
            redis_url: url.to_string(),
        }
        .start()
        .await;
    }

    client
}
