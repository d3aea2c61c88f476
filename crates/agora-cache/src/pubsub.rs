//! Redis Pub/Sub for cross-instance cache invalidation.
//!
//! Invalidation is best-effort and eventually consistent: there is no
//! acknowledgment or retry, so a dropped message leaves stale entries until
//! their TTL lapses.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backend::CacheBackend;
use crate::client::CacheClient;

/// Channel that invalidation requests are broadcast on.
pub const INVALIDATION_CHANNEL: &str = "agora:cache:invalidate";

/// Wire format for an invalidation broadcast.
///
/// Either or both of `pattern` and `tags` may be set; each subscriber applies
/// them against its own view of the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvalidationRequest {
    /// Glob pattern of keys to drop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Tags whose key-sets should be dropped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl InvalidationRequest {
    /// Invalidate keys matching a glob pattern.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            tags: Vec::new(),
        }
    }

    /// Invalidate all keys carrying any of the given tags.
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: None,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the request would not invalidate anything.
    pub fn is_empty(&self) -> bool {
        self.pattern.is_none() && self.tags.is_empty()
    }
}

/// Publish an invalidation request to other instances.
///
/// This is called automatically by `CacheClient::invalidate()`,
/// but can also be called directly if needed.
pub async fn publish_invalidation(backend: &CacheBackend, request: &InvalidationRequest) -> bool {
    let payload = match serde_json::to_string(request) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize invalidation request");
            return false;
        }
    };
    let published = backend.publish(INVALIDATION_CHANNEL, &payload).await;
    if published {
        tracing::debug!(payload = %payload, "published cache invalidation");
    }
    published
}

/// Cache invalidation listener that subscribes to Redis Pub/Sub.
///
/// ## How It Works
///
/// 1. Subscribe to the invalidation channel
/// 2. When a message is received, apply the pattern/tag deletes locally
/// 3. This keeps all instances' view of the cache consistent (eventually)
///
/// ## Example Flow
///
/// ```text
/// Instance 1: client.invalidate(tags(["user_data"]))
///   ↓
/// Redis Pub/Sub: PUBLISH agora:cache:invalidate {"tags":["user_data"]}
///   ↓
/// Instance 2: Listener receives request → drops tagged keys
/// Instance 3: Listener receives request → drops tagged keys
/// ```
pub struct InvalidationListener {
    pub client: CacheClient,
    pub redis_url: String,
}

impl InvalidationListener {
    /// Start listening for cache invalidation events.
    ///
    /// This spawns a background task that:
    /// 1. Subscribes to the invalidation channel
    /// 2. Applies received invalidation requests against the local client
    /// 3. Automatically reconnects with exponential backoff if the connection is lost
    pub async fn start(self) {
        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);
            const MAX_BACKOFF: Duration = Duration::from_secs(300); // 5 minutes max

            loop {
                match self.run().await {
                    Ok(()) => {
                        // Connection closed gracefully, reset backoff
                        backoff = Duration::from_secs(1);
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            backoff_secs = backoff.as_secs(),
                            "Cache invalidation listener error, reconnecting..."
                        );
                        tokio::time::sleep(backoff).await;
                        // Exponential backoff with max limit
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        });
    }

    async fn run(&self) -> Result<(), String> {
        use futures_util::StreamExt;

        // Pooled connections cannot SUBSCRIBE; use a dedicated client
        let client = redis::Client::open(self.redis_url.clone())
            .map_err(|e| format!("failed to create Redis client: {e}"))?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| format!("failed to get pub/sub connection: {e}"))?;

        pubsub
            .subscribe(INVALIDATION_CHANNEL)
            .await
            .map_err(|e| format!("failed to subscribe: {e}"))?;

        tracing::info!(channel = INVALIDATION_CHANNEL, "Subscribed to invalidation channel");

        let mut stream = pubsub.on_message();
        loop {
            match stream.next().await {
                Some(msg) => {
                    let payload = match msg.get_payload::<String>() {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to read invalidation payload");
                            continue;
                        }
                    };
                    match serde_json::from_str::<InvalidationRequest>(&payload) {
                        Ok(request) => {
                            let removed = self.client.apply_invalidation(&request).await;
                            tracing::debug!(
                                payload = %payload,
                                removed = removed,
                                "applied cache invalidation"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                payload = %payload,
                                "failed to parse invalidation message"
                            );
                        }
                    }
                }
                None => {
                    return Err("pub/sub connection closed".to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = InvalidationRequest::tags(["user_data", "listings"]);
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"tags":["user_data","listings"]}"#);

        let parsed: InvalidationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tags, vec!["user_data", "listings"]);
        assert!(parsed.pattern.is_none());
    }

    #[test]
    fn test_request_pattern_only() {
        let request = InvalidationRequest::pattern("session:*");
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"pattern":"session:*"}"#);
    }

    #[test]
    fn test_request_empty() {
        let request = InvalidationRequest::default();
        assert!(request.is_empty());
        assert!(!InvalidationRequest::pattern("x").is_empty());
    }

    #[tokio::test]
    async fn test_publish_on_memory_backend_is_noop() {
        let backend = CacheBackend::new_memory();
        let request = InvalidationRequest::pattern("session:*");
        assert!(!publish_invalidation(&backend, &request).await);
    }
}
