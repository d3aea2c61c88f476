//! Integration tests for the cache layer in memory mode.
//!
//! These exercise the public API end to end: typed reads and writes, TTL
//! expiry, tag invalidation, and the session store. No external services.

use agora_cache::{
    CacheBackend, CacheClient, InvalidationRequest, SessionPatch, SessionRecord, SessionStore,
    WriteOptions, create_cache_backend, customer_tag, start_event_hooks,
};
use agora_config::RedisConfig;
use agora_core::events::{BillingEvent, EventBroadcaster};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn client() -> CacheClient {
    CacheClient::new(CacheBackend::new_memory())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Listing {
    id: String,
    title: String,
    price_cents: i64,
}

fn listing(id: &str) -> Listing {
    Listing {
        id: id.to_string(),
        title: format!("Listing {id}"),
        price_cents: 9_900,
    }
}

#[tokio::test]
async fn test_disabled_redis_falls_back_to_memory() {
    let config = RedisConfig {
        enabled: false,
        ..RedisConfig::default()
    };
    let backend = create_cache_backend(&config).await;
    assert_eq!(backend.backend_name(), "memory");
}

#[tokio::test]
async fn test_unreachable_redis_falls_back_to_memory() {
    let config = RedisConfig {
        enabled: true,
        url: "redis://127.0.0.1:1".to_string(),
        pool_size: 1,
        timeout_ms: 200,
    };
    let backend = create_cache_backend(&config).await;
    assert_eq!(backend.backend_name(), "memory");
}

#[tokio::test]
async fn test_typed_round_trip_and_miss() {
    let client = client();
    let l = listing("a1");

    assert!(client.set("listing:a1", &l, WriteOptions::new()).await);
    assert_eq!(client.get::<Listing>("listing:a1").await, Some(l));
    assert!(client.get::<Listing>("listing:missing").await.is_none());
}

#[tokio::test]
async fn test_ttl_expiry() {
    let client = client();
    let options = WriteOptions::new().with_ttl(Duration::from_millis(100));
    client.set("short-lived", &1i64, options).await;

    assert!(client.exists("short-lived").await);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!client.exists("short-lived").await);
}

#[tokio::test]
async fn test_counter_increment() {
    let client = client();
    assert_eq!(client.increment("views:a1", 1).await, 1);
    assert_eq!(client.increment("views:a1", 5).await, 6);
}

#[tokio::test]
async fn test_batched_get_preserves_order() {
    let client = client();
    client.set("k1", &listing("1"), WriteOptions::new()).await;
    client.set("k3", &listing("3"), WriteOptions::new()).await;

    let keys: Vec<String> = vec!["k1".into(), "k2".into(), "k3".into()];
    let values: Vec<Option<Listing>> = client.mget(&keys).await;
    assert_eq!(values.len(), 3);
    assert_eq!(values[0], Some(listing("1")));
    assert!(values[1].is_none());
    assert_eq!(values[2], Some(listing("3")));
}

#[tokio::test]
async fn test_batched_set_then_batched_get() {
    let client = client();
    let pairs = vec![("k1".to_string(), listing("1")), ("k2".to_string(), listing("2"))];
    assert!(client.mset(&pairs, None).await);

    let keys: Vec<String> = vec!["k1".into(), "k2".into(), "k3".into()];
    let values: Vec<Option<Listing>> = client.mget(&keys).await;
    assert_eq!(values, vec![Some(listing("1")), Some(listing("2")), None]);
}

#[tokio::test]
async fn test_batched_set_applies_shared_ttl() {
    let client = client();
    let pairs = vec![("t1".to_string(), 1i64), ("t2".to_string(), 2i64)];
    assert!(client.mset(&pairs, Some(Duration::from_millis(100))).await);

    assert!(client.exists("t1").await);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!client.exists("t1").await);
    assert!(!client.exists("t2").await);
}

#[tokio::test]
async fn test_pattern_invalidation() {
    let client = client();
    client.set("search:rust", &1i64, WriteOptions::new()).await;
    client.set("search:tokio", &2i64, WriteOptions::new()).await;
    client.set("listing:a1", &3i64, WriteOptions::new()).await;

    let removed = client.delete_pattern("search:*").await;
    assert_eq!(removed, 2);
    assert!(client.exists("listing:a1").await);
}

#[tokio::test]
async fn test_tag_invalidation_end_to_end() {
    let client = client();
    let tagged = WriteOptions::new().with_tags(["seller:42"]);
    client.set("listing:a1", &listing("a1"), tagged.clone()).await;
    client.set("listing:a2", &listing("a2"), tagged).await;
    client
        .set("listing:b1", &listing("b1"), WriteOptions::new())
        .await;

    let removed = client
        .invalidate(&InvalidationRequest::tags(["seller:42"]))
        .await;
    assert_eq!(removed, 2);
    assert!(!client.exists("listing:a1").await);
    assert!(client.exists("listing:b1").await);
}

#[tokio::test]
async fn test_subscription_event_invalidates_customer_entries() {
    let client = client();
    let tagged = WriteOptions::new().with_tags([customer_tag("cust-7")]);
    client.set("entitlements:cust-7", &listing("e7"), tagged).await;
    client
        .set("entitlements:cust-8", &listing("e8"), WriteOptions::new())
        .await;

    let broadcaster = EventBroadcaster::new();
    let _listener = start_event_hooks(client.clone(), &broadcaster);

    broadcaster.send_billing(BillingEvent::subscription_updated("cust-7", "sub_1", "starter"));

    // The hook runs in a background task; poll for the invalidation
    let mut removed = false;
    for _ in 0..50 {
        if !client.exists("entitlements:cust-7").await {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(removed, "customer entries were not invalidated");
    assert!(client.exists("entitlements:cust-8").await);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let store = SessionStore::new(client(), Duration::from_secs(3600));
    let record = SessionRecord::new("user-9", "buyer").with_user_agent("integration-test");
    assert!(store.set_session("sess-9", &record).await);

    let patch = SessionPatch::new().with_preferences(serde_json::json!({"locale": "en-US"}));
    assert!(store.update_session("sess-9", patch).await);
    let updated = store.get_session("sess-9").await.unwrap();
    assert_eq!(updated.preferences, serde_json::json!({"locale": "en-US"}));

    assert!(store.delete_session("sess-9").await);
    assert!(store.get_session("sess-9").await.is_none());
}

#[tokio::test]
async fn test_session_expires_with_store_ttl() {
    let store = SessionStore::new(client(), Duration::from_millis(100));
    let record = SessionRecord::new("user-ttl", "buyer");
    store.set_session("sess-ttl", &record).await;

    assert!(store.get_session("sess-ttl").await.is_some());
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(store.get_session("sess-ttl").await.is_none());
}

#[tokio::test]
async fn test_concurrent_increments_sum() {
    let client = client();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..50 {
                client.increment("concurrent:counter", 1).await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(client.increment("concurrent:counter", 0).await, 400);
}
