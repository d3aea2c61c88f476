//! Integration tests for the metering pipeline: ledger, quotas, events,
//! billing gateway, and webhook lifecycle together.

use std::sync::Arc;

use agora_config::BillingSettings;
use agora_core::events::{BillingEventType, EventBroadcaster, PlatformEvent};
use agora_metering::{
    AccountStore, CustomerAccount, HttpBillingGateway, MemoryAccountStore, MemoryUsageLedger, MeteringService,
    NoopBillingGateway, SubscriptionStatus, TierCatalog, WebhookProcessor,
};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    ledger: Arc<MemoryUsageLedger>,
    accounts: Arc<MemoryAccountStore>,
    broadcaster: Arc<EventBroadcaster>,
    service: MeteringService,
}

fn harness_with_gateway(gateway: Arc<dyn agora_metering::BillingGateway>) -> Harness {
    let ledger = Arc::new(MemoryUsageLedger::new());
    let accounts = Arc::new(MemoryAccountStore::new());
    let broadcaster = Arc::new(EventBroadcaster::new());
    let service = MeteringService::new(
        ledger.clone(),
        accounts.clone(),
        TierCatalog::builtin(),
        gateway,
        broadcaster.clone(),
    );
    Harness {
        ledger,
        accounts,
        broadcaster,
        service,
    }
}

fn harness() -> Harness {
    harness_with_gateway(Arc::new(NoopBillingGateway))
}

fn billing_events(
    rx: &mut tokio::sync::broadcast::Receiver<PlatformEvent>,
) -> Vec<BillingEventType> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PlatformEvent::Billing(billing) = event {
            events.push(billing.event_type);
        }
    }
    events
}

#[tokio::test]
async fn test_free_tier_ai_interactions_scenario() {
    let h = harness();
    let mut rx = h.broadcaster.subscribe();

    // free tier: ai_interactions limit is 10
    for call in 1..=9 {
        let outcome = h
            .service
            .track_usage("cust-free", "ai_interactions", 1, None)
            .await
            .unwrap();
        assert!(outcome.within_limit, "call {call} should be within limit");
        assert_eq!(outcome.month_total, call);
    }

    let events = billing_events(&mut rx);
    assert_eq!(events.len(), 9);
    assert!(events.iter().all(|e| *e == BillingEventType::UsageTracked));

    // the tenth call reaches the limit and emits the event exactly once
    let outcome = h
        .service
        .track_usage("cust-free", "ai_interactions", 1, None)
        .await
        .unwrap();
    assert!(!outcome.within_limit);
    assert_eq!(outcome.month_total, 10);

    let events = billing_events(&mut rx);
    assert_eq!(
        events,
        vec![
            BillingEventType::UsageTracked,
            BillingEventType::UsageLimitExceeded
        ]
    );

    assert_eq!(h.ledger.len(), 10);
}

#[tokio::test]
async fn test_gateway_success_reports_for_metered_tier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "customer": "bill_42",
            "metric": "bookings",
            "quantity": 3,
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Arc::new(
        HttpBillingGateway::new(server.uri(), None, std::time::Duration::from_secs(5)).unwrap(),
    );
    let h = harness_with_gateway(gateway);
    let mut account = CustomerAccount::free("cust-paid").with_billing_ref("bill_42");
    account.tier = "starter".to_string();
    h.accounts.upsert(account).await.unwrap();

    let outcome = h
        .service
        .track_usage("cust-paid", "bookings", 3, None)
        .await
        .unwrap();
    assert!(outcome.within_limit);
}

#[tokio::test]
async fn test_gateway_failure_is_swallowed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let gateway = Arc::new(
        HttpBillingGateway::new(server.uri(), None, std::time::Duration::from_secs(5)).unwrap(),
    );
    let h = harness_with_gateway(gateway);
    let mut account = CustomerAccount::free("cust-paid").with_billing_ref("bill_42");
    account.tier = "starter".to_string();
    h.accounts.upsert(account).await.unwrap();

    // the ledger write succeeded, so the call succeeds despite the 500
    let outcome = h
        .service
        .track_usage("cust-paid", "bookings", 1, None)
        .await
        .unwrap();
    assert!(outcome.within_limit);
    assert_eq!(h.ledger.len(), 1);
}

#[tokio::test]
async fn test_free_tier_is_not_reported_to_gateway() {
    // a gateway pointing nowhere would error loudly if called
    let gateway = Arc::new(
        HttpBillingGateway::from_settings(&BillingSettings {
            enabled: true,
            endpoint: Some("http://127.0.0.1:1/usage".to_string()),
            api_key: None,
            timeout_ms: 200,
        })
        .unwrap(),
    );
    let h = harness_with_gateway(gateway);

    let outcome = h
        .service
        .track_usage("cust-free", "bookings", 1, None)
        .await
        .unwrap();
    assert!(outcome.within_limit);
}

#[tokio::test]
async fn test_webhook_lifecycle_drives_quotas() {
    let h = harness();
    let processor = WebhookProcessor::new(h.accounts.clone(), h.broadcaster.clone());
    h.accounts
        .upsert(CustomerAccount::free("cust-1").with_billing_ref("bill_9"))
        .await
        .unwrap();

    processor
        .process_payload(&serde_json::json!({
            "type": "subscription_created",
            "data": {
                "customer": "bill_9",
                "subscription_id": "sub_9",
                "tier": "starter",
                "status": "active"
            }
        }))
        .await
        .unwrap();

    // starter allows 50 bookings, so the sixth one is still fine
    for _ in 0..6 {
        let outcome = h
            .service
            .track_usage("cust-1", "bookings", 1, None)
            .await
            .unwrap();
        assert!(outcome.within_limit);
    }

    processor
        .process_payload(&serde_json::json!({
            "type": "subscription_canceled",
            "data": { "customer": "bill_9", "subscription_id": "sub_9" }
        }))
        .await
        .unwrap();

    let account = h.accounts.get("cust-1").await.unwrap();
    assert_eq!(account.tier, "free");
    assert_eq!(account.status, SubscriptionStatus::Canceled);

    // back on the free tier, the existing six bookings exceed the limit of 5
    let outcome = h
        .service
        .track_usage("cust-1", "bookings", 1, None)
        .await
        .unwrap();
    assert!(!outcome.within_limit);
}
