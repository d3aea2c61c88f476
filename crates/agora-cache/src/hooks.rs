//! Cache reactions to billing events.
//!
//! Per-customer cache entries (entitlements, profile data, dashboard
//! fragments) are written with the tag from [`customer_tag`]. When the
//! webhook processor re-emits a subscription change, those entries describe
//! a tier the customer no longer has, so a hook drops the tag across all
//! instances rather than waiting for TTL expiry.

use std::sync::Arc;

use agora_core::events::{
    BillingEventType, EventBroadcaster, EventHook, HookError, HookSet, PlatformEvent,
};
use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::client::CacheClient;
use crate::pubsub::InvalidationRequest;

/// Tag carried by cache entries that depend on a customer's subscription.
pub fn customer_tag(customer_id: &str) -> String {
    format!("customer:{customer_id}")
}

/// Drops a customer's tagged cache entries when their subscription changes.
pub struct SubscriptionInvalidationHook {
    client: CacheClient,
}

impl SubscriptionInvalidationHook {
    pub fn new(client: CacheClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventHook for SubscriptionInvalidationHook {
    fn name(&self) -> &str {
        "subscription-invalidation"
    }

    fn wants(&self, event: &PlatformEvent) -> bool {
        matches!(
            event,
            PlatformEvent::Billing(billing) if matches!(
                billing.event_type,
                BillingEventType::SubscriptionCreated
                    | BillingEventType::SubscriptionUpdated
                    | BillingEventType::SubscriptionCanceled
            )
        )
    }

    async fn handle(&self, event: &PlatformEvent) -> Result<(), HookError> {
        let Some(billing) = event.as_billing() else {
            return Ok(());
        };
        let request = InvalidationRequest::tags([customer_tag(&billing.customer_id)]);
        let removed = self.client.invalidate(&request).await;
        tracing::debug!(
            customer_id = %billing.customer_id,
            event = %billing.event_type,
            removed,
            "Invalidated customer cache entries after subscription change"
        );
        Ok(())
    }
}

/// Subscribe the cache's event hooks to a broadcaster.
///
/// Returns the listener task; it runs until the broadcaster is dropped.
pub fn start_event_hooks(client: CacheClient, broadcaster: &EventBroadcaster) -> JoinHandle<()> {
    HookSet::new()
        .with_hook(Arc::new(SubscriptionInvalidationHook::new(client)))
        .listen(broadcaster.subscribe())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CacheBackend;
    use crate::client::WriteOptions;
    use agora_core::events::BillingEvent;

    fn client() -> CacheClient {
        CacheClient::new(CacheBackend::new_memory())
    }

    async fn seed_customer_entry(client: &CacheClient, key: &str, customer_id: &str) {
        let options = WriteOptions::new().with_tags(vec![customer_tag(customer_id)]);
        client.set(key, &"cached".to_string(), options).await;
    }

    #[test]
    fn test_wants_only_subscription_events() {
        let hook = SubscriptionInvalidationHook::new(client());

        let updated = PlatformEvent::Billing(BillingEvent::subscription_updated(
            "c1", "sub_1", "starter",
        ));
        let canceled = PlatformEvent::Billing(BillingEvent::subscription_canceled("c1"));
        let tracked = PlatformEvent::Billing(BillingEvent::usage_tracked("c1", "bookings", 1));

        assert!(hook.wants(&updated));
        assert!(hook.wants(&canceled));
        assert!(!hook.wants(&tracked));
    }

    #[tokio::test]
    async fn test_handle_drops_only_that_customers_entries() {
        let client = client();
        seed_customer_entry(&client, "entitlements:c1", "c1").await;
        seed_customer_entry(&client, "profile:c1", "c1").await;
        seed_customer_entry(&client, "entitlements:c2", "c2").await;

        let hook = SubscriptionInvalidationHook::new(client.clone());
        let event = PlatformEvent::Billing(BillingEvent::subscription_canceled("c1"));
        hook.handle(&event).await.unwrap();

        assert_eq!(client.get::<String>("entitlements:c1").await, None);
        assert_eq!(client.get::<String>("profile:c1").await, None);
        assert_eq!(
            client.get::<String>("entitlements:c2").await,
            Some("cached".to_string())
        );
    }
}
