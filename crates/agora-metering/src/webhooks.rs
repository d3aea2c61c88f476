//! Billing provider webhook processing.
//!
//! Webhooks arrive as a provider-agnostic JSON envelope
//! `{ "type": "...", "data": { ... } }`. The processor updates the stored
//! account and re-emits the equivalent billing event so other subsystems
//! (cache invalidation hooks, notifications) react without parsing webhooks
//! themselves.

use std::str::FromStr;
use std::sync::Arc;

use agora_core::events::{BillingEvent, EventBroadcaster};

use crate::accounts::AccountStore;
use crate::ledger::MeteringError;
use crate::tiers::FREE_TIER;
use crate::types::{CustomerAccount, SubscriptionStatus};

/// Errors from webhook parsing and processing.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Unknown webhook event type: {0}")]
    UnknownEventType(String),

    #[error("Webhook payload missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid webhook JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] MeteringError),
}

/// A parsed billing provider webhook.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    SubscriptionCreated {
        customer_ref: String,
        subscription_id: String,
        tier: String,
        status: SubscriptionStatus,
    },
    SubscriptionUpdated {
        customer_ref: String,
        subscription_id: String,
        tier: String,
        status: SubscriptionStatus,
    },
    SubscriptionCanceled {
        customer_ref: String,
        subscription_id: String,
    },
    PaymentSucceeded {
        customer_ref: String,
        amount_cents: Option<i64>,
        invoice: Option<String>,
    },
    PaymentFailed {
        customer_ref: String,
        reason: Option<String>,
    },
}

fn required_str(data: &serde_json::Value, field: &'static str) -> Result<String, WebhookError> {
    data.get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(WebhookError::MissingField(field))
}

fn optional_str(data: &serde_json::Value, field: &str) -> Option<String> {
    data.get(field).and_then(|v| v.as_str()).map(str::to_string)
}

fn parse_status(data: &serde_json::Value) -> Result<SubscriptionStatus, WebhookError> {
    match optional_str(data, "status") {
        Some(raw) => SubscriptionStatus::from_str(&raw)
            .map_err(|_| WebhookError::MissingField("status")),
        None => Ok(SubscriptionStatus::Active),
    }
}

impl WebhookEvent {
    /// Parse the provider envelope.
    pub fn parse(payload: &serde_json::Value) -> Result<Self, WebhookError> {
        let event_type = payload
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(WebhookError::MissingField("type"))?;
        let empty = serde_json::Value::Object(serde_json::Map::new());
        let data = payload.get("data").unwrap_or(&empty);

        match event_type {
            "subscription_created" => Ok(Self::SubscriptionCreated {
                customer_ref: required_str(data, "customer")?,
                subscription_id: required_str(data, "subscription_id")?,
                tier: required_str(data, "tier")?,
                status: parse_status(data)?,
            }),
            "subscription_updated" => Ok(Self::SubscriptionUpdated {
                customer_ref: required_str(data, "customer")?,
                subscription_id: required_str(data, "subscription_id")?,
                tier: required_str(data, "tier")?,
                status: parse_status(data)?,
            }),
            "subscription_canceled" => Ok(Self::SubscriptionCanceled {
                customer_ref: required_str(data, "customer")?,
                subscription_id: required_str(data, "subscription_id")?,
            }),
            "payment_succeeded" => Ok(Self::PaymentSucceeded {
                customer_ref: required_str(data, "customer")?,
                amount_cents: data.get("amount_cents").and_then(|v| v.as_i64()),
                invoice: optional_str(data, "invoice"),
            }),
            "payment_failed" => Ok(Self::PaymentFailed {
                customer_ref: required_str(data, "customer")?,
                reason: optional_str(data, "reason"),
            }),
            other => Err(WebhookError::UnknownEventType(other.to_string())),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SubscriptionCreated { .. } => "subscription_created",
            Self::SubscriptionUpdated { .. } => "subscription_updated",
            Self::SubscriptionCanceled { .. } => "subscription_canceled",
            Self::PaymentSucceeded { .. } => "payment_succeeded",
            Self::PaymentFailed { .. } => "payment_failed",
        }
    }

    pub fn customer_ref(&self) -> &str {
        match self {
            Self::SubscriptionCreated { customer_ref, .. }
            | Self::SubscriptionUpdated { customer_ref, .. }
            | Self::SubscriptionCanceled { customer_ref, .. }
            | Self::PaymentSucceeded { customer_ref, .. }
            | Self::PaymentFailed { customer_ref, .. } => customer_ref,
        }
    }
}

/// Applies webhook events to the account store and re-broadcasts them.
pub struct WebhookProcessor {
    accounts: Arc<dyn AccountStore>,
    broadcaster: Arc<EventBroadcaster>,
}

impl WebhookProcessor {
    pub fn new(accounts: Arc<dyn AccountStore>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            accounts,
            broadcaster,
        }
    }

    /// Resolve the platform customer behind a billing reference.
    ///
    /// An unmapped reference is treated as the customer id itself, covering
    /// deployments where the platform uses its own ids with the provider.
    async fn resolve_customer(&self, customer_ref: &str) -> Result<CustomerAccount, WebhookError> {
        match self.accounts.find_by_billing_ref(customer_ref).await? {
            Some(account) => Ok(account),
            None => {
                let account = self.accounts.get(customer_ref).await?;
                Ok(account)
            }
        }
    }

    /// Apply one webhook event.
    pub async fn process(&self, event: WebhookEvent) -> Result<(), WebhookError> {
        let account = self.resolve_customer(event.customer_ref()).await?;
        let customer_id = account.customer_id.clone();

        match &event {
            WebhookEvent::SubscriptionCreated {
                subscription_id,
                tier,
                status,
                ..
            } => {
                self.accounts
                    .set_subscription(
                        &customer_id,
                        Some(subscription_id.clone()),
                        tier.clone(),
                        *status,
                    )
                    .await?;
                self.broadcaster.send_billing(
                    BillingEvent::subscription_created(&customer_id, subscription_id, tier),
                );
            }
            WebhookEvent::SubscriptionUpdated {
                subscription_id,
                tier,
                status,
                ..
            } => {
                self.accounts
                    .set_subscription(
                        &customer_id,
                        Some(subscription_id.clone()),
                        tier.clone(),
                        *status,
                    )
                    .await?;
                self.broadcaster.send_billing(
                    BillingEvent::subscription_updated(&customer_id, subscription_id, tier),
                );
            }
            WebhookEvent::SubscriptionCanceled {
                subscription_id, ..
            } => {
                // Canceled customers drop back to the free tier
                self.accounts
                    .set_subscription(
                        &customer_id,
                        None,
                        FREE_TIER.to_string(),
                        SubscriptionStatus::Canceled,
                    )
                    .await?;
                self.broadcaster.send_billing(
                    BillingEvent::subscription_canceled(&customer_id)
                        .with_subscription(subscription_id),
                );
            }
            WebhookEvent::PaymentSucceeded { .. } => {
                // Payment outcomes change the status, never the tier; tier
                // moves arrive as separate subscription events
                let mut account = account.clone();
                account.status = SubscriptionStatus::Active;
                self.accounts.upsert(account).await?;
                self.broadcaster
                    .send_billing(BillingEvent::payment_succeeded(&customer_id));
            }
            WebhookEvent::PaymentFailed { reason, .. } => {
                let mut account = account.clone();
                account.status = SubscriptionStatus::PastDue;
                self.accounts.upsert(account).await?;
                let mut billing = BillingEvent::payment_failed(&customer_id);
                if let Some(reason) = reason {
                    billing = billing.with_reason(reason);
                }
                self.broadcaster.send_billing(billing);
            }
        }

        tracing::info!(
            customer_id = %customer_id,
            event = %event.event_name(),
            "Processed billing webhook"
        );
        Ok(())
    }

    /// Parse and apply a raw envelope in one step.
    pub async fn process_payload(&self, payload: &serde_json::Value) -> Result<(), WebhookError> {
        self.process(WebhookEvent::parse(payload)?).await
    }
}
