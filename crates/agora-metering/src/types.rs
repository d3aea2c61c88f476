//! Core data types for usage metering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

use agora_core::BillingPeriod;

/// A single metered usage event. Append-only; records are never mutated or
/// deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub customer_id: String,
    /// Metric name, e.g. `ai_interactions`, `bookings`, `listings`
    pub metric: String,
    pub quantity: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl UsageRecord {
    pub fn new(customer_id: impl Into<String>, metric: impl Into<String>, quantity: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id: customer_id.into(),
            metric: metric.into(),
            quantity,
            timestamp: OffsetDateTime::now_utc(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Per-metric usage totals for a customer over a billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub customer_id: String,
    pub period: BillingPeriod,
    pub totals: BTreeMap<String, i64>,
}

impl UsageSummary {
    pub fn empty(customer_id: impl Into<String>, period: BillingPeriod) -> Self {
        Self {
            customer_id: customer_id.into(),
            period,
            totals: BTreeMap::new(),
        }
    }

    /// Total for one metric; 0 when the metric has no records.
    pub fn total(&self, metric: &str) -> i64 {
        self.totals.get(metric).copied().unwrap_or(0)
    }
}

/// Subscription state as reported by the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
}

impl SubscriptionStatus {
    /// Whether the subscription currently grants its tier's quotas.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "trialing" => Ok(Self::Trialing),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Canceled),
            "incomplete" => Ok(Self::Incomplete),
            other => Err(format!("unknown subscription status: {other}")),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer's billing identity and subscription state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAccount {
    pub customer_id: String,
    /// The billing provider's identifier for this customer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    pub tier: String,
    pub status: SubscriptionStatus,
}

impl CustomerAccount {
    /// The default account for a customer with no stored row: free tier,
    /// active.
    pub fn free(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            billing_ref: None,
            subscription_id: None,
            tier: "free".to_string(),
            status: SubscriptionStatus::Active,
        }
    }

    pub fn with_billing_ref(mut self, billing_ref: impl Into<String>) -> Self {
        self.billing_ref = Some(billing_ref.into());
        self
    }
}
