//! Event types for the platform event system.
//!
//! This module defines the core event types used for inter-module communication:
//! - `BillingEvent` - usage metering and subscription lifecycle events
//! - `SessionEvent` - session creation and revocation events
//! - `PlatformEvent` - unified enum combining all event types

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use time::OffsetDateTime;

// ============================================================================
// Billing Events
// ============================================================================

/// Type of billing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventType {
    /// A usage event was recorded for a customer
    UsageTracked,
    /// A customer's month-to-date usage reached or exceeded their tier limit
    UsageLimitExceeded,
    /// A subscription was created
    SubscriptionCreated,
    /// A subscription's tier or status changed
    SubscriptionUpdated,
    /// A subscription was canceled
    SubscriptionCanceled,
    /// A payment succeeded
    PaymentSucceeded,
    /// A payment failed
    PaymentFailed,
}

impl BillingEventType {
    /// Returns the string representation of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::UsageTracked => "billing_usage_tracked",
            BillingEventType::UsageLimitExceeded => "usage_limit_exceeded",
            BillingEventType::SubscriptionCreated => "subscription_created",
            BillingEventType::SubscriptionUpdated => "subscription_updated",
            BillingEventType::SubscriptionCanceled => "subscription_canceled",
            BillingEventType::PaymentSucceeded => "payment_succeeded",
            BillingEventType::PaymentFailed => "payment_failed",
        }
    }
}

impl std::fmt::Display for BillingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event emitted by the metering service and the billing webhook processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEvent {
    /// Type of billing event
    pub event_type: BillingEventType,
    /// Platform customer ID
    pub customer_id: String,
    /// Metric name (usage events only)
    pub metric: Option<String>,
    /// Recorded quantity (usage events only)
    pub quantity: Option<i64>,
    /// Subscription tier, if relevant to the event
    pub tier: Option<String>,
    /// Billing-provider subscription ID, if relevant
    pub subscription_id: Option<String>,
    /// Reason for the event (e.g., payment failure reason)
    pub reason: Option<String>,
    /// Timestamp of the event
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl BillingEvent {
    /// Create a new billing event.
    pub fn new(event_type: BillingEventType, customer_id: impl Into<String>) -> Self {
        Self {
            event_type,
            customer_id: customer_id.into(),
            metric: None,
            quantity: None,
            tier: None,
            subscription_id: None,
            reason: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Create a "usage tracked" event.
    pub fn usage_tracked(
        customer_id: impl Into<String>,
        metric: impl Into<String>,
        quantity: i64,
    ) -> Self {
        Self {
            metric: Some(metric.into()),
            quantity: Some(quantity),
            ..Self::new(BillingEventType::UsageTracked, customer_id)
        }
    }

    /// Create a "usage limit exceeded" event.
    pub fn usage_limit_exceeded(
        customer_id: impl Into<String>,
        metric: impl Into<String>,
    ) -> Self {
        Self {
            metric: Some(metric.into()),
            ..Self::new(BillingEventType::UsageLimitExceeded, customer_id)
        }
    }

    /// Create a "subscription created" event.
    pub fn subscription_created(
        customer_id: impl Into<String>,
        subscription_id: impl Into<String>,
        tier: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: Some(subscription_id.into()),
            tier: Some(tier.into()),
            ..Self::new(BillingEventType::SubscriptionCreated, customer_id)
        }
    }

    /// Create a "subscription updated" event.
    pub fn subscription_updated(
        customer_id: impl Into<String>,
        subscription_id: impl Into<String>,
        tier: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: Some(subscription_id.into()),
            tier: Some(tier.into()),
            ..Self::new(BillingEventType::SubscriptionUpdated, customer_id)
        }
    }

    /// Create a "subscription canceled" event.
    pub fn subscription_canceled(customer_id: impl Into<String>) -> Self {
        Self::new(BillingEventType::SubscriptionCanceled, customer_id)
    }

    /// Create a "payment succeeded" event.
    pub fn payment_succeeded(customer_id: impl Into<String>) -> Self {
        Self::new(BillingEventType::PaymentSucceeded, customer_id)
    }

    /// Create a "payment failed" event.
    pub fn payment_failed(customer_id: impl Into<String>) -> Self {
        Self::new(BillingEventType::PaymentFailed, customer_id)
    }

    /// Set the tier.
    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    /// Set the subscription ID.
    pub fn with_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }

    /// Set the reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// Type of session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventType {
    /// A session was created (login)
    Created,
    /// A session was revoked (logout or administrative deletion)
    Revoked,
}

impl SessionEventType {
    /// Returns the string representation of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEventType::Created => "created",
            SessionEventType::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for SessionEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event representing a session lifecycle change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Type of session event
    pub event_type: SessionEventType,
    /// Session ID
    pub session_id: String,
    /// User the session belongs to
    pub user_id: String,
    /// Source IP address, if known
    #[serde(
        serialize_with = "serialize_ip_option",
        deserialize_with = "deserialize_ip_option",
        default
    )]
    pub ip_address: Option<IpAddr>,
    /// Timestamp of the event
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

fn serialize_ip_option<S>(ip: &Option<IpAddr>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match ip {
        Some(addr) => serializer.serialize_some(&addr.to_string()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_ip_option<'de, D>(deserializer: D) -> Result<Option<IpAddr>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

impl SessionEvent {
    /// Create a new session event.
    pub fn new(
        event_type: SessionEventType,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            session_id: session_id.into(),
            user_id: user_id.into(),
            ip_address: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Create a "session created" event.
    pub fn created(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::new(SessionEventType::Created, session_id, user_id)
    }

    /// Create a "session revoked" event.
    pub fn revoked(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::new(SessionEventType::Revoked, session_id, user_id)
    }

    /// Set the IP address.
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip_address = Some(ip);
        self
    }
}

// ============================================================================
// Platform Event (Unified)
// ============================================================================

/// Unified event enum combining all event types.
///
/// This is the main event type that flows through the event system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// A billing or metering event occurred
    Billing(BillingEvent),
    /// A session lifecycle event occurred
    Session(SessionEvent),
}

impl PlatformEvent {
    /// Create a billing event.
    pub fn billing(event: BillingEvent) -> Self {
        PlatformEvent::Billing(event)
    }

    /// Create a session event.
    pub fn session(event: SessionEvent) -> Self {
        PlatformEvent::Session(event)
    }

    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> OffsetDateTime {
        match self {
            PlatformEvent::Billing(e) => e.timestamp,
            PlatformEvent::Session(e) => e.timestamp,
        }
    }

    /// Get the billing event if this is a billing event.
    pub fn as_billing(&self) -> Option<&BillingEvent> {
        match self {
            PlatformEvent::Billing(e) => Some(e),
            _ => None,
        }
    }

    /// Get the session event if this is a session event.
    pub fn as_session(&self) -> Option<&SessionEvent> {
        match self {
            PlatformEvent::Session(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BillingEvent> for PlatformEvent {
    fn from(event: BillingEvent) -> Self {
        PlatformEvent::Billing(event)
    }
}

impl From<SessionEvent> for PlatformEvent {
    fn from(event: SessionEvent) -> Self {
        PlatformEvent::Session(event)
    }
}
