//! Agora usage metering: append-only usage ledger, subscription tiers with
//! monthly quotas, billing provider reporting, and webhook-driven
//! subscription lifecycle.
//!
//! The ledger append is the only operation whose failure propagates to
//! callers; billing reporting and event broadcast are best-effort so an
//! unreachable billing provider never blocks a customer request. Quota
//! enforcement is advisory and surfaced through `usage_limit_exceeded`
//! events rather than rejections.

pub mod accounts;
pub mod gateway;
pub mod ledger;
pub mod service;
pub mod tiers;
pub mod types;
pub mod webhooks;

pub use accounts::{AccountStore, MemoryAccountStore};
pub use gateway::{
    BillingGateway, GatewayError, HttpBillingGateway, NoopBillingGateway, create_billing_gateway,
};
pub use ledger::{MemoryUsageLedger, MeteringError, UsageLedger};
pub use service::{MeteringService, UsageOutcome};
pub use tiers::{FREE_TIER, Quota, TierCatalog};
pub use types::{CustomerAccount, SubscriptionStatus, UsageRecord, UsageSummary};
pub use webhooks::{WebhookError, WebhookEvent, WebhookProcessor};
