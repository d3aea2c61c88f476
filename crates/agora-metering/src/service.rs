//! The metering service: track usage, check quotas, summarize.
//!
//! Design priorities, in order: never lose a usage record, never block the
//! calling request on billing, surface quota breaches as events. The only
//! step whose failure fails `track_usage` is the ledger append; gateway and
//! broadcast failures are logged and swallowed.

use std::sync::Arc;

use agora_core::BillingPeriod;
use agora_core::events::{BillingEvent, EventBroadcaster};

use crate::accounts::AccountStore;
use crate::gateway::BillingGateway;
use crate::ledger::{MeteringError, UsageLedger};
use crate::tiers::{Quota, TierCatalog};
use crate::types::{UsageRecord, UsageSummary};

/// Result of one `track_usage` call.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageOutcome {
    /// `false` once month-to-date usage has reached the tier limit.
    /// Enforcement is advisory: the record was appended either way.
    pub within_limit: bool,
    /// Month-to-date total for the metric, including this record.
    pub month_total: i64,
    pub quota: Quota,
}

/// Usage metering over ledger, accounts, tier catalog, and billing gateway.
pub struct MeteringService {
    ledger: Arc<dyn UsageLedger>,
    accounts: Arc<dyn AccountStore>,
    catalog: TierCatalog,
    gateway: Arc<dyn BillingGateway>,
    broadcaster: Arc<EventBroadcaster>,
}

impl MeteringService {
    pub fn new(
        ledger: Arc<dyn UsageLedger>,
        accounts: Arc<dyn AccountStore>,
        catalog: TierCatalog,
        gateway: Arc<dyn BillingGateway>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            ledger,
            accounts,
            catalog,
            gateway,
            broadcaster,
        }
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    /// Record usage for a customer.
    ///
    /// Appends to the ledger, reports to the billing provider when the tier
    /// is metered, emits `billing_usage_tracked`, then checks the tier quota
    /// and emits `usage_limit_exceeded` once the month total reaches it.
    pub async fn track_usage(
        &self,
        customer_id: &str,
        metric: &str,
        quantity: i64,
        metadata: Option<serde_json::Value>,
    ) -> Result<UsageOutcome, MeteringError> {
        if quantity <= 0 {
            return Err(MeteringError::InvalidQuantity(quantity));
        }

        let mut record = UsageRecord::new(customer_id, metric, quantity);
        if let Some(metadata) = metadata {
            record = record.with_metadata(metadata);
        }

        // The authoritative write; everything after this is best-effort
        self.ledger.append(record.clone()).await?;

        let account = self.accounts.get(customer_id).await?;

        if self.catalog.is_metered(&account.tier) {
            if let Some(billing_ref) = &account.billing_ref {
                if let Err(e) = self.gateway.report_usage(&record, billing_ref).await {
                    tracing::warn!(
                        customer_id = %customer_id,
                        metric = %metric,
                        error = %e,
                        "Failed to report usage to billing provider"
                    );
                }
            } else {
                tracing::debug!(
                    customer_id = %customer_id,
                    tier = %account.tier,
                    "Metered tier without billing_ref, skipping usage report"
                );
            }
        }

        self.broadcaster.send_billing(
            BillingEvent::usage_tracked(customer_id, metric, quantity).with_tier(&account.tier),
        );

        let period = BillingPeriod::current_month();
        let month_total = self.ledger.total(customer_id, metric, &period).await?;
        let quota = self.catalog.quota(&account.tier, metric);

        // used = total already consumed this month; the limit event fires
        // once the total reaches the quota
        let within_limit = quota.allows(month_total);
        if !within_limit {
            tracing::info!(
                customer_id = %customer_id,
                metric = %metric,
                month_total,
                quota = %quota,
                "Usage limit reached"
            );
            self.broadcaster.send_billing(
                BillingEvent::usage_limit_exceeded(customer_id, metric)
                    .with_tier(&account.tier)
                    .with_reason(format!("{month_total} of {quota} used this month")),
            );
        }

        Ok(UsageOutcome {
            within_limit,
            month_total,
            quota,
        })
    }

    /// Whether the customer may consume more of a metric this month.
    ///
    /// Advisory: emits `usage_limit_exceeded` when the limit is reached but
    /// never blocks anything itself. The read-then-act window is unguarded,
    /// so concurrent callers may both see headroom.
    pub async fn check_usage_limits(
        &self,
        customer_id: &str,
        metric: &str,
    ) -> Result<bool, MeteringError> {
        let account = self.accounts.get(customer_id).await?;
        let period = BillingPeriod::current_month();
        let month_total = self.ledger.total(customer_id, metric, &period).await?;
        let quota = self.catalog.quota(&account.tier, metric);

        let allowed = quota.allows(month_total);
        if !allowed {
            self.broadcaster.send_billing(
                BillingEvent::usage_limit_exceeded(customer_id, metric).with_tier(&account.tier),
            );
        }
        Ok(allowed)
    }

    /// Per-metric totals for a customer; defaults to the current month.
    pub async fn usage_summary(
        &self,
        customer_id: &str,
        period: Option<BillingPeriod>,
    ) -> Result<UsageSummary, MeteringError> {
        let period = period.unwrap_or_else(BillingPeriod::current_month);
        self.ledger.summary(customer_id, &period).await
    }
}

impl std::fmt::Debug for MeteringService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeteringService")
            .field("ledger", &self.ledger.backend_name())
            .field("accounts", &self.accounts.backend_name())
            .field("gateway", &self.gateway.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::MemoryAccountStore;
    use crate::gateway::NoopBillingGateway;
    use crate::ledger::MemoryUsageLedger;
    use crate::types::{CustomerAccount, SubscriptionStatus};

    fn service() -> MeteringService {
        MeteringService::new(
            Arc::new(MemoryUsageLedger::new()),
            Arc::new(MemoryAccountStore::new()),
            TierCatalog::builtin(),
            Arc::new(NoopBillingGateway),
            Arc::new(EventBroadcaster::new()),
        )
    }

    #[tokio::test]
    async fn test_track_usage_appends_and_totals() {
        let service = service();
        let outcome = service
            .track_usage("c1", "bookings", 2, None)
            .await
            .unwrap();
        assert!(outcome.within_limit);
        assert_eq!(outcome.month_total, 2);

        let summary = service.usage_summary("c1", None).await.unwrap();
        assert_eq!(summary.total("bookings"), 2);
    }

    #[tokio::test]
    async fn test_non_positive_quantity_rejected() {
        let service = service();
        assert!(matches!(
            service.track_usage("c1", "bookings", 0, None).await,
            Err(MeteringError::InvalidQuantity(0))
        ));
        assert!(matches!(
            service.track_usage("c1", "bookings", -3, None).await,
            Err(MeteringError::InvalidQuantity(-3))
        ));
    }

    #[tokio::test]
    async fn test_limit_reached_flips_outcome() {
        let service = service();
        // free tier, bookings limit 5
        for _ in 0..4 {
            let outcome = service
                .track_usage("c1", "bookings", 1, None)
                .await
                .unwrap();
            assert!(outcome.within_limit);
        }
        let outcome = service
            .track_usage("c1", "bookings", 1, None)
            .await
            .unwrap();
        assert!(!outcome.within_limit);
        assert_eq!(outcome.month_total, 5);
    }

    #[tokio::test]
    async fn test_check_usage_limits_advisory() {
        let service = service();
        assert!(service.check_usage_limits("c1", "listings").await.unwrap());

        service.track_usage("c1", "listings", 1, None).await.unwrap();
        // free tier allows one listing; the limit is now reached
        assert!(!service.check_usage_limits("c1", "listings").await.unwrap());
    }

    #[tokio::test]
    async fn test_enterprise_is_unlimited() {
        let accounts = Arc::new(MemoryAccountStore::new());
        let service = MeteringService::new(
            Arc::new(MemoryUsageLedger::new()),
            accounts.clone(),
            TierCatalog::builtin(),
            Arc::new(NoopBillingGateway),
            Arc::new(EventBroadcaster::new()),
        );
        let mut account = CustomerAccount::free("big");
        account.tier = "enterprise".to_string();
        account.status = SubscriptionStatus::Active;
        accounts.upsert(account).await.unwrap();

        let outcome = service
            .track_usage("big", "ai_interactions", 100_000, None)
            .await
            .unwrap();
        assert!(outcome.within_limit);
        assert!(outcome.quota.is_unlimited());
    }
}
