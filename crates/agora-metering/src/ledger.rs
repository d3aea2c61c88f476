//! Append-only usage ledger.
//!
//! The ledger is the system of record for metering: appends must succeed for
//! `track_usage` to succeed, everything downstream of the append is
//! best-effort. `MemoryUsageLedger` is the in-process reference
//! implementation; a SQL-backed ledger is a separate backend behind the same
//! trait.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use agora_core::BillingPeriod;

use crate::types::{UsageRecord, UsageSummary};

/// Errors from the metering subsystem.
#[derive(Debug, thiserror::Error)]
pub enum MeteringError {
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid usage quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MeteringError {
    pub fn ledger(message: impl Into<String>) -> Self {
        Self::Ledger(message.into())
    }

    /// Whether the error is the caller's fault rather than the store's.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::AccountNotFound(_) | Self::InvalidQuantity(_))
    }
}

/// Storage abstraction over the usage ledger.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Append a record. This is the authoritative write; it must not be
    /// retried on success.
    async fn append(&self, record: UsageRecord) -> Result<(), MeteringError>;

    /// Sum of quantities for one metric within the half-open period window.
    /// An empty window sums to 0.
    async fn total(
        &self,
        customer_id: &str,
        metric: &str,
        period: &BillingPeriod,
    ) -> Result<i64, MeteringError>;

    /// Per-metric totals for a customer within the period.
    async fn summary(
        &self,
        customer_id: &str,
        period: &BillingPeriod,
    ) -> Result<UsageSummary, MeteringError>;

    /// All records for a customer within the period, in append order.
    async fn records(
        &self,
        customer_id: &str,
        period: &BillingPeriod,
    ) -> Result<Vec<UsageRecord>, MeteringError>;

    fn backend_name(&self) -> &'static str;
}

/// In-process ledger backed by a `Vec` under an `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryUsageLedger {
    records: RwLock<Vec<UsageRecord>>,
}

impl MemoryUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl UsageLedger for MemoryUsageLedger {
    async fn append(&self, record: UsageRecord) -> Result<(), MeteringError> {
        self.records.write().push(record);
        Ok(())
    }

    async fn total(
        &self,
        customer_id: &str,
        metric: &str,
        period: &BillingPeriod,
    ) -> Result<i64, MeteringError> {
        let total = self
            .records
            .read()
            .iter()
            .filter(|r| {
                r.customer_id == customer_id
                    && r.metric == metric
                    && period.contains(r.timestamp)
            })
            .map(|r| r.quantity)
            .sum();
        Ok(total)
    }

    async fn summary(
        &self,
        customer_id: &str,
        period: &BillingPeriod,
    ) -> Result<UsageSummary, MeteringError> {
        let mut totals: BTreeMap<String, i64> = BTreeMap::new();
        for record in self.records.read().iter() {
            if record.customer_id == customer_id && period.contains(record.timestamp) {
                *totals.entry(record.metric.clone()).or_insert(0) += record.quantity;
            }
        }
        Ok(UsageSummary {
            customer_id: customer_id.to_string(),
            period: *period,
            totals,
        })
    }

    async fn records(
        &self,
        customer_id: &str,
        period: &BillingPeriod,
    ) -> Result<Vec<UsageRecord>, MeteringError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.customer_id == customer_id && period.contains(r.timestamp))
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
