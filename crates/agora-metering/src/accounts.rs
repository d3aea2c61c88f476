//! Customer account store.
//!
//! Accounts map platform customers to their billing identity and current
//! subscription. A customer with no stored row is on the free tier; `get`
//! materializes that default instead of failing.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::ledger::MeteringError;
use crate::types::{CustomerAccount, SubscriptionStatus};

/// Storage abstraction over customer accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch an account. Unknown customers yield the free-tier default.
    async fn get(&self, customer_id: &str) -> Result<CustomerAccount, MeteringError>;

    /// Insert or replace an account.
    async fn upsert(&self, account: CustomerAccount) -> Result<(), MeteringError>;

    /// Look up the customer that a billing provider reference maps to.
    async fn find_by_billing_ref(
        &self,
        billing_ref: &str,
    ) -> Result<Option<CustomerAccount>, MeteringError>;

    /// Update the subscription fields of an account, creating the row from
    /// the free-tier default when absent.
    async fn set_subscription(
        &self,
        customer_id: &str,
        subscription_id: Option<String>,
        tier: String,
        status: SubscriptionStatus,
    ) -> Result<(), MeteringError>;

    fn backend_name(&self) -> &'static str;
}

/// In-process account store backed by a `DashMap`.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<String, CustomerAccount>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, customer_id: &str) -> Result<CustomerAccount, MeteringError> {
        Ok(self
            .accounts
            .get(customer_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| CustomerAccount::free(customer_id)))
    }

    async fn upsert(&self, account: CustomerAccount) -> Result<(), MeteringError> {
        self.accounts.insert(account.customer_id.clone(), account);
        Ok(())
    }

    async fn find_by_billing_ref(
        &self,
        billing_ref: &str,
    ) -> Result<Option<CustomerAccount>, MeteringError> {
        Ok(self
            .accounts
            .iter()
            .find(|entry| entry.value().billing_ref.as_deref() == Some(billing_ref))
            .map(|entry| entry.value().clone()))
    }

    async fn set_subscription(
        &self,
        customer_id: &str,
        subscription_id: Option<String>,
        tier: String,
        status: SubscriptionStatus,
    ) -> Result<(), MeteringError> {
        let mut account = self
            .accounts
            .entry(customer_id.to_string())
            .or_insert_with(|| CustomerAccount::free(customer_id));
        account.subscription_id = subscription_id;
        account.tier = tier;
        account.status = status;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_customer_defaults_to_free() {
        let store = MemoryAccountStore::new();
        let account = store.get("new-customer").await.unwrap();
        assert_eq!(account.tier, "free");
        assert_eq!(account.status, SubscriptionStatus::Active);
        // the default is not persisted
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = MemoryAccountStore::new();
        let mut account = CustomerAccount::free("c1").with_billing_ref("bill_123");
        account.tier = "starter".to_string();
        store.upsert(account.clone()).await.unwrap();

        assert_eq!(store.get("c1").await.unwrap(), account);
    }

    #[tokio::test]
    async fn test_find_by_billing_ref() {
        let store = MemoryAccountStore::new();
        store
            .upsert(CustomerAccount::free("c1").with_billing_ref("bill_123"))
            .await
            .unwrap();

        let found = store.find_by_billing_ref("bill_123").await.unwrap();
        assert_eq!(found.map(|a| a.customer_id), Some("c1".to_string()));
        assert!(store.find_by_billing_ref("bill_999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_subscription_creates_missing_row() {
        let store = MemoryAccountStore::new();
        store
            .set_subscription(
                "c1",
                Some("sub_1".to_string()),
                "professional".to_string(),
                SubscriptionStatus::Trialing,
            )
            .await
            .unwrap();

        let account = store.get("c1").await.unwrap();
        assert_eq!(account.tier, "professional");
        assert_eq!(account.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(account.status, SubscriptionStatus::Trialing);
    }
}
