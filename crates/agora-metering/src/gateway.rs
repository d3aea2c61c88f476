//! Billing provider gateway.
//!
//! Usage reporting is one-way: the platform POSTs usage to the provider and
//! never blocks on the answer. The gateway trait keeps the provider behind a
//! seam so disabled-billing deployments swap in the no-op implementation.

use async_trait::async_trait;
use reqwest::{Client, header};
use std::sync::Arc;
use std::time::Duration;

use agora_config::BillingSettings;

use crate::types::UsageRecord;

/// Errors from the billing provider.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Billing request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Billing provider returned status {0}")]
    Status(u16),

    #[error("Billing gateway misconfigured: {0}")]
    Configuration(String),
}

/// One-way usage reporting to the billing provider.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Report one usage record under the customer's billing reference.
    async fn report_usage(
        &self,
        record: &UsageRecord,
        billing_ref: &str,
    ) -> Result<(), GatewayError>;

    fn name(&self) -> &str;
}

/// HTTP gateway POSTing usage as JSON to the configured endpoint.
pub struct HttpBillingGateway {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpBillingGateway {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(GatewayError::Request)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// Build the gateway from configuration. Requires an endpoint.
    pub fn from_settings(settings: &BillingSettings) -> Result<Self, GatewayError> {
        let endpoint = settings
            .endpoint
            .clone()
            .ok_or_else(|| GatewayError::Configuration("billing endpoint not set".to_string()))?;
        Self::new(
            endpoint,
            settings.api_key.clone(),
            Duration::from_millis(settings.timeout_ms),
        )
    }
}

#[async_trait]
impl BillingGateway for HttpBillingGateway {
    async fn report_usage(
        &self,
        record: &UsageRecord,
        billing_ref: &str,
    ) -> Result<(), GatewayError> {
        let payload = serde_json::json!({
            "customer": billing_ref,
            "metric": record.metric,
            "quantity": record.quantity,
            "timestamp": record.timestamp
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
        });

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.json(&payload).send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!(
                customer = %billing_ref,
                metric = %record.metric,
                quantity = record.quantity,
                "Reported usage to billing provider"
            );
            Ok(())
        } else {
            Err(GatewayError::Status(status.as_u16()))
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Gateway used when billing is disabled; accepts everything and reports
/// nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBillingGateway;

#[async_trait]
impl BillingGateway for NoopBillingGateway {
    async fn report_usage(
        &self,
        _record: &UsageRecord,
        _billing_ref: &str,
    ) -> Result<(), GatewayError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Create a gateway from configuration.
///
/// Disabled billing, a missing endpoint, or a client build failure all fall
/// back to the no-op gateway so metering keeps running.
pub fn create_billing_gateway(settings: &BillingSettings) -> Arc<dyn BillingGateway> {
    if !settings.enabled {
        tracing::info!("Billing disabled, usage will not be reported");
        return Arc::new(NoopBillingGateway);
    }
    match HttpBillingGateway::from_settings(settings) {
        Ok(gateway) => {
            tracing::info!(endpoint = ?settings.endpoint, "Billing gateway configured");
            Arc::new(gateway)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build billing gateway, falling back to no-op");
            Arc::new(NoopBillingGateway)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_report_usage_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/usage"))
            .and(bearer_token("sk_test"))
            .and(body_partial_json(serde_json::json!({
                "customer": "bill_123",
                "metric": "bookings",
                "quantity": 2,
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpBillingGateway::new(
            format!("{}/usage", server.uri()),
            Some("sk_test".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();

        let record = UsageRecord::new("c1", "bookings", 2);
        gateway.report_usage(&record, "bill_123").await.unwrap();
    }

    #[tokio::test]
    async fn test_non_2xx_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let gateway = HttpBillingGateway::new(server.uri(), None, Duration::from_secs(5)).unwrap();
        let record = UsageRecord::new("c1", "bookings", 1);
        let err = gateway.report_usage(&record, "bill_123").await.unwrap_err();
        assert!(matches!(err, GatewayError::Status(500)));
    }

    #[tokio::test]
    async fn test_factory_falls_back_to_noop() {
        let disabled = BillingSettings::default();
        assert_eq!(create_billing_gateway(&disabled).name(), "noop");

        let enabled_without_endpoint = BillingSettings {
            enabled: true,
            ..BillingSettings::default()
        };
        assert_eq!(
            create_billing_gateway(&enabled_without_endpoint).name(),
            "noop"
        );
    }

    #[tokio::test]
    async fn test_factory_builds_http_gateway() {
        let settings = BillingSettings {
            enabled: true,
            endpoint: Some("https://billing.example.com/usage".to_string()),
            api_key: Some("sk_test".to_string()),
            timeout_ms: 5000,
        };
        assert_eq!(create_billing_gateway(&settings).name(), "http");
    }
}
