use super::{GatewayEvent, PaymentGateway, RemotePayment};
use crate::domain::transaction::{Amount, PaymentMethod, PaymentRequest, PaymentStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scriptable in-memory gateway used by tests and the replay harness.
///
/// Remote payments live in a shared map keyed by external reference; each
/// capability can be armed to fail on its next use.
#[derive(Clone)]
pub struct MockGateway {
    method: PaymentMethod,
    state: Arc<RwLock<MockState>>,
}

#[derive(Default)]
struct MockState {
    sequence: u64,
    remote_status: HashMap<String, String>,
    refund_sequence: u64,
    fail_open: Option<String>,
    fail_capture: Option<String>,
    fail_cancel: Option<String>,
    fail_refund: Option<String>,
}

impl MockGateway {
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            state: Arc::new(RwLock::new(MockState::default())),
        }
    }

    /// Scripts the provider-side status for an existing remote payment.
    pub async fn set_remote_status(&self, reference: &str, status: &str) {
        let mut state = self.state.write().await;
        state.remote_status.insert(reference.to_string(), status.to_string());
    }

    pub async fn set_open_failure(&self, message: Option<&str>) {
        self.state.write().await.fail_open = message.map(str::to_string);
    }

    pub async fn set_capture_failure(&self, message: Option<&str>) {
        self.state.write().await.fail_capture = message.map(str::to_string);
    }

    pub async fn set_cancel_failure(&self, message: Option<&str>) {
        self.state.write().await.fail_cancel = message.map(str::to_string);
    }

    pub async fn set_refund_failure(&self, message: Option<&str>) {
        self.state.write().await.fail_refund = message.map(str::to_string);
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn open_payment(&self, _request: &PaymentRequest) -> Result<RemotePayment> {
        let mut state = self.state.write().await;
        if let Some(message) = &state.fail_open {
            return Err(PaymentError::Gateway(message.clone()));
        }
        state.sequence += 1;
        let reference = format!("mock_{}", state.sequence);
        state
            .remote_status
            .insert(reference.clone(), "created".to_string());
        Ok(RemotePayment {
            external_reference: reference.clone(),
            provider_status: "created".to_string(),
            client_token: Some(format!("https://pay.mock.test/approve/{reference}")),
        })
    }

    async fn capture_or_retrieve(&self, external_reference: &str) -> Result<String> {
        let state = self.state.read().await;
        if let Some(message) = &state.fail_capture {
            return Err(PaymentError::Gateway(message.clone()));
        }
        state
            .remote_status
            .get(external_reference)
            .cloned()
            .ok_or_else(|| {
                PaymentError::Gateway(format!("unknown remote payment {external_reference}"))
            })
    }

    async fn cancel_remote(&self, external_reference: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(message) = &state.fail_cancel {
            return Err(PaymentError::Gateway(message.clone()));
        }
        state
            .remote_status
            .insert(external_reference.to_string(), "canceled".to_string());
        Ok(())
    }

    async fn refund_remote(
        &self,
        _external_reference: &str,
        _amount: Amount,
        _currency: &str,
        _reason: Option<&str>,
    ) -> Result<String> {
        let mut state = self.state.write().await;
        if let Some(message) = &state.fail_refund {
            return Err(PaymentError::Gateway(message.clone()));
        }
        state.refund_sequence += 1;
        Ok(format!("re_mock_{}", state.refund_sequence))
    }

    fn map_remote_status(&self, provider_status: &str) -> PaymentStatus {
        match provider_status {
            "created" | "approved" | "requires_action" => PaymentStatus::Pending,
            "processing" => PaymentStatus::Processing,
            "succeeded" | "completed" => PaymentStatus::Completed,
            "canceled" | "voided" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Failed,
        }
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<Option<GatewayEvent>> {
        let event: MockWebhook = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::ValidationError(format!("malformed mock webhook payload: {e}"))
        })?;
        Ok(Some(GatewayEvent {
            external_reference: event.reference,
            provider_status: event.status,
            failure_reason: event.reason,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct MockWebhook {
    reference: String,
    status: String,
    reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> PaymentRequest {
        PaymentRequest {
            order_id: "ORD-1".to_string(),
            user_id: "user-1".to_string(),
            amount: Amount::new(dec!(5.00)).unwrap(),
            currency: "USD".to_string(),
            method: PaymentMethod::Stripe,
            customer: Default::default(),
            billing_address: None,
            description: None,
            success_url: None,
            cancel_url: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_open_assigns_sequential_references() {
        let gateway = MockGateway::new(PaymentMethod::Stripe);
        let first = gateway.open_payment(&request()).await.unwrap();
        let second = gateway.open_payment(&request()).await.unwrap();
        assert_eq!(first.external_reference, "mock_1");
        assert_eq!(second.external_reference, "mock_2");
        assert_eq!(first.provider_status, "created");
    }

    #[tokio::test]
    async fn test_scripted_status_roundtrip() {
        let gateway = MockGateway::new(PaymentMethod::Stripe);
        let remote = gateway.open_payment(&request()).await.unwrap();
        gateway
            .set_remote_status(&remote.external_reference, "succeeded")
            .await;
        let status = gateway
            .capture_or_retrieve(&remote.external_reference)
            .await
            .unwrap();
        assert_eq!(gateway.map_remote_status(&status), PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_armed_failure() {
        let gateway = MockGateway::new(PaymentMethod::Stripe);
        gateway.set_open_failure(Some("provider down")).await;
        assert!(matches!(
            gateway.open_payment(&request()).await,
            Err(PaymentError::Gateway(_))
        ));
    }
}
