use super::{GatewayEvent, PaymentGateway, RemotePayment};
use crate::domain::transaction::{Amount, PaymentMethod, PaymentRequest, PaymentStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Stripe adapter: direct payment-intent flow with automatic capture.
pub struct StripeGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self::with_base_url(secret_key, DEFAULT_BASE_URL)
    }

    /// Overriding the base URL keeps the adapter testable against a local
    /// HTTP double.
    pub fn with_base_url(secret_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        let base_url = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    /// Scales a decimal major-unit amount to Stripe's integer minor units,
    /// truncating toward zero. Exact for two-decimal currencies.
    fn minor_units(amount: Amount) -> Result<i64> {
        (amount.value() * Decimal::from(100))
            .trunc()
            .to_i64()
            .ok_or_else(|| {
                PaymentError::ValidationError("amount out of range for minor units".to_string())
            })
    }

    async fn read_intent(&self, response: reqwest::Response) -> Result<PaymentIntent> {
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(response.json::<PaymentIntent>().await?)
    }

    async fn api_error(response: reqwest::Response) -> PaymentError {
        let status = response.status();
        let message = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope
                .error
                .message
                .unwrap_or_else(|| "unknown error".to_string()),
            Err(_) => "unreadable error body".to_string(),
        };
        PaymentError::Gateway(format!("stripe returned {status}: {message}"))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    async fn open_payment(&self, request: &PaymentRequest) -> Result<RemotePayment> {
        let mut params = vec![
            ("amount", Self::minor_units(request.amount)?.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("metadata[order_id]", request.order_id.clone()),
            ("metadata[user_id]", request.user_id.clone()),
            (
                "automatic_payment_methods[enabled]",
                "true".to_string(),
            ),
        ];
        if let Some(description) = &request.description {
            params.push(("description", description.clone()));
        }
        if let Some(email) = &request.customer.email {
            params.push(("receipt_email", email.clone()));
        }

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            // A timed-out create may still have succeeded remotely; the key
            // makes the retry return the same intent instead of a second one.
            .header("Idempotency-Key", format!("pi-{}", request.order_id))
            .form(&params)
            .send()
            .await?;
        let intent = self.read_intent(response).await?;
        tracing::info!(intent = %intent.id, order = %request.order_id, "stripe payment intent created");

        Ok(RemotePayment {
            external_reference: intent.id,
            provider_status: intent.status,
            client_token: intent.client_secret,
        })
    }

    async fn capture_or_retrieve(&self, external_reference: &str) -> Result<String> {
        let response = self
            .client
            .get(format!(
                "{}/v1/payment_intents/{external_reference}",
                self.base_url
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let intent = self.read_intent(response).await?;
        Ok(intent.status)
    }

    async fn cancel_remote(&self, external_reference: &str) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/v1/payment_intents/{external_reference}/cancel",
                self.base_url
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        self.read_intent(response).await?;
        tracing::info!(intent = %external_reference, "stripe payment intent cancelled");
        Ok(())
    }

    async fn refund_remote(
        &self,
        external_reference: &str,
        amount: Amount,
        _currency: &str,
        reason: Option<&str>,
    ) -> Result<String> {
        let mut params = vec![
            ("payment_intent", external_reference.to_string()),
            ("amount", Self::minor_units(amount)?.to_string()),
            ("reason", "requested_by_customer".to_string()),
        ];
        if let Some(reason) = reason {
            params.push(("metadata[note]", reason.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/v1/refunds", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let refund = response.json::<Refund>().await?;
        tracing::info!(refund = %refund.id, intent = %external_reference, "stripe refund created");
        Ok(refund.id)
    }

    fn map_remote_status(&self, provider_status: &str) -> PaymentStatus {
        match provider_status {
            "requires_payment_method" | "requires_confirmation" | "requires_action"
            | "requires_capture" => PaymentStatus::Pending,
            "processing" => PaymentStatus::Processing,
            "succeeded" => PaymentStatus::Completed,
            "canceled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Failed,
        }
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<Option<GatewayEvent>> {
        let event: WebhookEnvelope = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::ValidationError(format!("malformed stripe webhook payload: {e}"))
        })?;
        let intent = event.data.object;

        // payment_intent.payment_failed leaves the intent in a retryable
        // state, so the event type itself carries the failure signal.
        let gateway_event = match event.event_type.as_str() {
            "payment_intent.succeeded" | "payment_intent.processing" | "payment_intent.canceled" => {
                GatewayEvent {
                    external_reference: intent.id,
                    provider_status: intent.status,
                    failure_reason: None,
                }
            }
            "payment_intent.payment_failed" => GatewayEvent {
                external_reference: intent.id,
                provider_status: "payment_failed".to_string(),
                failure_reason: intent
                    .last_payment_error
                    .and_then(|e| e.message)
                    .or_else(|| Some("payment failed".to_string())),
            },
            _ => return Ok(None),
        };
        Ok(Some(gateway_event))
    }
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
    client_secret: Option<String>,
    #[serde(default)]
    last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Deserialize)]
struct LastPaymentError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Refund {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: PaymentIntent,
}
