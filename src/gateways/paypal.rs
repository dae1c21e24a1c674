use super::{GatewayEvent, PaymentGateway, RemotePayment};
use crate::domain::transaction::{Amount, PaymentMethod, PaymentRequest, PaymentStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;

pub const SANDBOX_BASE_URL: &str = "https://api-m.sandbox.paypal.com";
pub const LIVE_BASE_URL: &str = "https://api-m.paypal.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// PayPal adapter: redirect-based checkout-order flow with explicit capture.
pub struct PayPalGateway {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl PayPalGateway {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::with_base_url(client_id, client_secret, SANDBOX_BASE_URL)
    }

    pub fn with_base_url(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        let base_url = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: RwLock::new(None),
        }
    }

    /// Fetches a client-credentials token, reusing the cached one until
    /// shortly before it expires.
    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref()
                && token.expires_at > Utc::now()
            {
                return Ok(token.access_token.clone());
            }
        }

        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let token = response.json::<TokenResponse>().await?;

        let mut cached = self.token.write().await;
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + ChronoDuration::seconds((token.expires_in - 60).max(0)),
        });
        Ok(token.access_token)
    }

    async fn get_order(&self, order_id: &str) -> Result<Order> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/v2/checkout/orders/{order_id}", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        Self::read_order(response).await
    }

    async fn read_order(response: reqwest::Response) -> Result<Order> {
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(response.json::<Order>().await?)
    }

    async fn api_error(response: reqwest::Response) -> PaymentError {
        let status = response.status();
        let message = match response.json::<ApiError>().await {
            Ok(err) => err
                .message
                .or(err.error_description)
                .unwrap_or_else(|| "unknown error".to_string()),
            Err(_) => "unreadable error body".to_string(),
        };
        PaymentError::Gateway(format!("paypal returned {status}: {message}"))
    }

    fn approval_url(order: &Order) -> Option<String> {
        order
            .links
            .iter()
            .find(|link| link.rel == "approve")
            .map(|link| link.href.clone())
    }

    fn capture_id(order: &Order) -> Result<String> {
        order
            .purchase_units
            .iter()
            .filter_map(|unit| unit.payments.as_ref())
            .flat_map(|payments| payments.captures.iter())
            .map(|capture| capture.id.clone())
            .next()
            .ok_or_else(|| {
                PaymentError::Gateway("paypal order has no capture to refund".to_string())
            })
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Paypal
    }

    async fn open_payment(&self, request: &PaymentRequest) -> Result<RemotePayment> {
        let mut application_context = serde_json::json!({
            "user_action": "PAY_NOW",
            "shipping_preference": "NO_SHIPPING",
        });
        if let Some(url) = &request.success_url {
            application_context["return_url"] = serde_json::json!(url);
        }
        if let Some(url) = &request.cancel_url {
            application_context["cancel_url"] = serde_json::json!(url);
        }

        let body = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.order_id,
                "custom_id": request.user_id,
                "description": request.description,
                "amount": {
                    "currency_code": request.currency.to_uppercase(),
                    // PayPal takes major units as a decimal string.
                    "value": request.amount.value().to_string(),
                },
            }],
            "application_context": application_context,
        });

        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(token)
            // A timed-out create may still have succeeded remotely; the
            // request id makes the retry return the same order.
            .header("PayPal-Request-Id", request.order_id.clone())
            .json(&body)
            .send()
            .await?;
        let order = Self::read_order(response).await?;
        tracing::info!(paypal_order = %order.id, order = %request.order_id, "paypal order created");

        let approval = Self::approval_url(&order);
        Ok(RemotePayment {
            external_reference: order.id,
            provider_status: order.status,
            client_token: approval,
        })
    }

    async fn capture_or_retrieve(&self, external_reference: &str) -> Result<String> {
        let order = self.get_order(external_reference).await?;
        if order.status != "APPROVED" {
            return Ok(order.status);
        }

        // Approved by the payer: capture now so funds actually move.
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{external_reference}/capture",
                self.base_url
            ))
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .send()
            .await?;
        let captured = Self::read_order(response).await?;
        tracing::info!(paypal_order = %external_reference, "paypal order captured");
        Ok(captured.status)
    }

    async fn cancel_remote(&self, external_reference: &str) -> Result<()> {
        // PayPal has no cancel operation for checkout orders; unapproved
        // orders simply expire. The local cancellation stands on its own.
        tracing::debug!(paypal_order = %external_reference, "paypal order left to expire");
        Ok(())
    }

    async fn refund_remote(
        &self,
        external_reference: &str,
        amount: Amount,
        currency: &str,
        reason: Option<&str>,
    ) -> Result<String> {
        let order = self.get_order(external_reference).await?;
        let capture_id = Self::capture_id(&order)?;

        let mut body = serde_json::json!({
            "amount": {
                "currency_code": currency.to_uppercase(),
                "value": amount.value().to_string(),
            },
        });
        if let Some(reason) = reason {
            body["note_to_payer"] = serde_json::json!(reason);
        }

        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v2/payments/captures/{capture_id}/refund",
                self.base_url
            ))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let refund = response.json::<RefundResponse>().await?;
        tracing::info!(refund = %refund.id, capture = %capture_id, "paypal refund created");
        Ok(refund.id)
    }

    fn map_remote_status(&self, provider_status: &str) -> PaymentStatus {
        match provider_status {
            "CREATED" | "SAVED" | "APPROVED" | "PAYER_ACTION_REQUIRED" => PaymentStatus::Pending,
            "COMPLETED" => PaymentStatus::Completed,
            "VOIDED" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Failed,
        }
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<Option<GatewayEvent>> {
        let event: WebhookEnvelope = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::ValidationError(format!("malformed paypal webhook payload: {e}"))
        })?;

        let gateway_event = match event.event_type.as_str() {
            "PAYMENT.CAPTURE.COMPLETED" => {
                // Capture events reference the order through supplementary data.
                let Some(order_id) = event.resource.related_order_id() else {
                    return Ok(None);
                };
                GatewayEvent {
                    external_reference: order_id,
                    provider_status: "COMPLETED".to_string(),
                    failure_reason: None,
                }
            }
            "PAYMENT.CAPTURE.DENIED" => {
                let Some(order_id) = event.resource.related_order_id() else {
                    return Ok(None);
                };
                GatewayEvent {
                    external_reference: order_id,
                    provider_status: "DENIED".to_string(),
                    failure_reason: Some("payment capture denied".to_string()),
                }
            }
            "CHECKOUT.ORDER.APPROVED" => {
                let Some(id) = event.resource.id else {
                    return Ok(None);
                };
                GatewayEvent {
                    external_reference: id,
                    provider_status: "APPROVED".to_string(),
                    failure_reason: None,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(gateway_event))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    payments: Option<UnitPayments>,
}

#[derive(Debug, Deserialize)]
struct UnitPayments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event_type: String,
    resource: WebhookResource,
}

#[derive(Debug, Deserialize)]
struct WebhookResource {
    id: Option<String>,
    supplementary_data: Option<SupplementaryData>,
}

impl WebhookResource {
    fn related_order_id(&self) -> Option<String> {
        self.supplementary_data
            .as_ref()
            .and_then(|data| data.related_ids.as_ref())
            .and_then(|ids| ids.order_id.clone())
    }
}

#[derive(Debug, Deserialize)]
struct SupplementaryData {
    related_ids: Option<RelatedIds>,
}

#[derive(Debug, Deserialize)]
struct RelatedIds {
    order_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> PayPalGateway {
        PayPalGateway::new("client-id", "client-secret")
    }

    #[test]
    fn test_status_mapping_table() {
        let gw = gateway();
        assert_eq!(gw.map_remote_status("CREATED"), PaymentStatus::Pending);
        assert_eq!(gw.map_remote_status("SAVED"), PaymentStatus::Pending);
        assert_eq!(gw.map_remote_status("APPROVED"), PaymentStatus::Pending);
        assert_eq!(
            gw.map_remote_status("PAYER_ACTION_REQUIRED"),
            PaymentStatus::Pending
        );
        assert_eq!(gw.map_remote_status("COMPLETED"), PaymentStatus::Completed);
        assert_eq!(gw.map_remote_status("VOIDED"), PaymentStatus::Cancelled);
        assert_eq!(gw.map_remote_status("DENIED"), PaymentStatus::Failed);
    }

    #[test]
    fn test_parse_capture_completed_webhook() {
        let payload = serde_json::json!({
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {
                "id": "cap_1",
                "supplementary_data": { "related_ids": { "order_id": "ord_abc" } }
            }
        });
        let event = gateway()
            .parse_webhook(payload.to_string().as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(event.external_reference, "ord_abc");
        assert_eq!(event.provider_status, "COMPLETED");
    }

    #[test]
    fn test_parse_capture_without_order_reference() {
        let payload = serde_json::json!({
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": { "id": "cap_1" }
        });
        assert!(
            gateway()
                .parse_webhook(payload.to_string().as_bytes())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_parse_order_approved_webhook() {
        let payload = serde_json::json!({
            "event_type": "CHECKOUT.ORDER.APPROVED",
            "resource": { "id": "ord_abc" }
        });
        let event = gateway()
            .parse_webhook(payload.to_string().as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(event.external_reference, "ord_abc");
        assert_eq!(event.provider_status, "APPROVED");
    }

    #[test]
    fn test_parse_denied_webhook() {
        let payload = serde_json::json!({
            "event_type": "PAYMENT.CAPTURE.DENIED",
            "resource": {
                "supplementary_data": { "related_ids": { "order_id": "ord_abc" } }
            }
        });
        let event = gateway()
            .parse_webhook(payload.to_string().as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(event.provider_status, "DENIED");
        assert!(event.failure_reason.is_some());
    }

    #[test]
    fn test_parse_untracked_event_type() {
        let payload = serde_json::json!({
            "event_type": "BILLING.SUBSCRIPTION.CREATED",
            "resource": { "id": "sub_1" }
        });
        assert!(
            gateway()
                .parse_webhook(payload.to_string().as_bytes())
                .unwrap()
                .is_none()
        );
    }
}
