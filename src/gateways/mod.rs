pub mod mock;
pub mod paypal;
pub mod stripe;

use crate::domain::transaction::{Amount, PaymentMethod, PaymentRequest, PaymentStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Canonical projection of a freshly opened remote payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePayment {
    pub external_reference: String,
    /// The provider's native status, to be fed through `map_remote_status`.
    pub provider_status: String,
    /// Approval URL or client-side confirmation token, provider-specific.
    pub client_token: Option<String>,
}

/// Provider event decoded from a webhook payload.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    pub external_reference: String,
    pub provider_status: String,
    pub failure_reason: Option<String>,
}

/// Capability contract implemented once per integrated provider. All
/// provider-specific wire formats, amount scaling and status vocabulary
/// live behind this trait; the orchestrator never branches on a provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// The payment method this adapter serves.
    fn method(&self) -> PaymentMethod;

    /// Opens a payment on the provider side.
    async fn open_payment(&self, request: &PaymentRequest) -> Result<RemotePayment>;

    /// Captures the remote operation where the provider requires an explicit
    /// capture, or retrieves its current state. Returns the provider-native
    /// status.
    async fn capture_or_retrieve(&self, external_reference: &str) -> Result<String>;

    /// Cancels the remote operation.
    async fn cancel_remote(&self, external_reference: &str) -> Result<()>;

    /// Issues a remote refund and returns the provider's refund reference.
    async fn refund_remote(
        &self,
        external_reference: &str,
        amount: Amount,
        currency: &str,
        reason: Option<&str>,
    ) -> Result<String>;

    /// Maps a provider-native status into the canonical vocabulary. Total:
    /// unknown provider statuses map to `Failed`.
    fn map_remote_status(&self, provider_status: &str) -> PaymentStatus;

    /// Decodes a provider webhook payload into a gateway event, or `None`
    /// for event types this adapter does not track. `Err` means the payload
    /// is not syntactically acceptable.
    fn parse_webhook(&self, payload: &[u8]) -> Result<Option<GatewayEvent>>;
}

pub type GatewayRef = Arc<dyn PaymentGateway>;

/// Routing table from payment method to its registered adapter.
#[derive(Default, Clone)]
pub struct GatewayRegistry {
    adapters: HashMap<PaymentMethod, GatewayRef>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, gateway: GatewayRef) {
        self.adapters.insert(gateway.method(), gateway);
    }

    pub fn get(&self, method: PaymentMethod) -> Result<GatewayRef> {
        self.adapters
            .get(&method)
            .cloned()
            .ok_or(PaymentError::UnsupportedMethod(method))
    }
}
