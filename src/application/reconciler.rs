use crate::application::orchestrator::PaymentOrchestrator;
use crate::domain::ports::WebhookVerifierBox;
use crate::domain::transaction::{PaymentMethod, TransitionOutcome};
use crate::error::{PaymentError, Result};
use crate::gateways::{GatewayRef, PaymentGateway as _};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of processing a webhook delivery. Every variant is a positive
/// acknowledgement to the provider; negative acknowledgements only happen
/// through `Err` (bad signature, unroutable provider, malformed payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// A transition was applied and persisted.
    Applied { transaction_id: Uuid },
    /// The event was understood but produced no state change (duplicate
    /// delivery, out-of-order event, already-settled transaction).
    NoChange { transaction_id: Uuid },
    /// The event is not tracked or references no known transaction.
    Ignored,
}

struct ProviderHook {
    gateway: GatewayRef,
    verifier: WebhookVerifierBox,
}

/// Applies gateway-pushed events to local transaction state.
///
/// Shares the orchestrator's transition primitive with the direct API path,
/// so a webhook can never move a transaction along an edge the API couldn't.
/// Webhooks are untrusted and replayable: everything past the signature
/// check is acknowledged, even when it changes nothing.
pub struct WebhookReconciler {
    orchestrator: Arc<PaymentOrchestrator>,
    hooks: HashMap<PaymentMethod, ProviderHook>,
}

impl WebhookReconciler {
    pub fn new(orchestrator: Arc<PaymentOrchestrator>) -> Self {
        Self {
            orchestrator,
            hooks: HashMap::new(),
        }
    }

    /// Registers the adapter and signature verifier for one provider's
    /// webhook endpoint.
    pub fn register(&mut self, gateway: GatewayRef, verifier: WebhookVerifierBox) {
        self.hooks
            .insert(gateway.method(), ProviderHook { gateway, verifier });
    }

    /// Processes one webhook delivery: verify, decode, resolve, apply.
    pub async fn process(
        &self,
        method: PaymentMethod,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookDisposition> {
        let hook = self
            .hooks
            .get(&method)
            .ok_or(PaymentError::UnsupportedMethod(method))?;

        if !hook.verifier.verify(payload, signature) {
            tracing::warn!(method = %method, "rejected webhook with invalid signature");
            return Err(PaymentError::InvalidSignature);
        }

        let Some(gateway_event) = hook.gateway.parse_webhook(payload)? else {
            tracing::debug!(method = %method, "ignoring untracked webhook event type");
            return Ok(WebhookDisposition::Ignored);
        };

        let Some(tx) = self
            .orchestrator
            .find_by_external_reference(&gateway_event.external_reference)
            .await?
        else {
            // Stale or foreign-environment events are acknowledged so the
            // provider stops redelivering them.
            tracing::warn!(
                method = %method,
                reference = %gateway_event.external_reference,
                "webhook references unknown transaction"
            );
            return Ok(WebhookDisposition::Ignored);
        };

        let mapped = hook
            .gateway
            .map_remote_status(&gateway_event.provider_status);
        match self
            .orchestrator
            .apply_remote_status(tx.id, mapped, gateway_event.failure_reason)
            .await
        {
            Ok((stored, TransitionOutcome::Changed)) => Ok(WebhookDisposition::Applied {
                transaction_id: stored.id,
            }),
            Ok((stored, TransitionOutcome::Unchanged)) => Ok(WebhookDisposition::NoChange {
                transaction_id: stored.id,
            }),
            Err(PaymentError::InvalidTransition { from, to }) => {
                tracing::warn!(
                    transaction = %tx.id,
                    %from,
                    %to,
                    "webhook transition rejected, acknowledging anyway"
                );
                Ok(WebhookDisposition::NoChange {
                    transaction_id: tx.id,
                })
            }
            Err(err) => Err(err),
        }
    }
}
