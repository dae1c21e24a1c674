use crate::domain::event::{self, PAYMENT_EVENTS_TOPIC, PaymentEvent};
use crate::domain::ports::{EventPublisherRef, TransactionStoreRef};
use crate::domain::transaction::{
    Amount, PaymentRequest, PaymentStatus, Transaction, TransitionOutcome,
};
use crate::error::{PaymentError, Result};
use crate::gateways::{GatewayRegistry, PaymentGateway as _};
use uuid::Uuid;

/// How many times a read-modify-write is retried after losing a version race
/// before the conflict surfaces to the caller.
const MAX_SAVE_ATTEMPTS: usize = 5;

/// The main entry point for payment processing.
///
/// `PaymentOrchestrator` owns the transaction state machine. Every mutating
/// operation follows the same sequence: read current state, validate the
/// transition locally, call the gateway if the operation has a remote side,
/// persist through the store's compare-and-swap, publish the domain event.
/// Local state is never mutated before the remote call has returned success.
pub struct PaymentOrchestrator {
    store: TransactionStoreRef,
    gateways: GatewayRegistry,
    publisher: EventPublisherRef,
}

impl PaymentOrchestrator {
    pub fn new(
        store: TransactionStoreRef,
        gateways: GatewayRegistry,
        publisher: EventPublisherRef,
    ) -> Self {
        Self {
            store,
            gateways,
            publisher,
        }
    }

    /// Opens a payment for an order.
    ///
    /// Exactly one transaction may exist per order. The remote payment is
    /// opened first; the transaction is then persisted with the adapter's
    /// reported status mapped into the canonical vocabulary. If the gateway
    /// rejects the request the transaction is persisted as `Failed` with the
    /// reason recorded, and the gateway error still surfaces to the caller.
    pub async fn create(&self, request: PaymentRequest) -> Result<Transaction> {
        if let Some(existing) = self.store.find_by_order_id(&request.order_id).await? {
            return Err(PaymentError::DuplicateOrder(existing.order_id));
        }
        let gateway = self.gateways.get(request.method)?;

        let mut tx = Transaction::new(&request);
        match gateway.open_payment(&request).await {
            Ok(remote) => {
                tx.external_reference = Some(remote.external_reference);
                tx.client_token = remote.client_token;
                let mapped = gateway.map_remote_status(&remote.provider_status);
                tx.transition(mapped)?;

                let stored = self.store.save(tx).await?;
                tracing::info!(
                    transaction = %stored.id,
                    order = %stored.order_id,
                    method = %stored.method,
                    status = %stored.status,
                    "payment created"
                );
                self.emit(event::PAYMENT_CREATED, &stored).await;
                Ok(stored)
            }
            Err(err) => {
                tracing::error!(
                    order = %tx.order_id,
                    method = %tx.method,
                    error = %err,
                    "gateway rejected payment creation"
                );
                tx.fail(err.to_string())?;
                let stored = self.store.save(tx).await?;
                self.emit(event::PAYMENT_FAILED, &stored).await;
                Err(err)
            }
        }
    }

    /// Queries the gateway for the remote operation's current state and
    /// applies the mapped status. A status equal to the current one is a
    /// no-op with zero side effects.
    pub async fn confirm(&self, id: Uuid) -> Result<Transaction> {
        let tx = self.require(id).await?;
        let gateway = self.gateways.get(tx.method)?;
        let Some(reference) = tx.external_reference else {
            return Err(PaymentError::ValidationError(
                "transaction has no remote payment to confirm".to_string(),
            ));
        };

        let provider_status = gateway.capture_or_retrieve(&reference).await?;
        let mapped = gateway.map_remote_status(&provider_status);
        let (stored, _) = self.apply_remote_status(id, mapped, None).await?;
        Ok(stored)
    }

    /// Cancels a payment that has not completed. Completed payments must be
    /// refunded instead.
    pub async fn cancel(&self, id: Uuid) -> Result<Transaction> {
        let tx = self.require(id).await?;
        if !PaymentStatus::can_transition(tx.status, PaymentStatus::Cancelled) {
            return Err(PaymentError::InvalidTransition {
                from: tx.status,
                to: PaymentStatus::Cancelled,
            });
        }
        let gateway = self.gateways.get(tx.method)?;
        if let Some(reference) = tx.external_reference.as_deref() {
            gateway.cancel_remote(reference).await?;
        }
        let (stored, _) = self
            .apply_remote_status(id, PaymentStatus::Cancelled, None)
            .await?;
        Ok(stored)
    }

    /// Refunds part or all of a completed payment.
    ///
    /// The refund is validated locally before the gateway is asked to move
    /// money; the local record mutates only once the remote refund is
    /// confirmed, so a gateway failure leaves no phantom credit.
    pub async fn refund(
        &self,
        id: Uuid,
        amount: Amount,
        reason: Option<String>,
    ) -> Result<Transaction> {
        let tx = self.require(id).await?;
        tx.validate_refund(amount)?;
        let gateway = self.gateways.get(tx.method)?;
        let Some(reference) = tx.external_reference else {
            return Err(PaymentError::ValidationError(
                "transaction has no remote payment to refund".to_string(),
            ));
        };

        let refund_reference = gateway
            .refund_remote(&reference, amount, &tx.currency, reason.as_deref())
            .await?;

        // Remote refund confirmed; commit locally, re-reading on version races.
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut current = self.require(id).await?;
            current.apply_refund(amount)?;
            current.refund_reason = reason.clone();
            current.refund_reference = Some(refund_reference.clone());

            match self.store.save(current).await {
                Ok(stored) => {
                    tracing::info!(
                        transaction = %stored.id,
                        refunded = %stored.refunded_amount,
                        status = %stored.status,
                        "payment refunded"
                    );
                    self.emit(event::PAYMENT_REFUNDED, &stored).await;
                    return Ok(stored);
                }
                Err(PaymentError::PersistenceConflict(_)) if attempts < MAX_SAVE_ATTEMPTS => {
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Transaction> {
        self.require(id).await
    }

    pub async fn get_by_order_id(&self, order_id: &str) -> Result<Transaction> {
        self.store
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("order {order_id}")))
    }

    pub(crate) async fn find_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>> {
        self.store.find_by_external_reference(reference).await
    }

    /// Applies a canonical status to a transaction: the one code path shared
    /// by `confirm`, `cancel` and webhook reconciliation.
    ///
    /// Retries the compare-and-swap on version races. Exactly one writer
    /// observes `Changed` for a given edge; losers re-read, find the status
    /// already applied, and publish nothing, which is what makes duplicate
    /// webhook delivery idempotent.
    pub(crate) async fn apply_remote_status(
        &self,
        id: Uuid,
        mapped: PaymentStatus,
        failure_reason: Option<String>,
    ) -> Result<(Transaction, TransitionOutcome)> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut tx = self.require(id).await?;
            let outcome = match mapped {
                PaymentStatus::Failed => tx.fail(
                    failure_reason
                        .clone()
                        .unwrap_or_else(|| "reported failed by gateway".to_string()),
                )?,
                other => tx.transition(other)?,
            };
            if outcome == TransitionOutcome::Unchanged {
                return Ok((tx, outcome));
            }

            match self.store.save(tx).await {
                Ok(stored) => {
                    tracing::info!(
                        transaction = %stored.id,
                        status = %stored.status,
                        "transition applied"
                    );
                    self.emit(event::event_type_for(mapped), &stored).await;
                    return Ok((stored, outcome));
                }
                Err(PaymentError::PersistenceConflict(_)) if attempts < MAX_SAVE_ATTEMPTS => {
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Best-effort event emission: a publish failure is logged and the
    /// committed transition stands.
    async fn emit(&self, event_type: &str, tx: &Transaction) {
        let payment_event = PaymentEvent::new(event_type, tx);
        if let Err(err) = self
            .publisher
            .publish(PAYMENT_EVENTS_TOPIC, event_type, &payment_event)
            .await
        {
            tracing::error!(
                event = event_type,
                transaction = %tx.id,
                error = %err,
                "failed to publish payment event"
            );
        }
    }
}
