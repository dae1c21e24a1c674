use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Represents a positive monetary amount.
///
/// This is a wrapper around `rust_decimal::Decimal` to enforce domain-specific rules
/// and provide type safety for financial calculations.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The gateway a transaction is routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Stripe,
    Paypal,
    CreditCard,
    DebitCard,
    BankTransfer,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentMethod::Stripe => "stripe",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::BankTransfer => "bank_transfer",
        };
        f.write_str(name)
    }
}

/// Canonical, provider-neutral transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    /// `Completed` is not terminal: refunds may still follow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Refunded
        )
    }

    /// The legal transition table. Same-status re-application is handled by
    /// [`Transaction::transition`], not here.
    pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (from, to),
            (Pending, Processing | Completed | Failed | Cancelled)
                | (Processing, Completed | Failed | Cancelled)
                | (Completed, PartiallyRefunded | Refunded)
                | (PartiallyRefunded, PartiallyRefunded | Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
        };
        f.write_str(name)
    }
}

/// Result of applying a status to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The status changed and the transaction must be persisted.
    Changed,
    /// Re-application of the current status; nothing to persist or publish.
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingAddress {
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// A request to open a payment for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub order_id: String,
    pub user_id: String,
    pub amount: Amount,
    pub currency: String,
    pub method: PaymentMethod,
    #[serde(default)]
    pub customer: CustomerDetails,
    pub billing_address: Option<BillingAddress>,
    pub description: Option<String>,
    /// Redirect target after approval, for gateways with an approval flow.
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// A payment transaction. One per order; mutated exclusively by the
/// orchestrator and never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub order_id: String,
    pub user_id: String,
    pub amount: Amount,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// The gateway's own id for this payment (intent id, order id).
    /// Unique once set; `None` until the remote operation exists.
    pub external_reference: Option<String>,
    /// Approval URL or client-side confirmation token, passed through opaquely.
    pub client_token: Option<String>,
    pub customer: CustomerDetails,
    pub billing_address: Option<BillingAddress>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    /// Cumulative amount refunded so far. Never exceeds `amount`.
    pub refunded_amount: Decimal,
    pub refund_reason: Option<String>,
    /// The gateway's id for the most recent refund.
    pub refund_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once, the first time the transaction completes.
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by the store on every save.
    pub version: u64,
}

impl Transaction {
    pub fn new(request: &PaymentRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id: request.order_id.clone(),
            user_id: request.user_id.clone(),
            amount: request.amount,
            currency: request.currency.to_uppercase(),
            method: request.method,
            status: PaymentStatus::Pending,
            external_reference: None,
            client_token: None,
            customer: request.customer.clone(),
            billing_address: request.billing_address.clone(),
            description: request.description.clone(),
            metadata: request.metadata.clone(),
            refunded_amount: Decimal::ZERO,
            refund_reason: None,
            refund_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 0,
        }
    }

    /// Applies a canonical status, enforcing the legal transition table.
    ///
    /// Re-applying the current status (including any terminal status) is an
    /// idempotent no-op, not an error.
    pub fn transition(&mut self, to: PaymentStatus) -> Result<TransitionOutcome> {
        if self.status == to {
            return Ok(TransitionOutcome::Unchanged);
        }
        if !PaymentStatus::can_transition(self.status, to) {
            return Err(PaymentError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        if to == PaymentStatus::Completed && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        Ok(TransitionOutcome::Changed)
    }

    /// Transitions into `Failed`, recording the reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<TransitionOutcome> {
        let outcome = self.transition(PaymentStatus::Failed)?;
        if outcome == TransitionOutcome::Changed {
            self.failure_reason = Some(reason.into());
        }
        Ok(outcome)
    }

    /// The captured amount not yet refunded.
    pub fn refundable(&self) -> Decimal {
        self.amount.value() - self.refunded_amount
    }

    /// Checks a prospective refund without mutating anything. Used to reject
    /// bad refunds before the remote call is issued.
    ///
    /// The capacity check runs first so that refunding an already fully
    /// refunded transaction reports `RefundExceedsCapture`.
    pub fn validate_refund(&self, amount: Amount) -> Result<()> {
        if amount.value() > self.refundable() {
            return Err(PaymentError::RefundExceedsCapture {
                requested: amount.value(),
                refundable: self.refundable(),
            });
        }
        if !matches!(
            self.status,
            PaymentStatus::Completed | PaymentStatus::PartiallyRefunded
        ) {
            return Err(PaymentError::InvalidTransition {
                from: self.status,
                to: PaymentStatus::Refunded,
            });
        }
        Ok(())
    }

    /// Records a confirmed remote refund: bumps the cumulative refunded
    /// amount and moves to `Refunded` or `PartiallyRefunded`.
    pub fn apply_refund(&mut self, amount: Amount) -> Result<()> {
        self.validate_refund(amount)?;
        self.refunded_amount += amount.value();
        self.status = if self.refunded_amount == self.amount.value() {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> PaymentRequest {
        PaymentRequest {
            order_id: "ORD-1".to_string(),
            user_id: "user-1".to_string(),
            amount: Amount::new(dec!(49.99)).unwrap(),
            currency: "usd".to_string(),
            method: PaymentMethod::Stripe,
            customer: CustomerDetails::default(),
            billing_address: None,
            description: None,
            success_url: None,
            cancel_url: None,
            metadata: None,
        }
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_new_transaction_defaults() {
        let tx = Transaction::new(&request());
        assert_eq!(tx.status, PaymentStatus::Pending);
        assert_eq!(tx.currency, "USD");
        assert_eq!(tx.refunded_amount, Decimal::ZERO);
        assert_eq!(tx.version, 0);
        assert!(tx.external_reference.is_none());
        assert!(tx.completed_at.is_none());
    }

    #[test]
    fn test_legal_transitions() {
        let mut tx = Transaction::new(&request());
        assert_eq!(
            tx.transition(PaymentStatus::Processing).unwrap(),
            TransitionOutcome::Changed
        );
        assert_eq!(
            tx.transition(PaymentStatus::Completed).unwrap(),
            TransitionOutcome::Changed
        );
        assert!(tx.completed_at.is_some());
    }

    #[test]
    fn test_same_status_is_noop() {
        let mut tx = Transaction::new(&request());
        assert_eq!(
            tx.transition(PaymentStatus::Pending).unwrap(),
            TransitionOutcome::Unchanged
        );

        tx.transition(PaymentStatus::Cancelled).unwrap();
        // Terminal re-application stays a no-op.
        assert_eq!(
            tx.transition(PaymentStatus::Cancelled).unwrap(),
            TransitionOutcome::Unchanged
        );
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut tx = Transaction::new(&request());
        tx.transition(PaymentStatus::Failed).unwrap();
        assert!(matches!(
            tx.transition(PaymentStatus::Completed),
            Err(PaymentError::InvalidTransition {
                from: PaymentStatus::Failed,
                to: PaymentStatus::Completed,
            })
        ));
    }

    #[test]
    fn test_completed_at_set_once() {
        let mut tx = Transaction::new(&request());
        tx.transition(PaymentStatus::Completed).unwrap();
        let first = tx.completed_at;
        assert!(first.is_some());

        tx.apply_refund(Amount::new(dec!(49.99)).unwrap()).unwrap();
        assert_eq!(tx.completed_at, first);
    }

    #[test]
    fn test_fail_records_reason() {
        let mut tx = Transaction::new(&request());
        tx.fail("card declined").unwrap();
        assert_eq!(tx.status, PaymentStatus::Failed);
        assert_eq!(tx.failure_reason.as_deref(), Some("card declined"));
    }

    #[test]
    fn test_partial_then_full_refund() {
        let mut tx = Transaction::new(&request());
        tx.transition(PaymentStatus::Completed).unwrap();

        tx.apply_refund(Amount::new(dec!(20.00)).unwrap()).unwrap();
        assert_eq!(tx.status, PaymentStatus::PartiallyRefunded);
        assert_eq!(tx.refunded_amount, dec!(20.00));

        tx.apply_refund(Amount::new(dec!(29.99)).unwrap()).unwrap();
        assert_eq!(tx.status, PaymentStatus::Refunded);
        assert_eq!(tx.refunded_amount, dec!(49.99));
    }

    #[test]
    fn test_refund_exceeding_capture_rejected() {
        let mut tx = Transaction::new(&request());
        tx.transition(PaymentStatus::Completed).unwrap();
        tx.apply_refund(Amount::new(dec!(49.99)).unwrap()).unwrap();

        let err = tx
            .apply_refund(Amount::new(dec!(0.01)).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::RefundExceedsCapture { refundable, .. } if refundable == Decimal::ZERO
        ));
    }

    #[test]
    fn test_refund_requires_completed() {
        let mut tx = Transaction::new(&request());
        assert!(matches!(
            tx.apply_refund(Amount::new(dec!(1.00)).unwrap()),
            Err(PaymentError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_refund_exceeds_on_partially_refunded() {
        let mut tx = Transaction::new(&request());
        tx.transition(PaymentStatus::Completed).unwrap();
        tx.apply_refund(Amount::new(dec!(40.00)).unwrap()).unwrap();

        let err = tx
            .apply_refund(Amount::new(dec!(10.00)).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::RefundExceedsCapture { requested, refundable }
                if requested == dec!(10.00) && refundable == dec!(9.99)
        ));
    }
}
