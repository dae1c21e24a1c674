use crate::domain::transaction::{PaymentStatus, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic every payment event is published to, keyed by event type.
pub const PAYMENT_EVENTS_TOPIC: &str = "payment-events";

pub const PAYMENT_CREATED: &str = "payment.created";
pub const PAYMENT_PENDING: &str = "payment.pending";
pub const PAYMENT_PROCESSING: &str = "payment.processing";
pub const PAYMENT_COMPLETED: &str = "payment.completed";
pub const PAYMENT_FAILED: &str = "payment.failed";
pub const PAYMENT_CANCELLED: &str = "payment.cancelled";
pub const PAYMENT_REFUNDED: &str = "payment.refunded";

/// The event type announced when a transaction lands in `status`.
pub fn event_type_for(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => PAYMENT_PENDING,
        PaymentStatus::Processing => PAYMENT_PROCESSING,
        PaymentStatus::Completed => PAYMENT_COMPLETED,
        PaymentStatus::Failed => PAYMENT_FAILED,
        PaymentStatus::Cancelled => PAYMENT_CANCELLED,
        PaymentStatus::Refunded | PaymentStatus::PartiallyRefunded => PAYMENT_REFUNDED,
    }
}

/// Immutable record emitted after every accepted transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub event_type: String,
    pub transaction_id: Uuid,
    /// Snapshot of the transaction at publication time.
    pub payment: Transaction,
    pub timestamp: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn new(event_type: &str, payment: &Transaction) -> Self {
        Self {
            event_type: event_type.to_string(),
            transaction_id: payment.id,
            payment: payment.clone(),
            timestamp: Utc::now(),
        }
    }
}
