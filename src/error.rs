use crate::domain::transaction::{PaymentMethod, PaymentStatus};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("transaction not found: {0}")]
    NotFound(String),
    #[error("order {0} already has a transaction")]
    DuplicateOrder(String),
    #[error("no gateway registered for method {0}")]
    UnsupportedMethod(PaymentMethod),
    #[error("illegal status transition: {from} -> {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("refund of {requested} exceeds refundable balance {refundable}")]
    RefundExceedsCapture {
        requested: Decimal,
        refundable: Decimal,
    },
    #[error("gateway error: {0}")]
    Gateway(String),
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("stale write for transaction {0}")]
    PersistenceConflict(Uuid),
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("storage error: {0}")]
    StorageError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::Gateway(err.to_string())
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::StorageError(err.to_string())
    }
}
