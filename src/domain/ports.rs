use crate::domain::event::PaymentEvent;
use crate::domain::transaction::Transaction;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Narrow persistence contract for transactions.
///
/// `save` must be a concurrency-safe read-modify-write: the write succeeds
/// only when the stored version matches the version the caller read, failing
/// with `PersistenceConflict` otherwise. A first save (version 0) must reject
/// a duplicate `order_id` with `DuplicateOrder`. The stored copy is returned
/// with `version` bumped and `updated_at` refreshed.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>>;
    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Transaction>>;
    async fn find_by_external_reference(&self, reference: &str) -> Result<Option<Transaction>>;
    async fn save(&self, tx: Transaction) -> Result<Transaction>;
}

/// Fire-and-forget domain event emission. Callers log failures and move on;
/// a publish error must never roll back a committed transition.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, event: &PaymentEvent) -> Result<()>;
}

/// Pure authenticity check for inbound webhook payloads. Implementations
/// must fail closed: anything unverifiable is `false`.
pub trait WebhookVerifier: Send + Sync {
    fn verify(&self, payload: &[u8], signature: Option<&str>) -> bool;
}

pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type EventPublisherRef = Arc<dyn EventPublisher>;
pub type WebhookVerifierBox = Box<dyn WebhookVerifier>;
