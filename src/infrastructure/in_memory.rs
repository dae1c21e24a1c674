use crate::domain::ports::TransactionStore;
use crate::domain::transaction::Transaction;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory transaction store.
///
/// Uses `Arc<RwLock<HashMap<Uuid, Transaction>>>` to allow shared concurrent
/// access. The reference implementation of the store contract: the versioned
/// compare-and-swap in `save` runs entirely under the write lock, so racing
/// writers serialize and exactly one of two conflicting updates wins.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<Uuid, Transaction>>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&id).cloned())
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .find(|tx| tx.order_id == order_id)
            .cloned())
    }

    async fn find_by_external_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .find(|tx| tx.external_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn save(&self, mut tx: Transaction) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;
        match transactions.get(&tx.id) {
            Some(existing) => {
                if existing.version != tx.version {
                    return Err(PaymentError::PersistenceConflict(tx.id));
                }
            }
            None => {
                if tx.version != 0 {
                    return Err(PaymentError::PersistenceConflict(tx.id));
                }
                if transactions.values().any(|t| t.order_id == tx.order_id) {
                    return Err(PaymentError::DuplicateOrder(tx.order_id));
                }
            }
        }
        tx.version += 1;
        tx.updated_at = Utc::now();
        transactions.insert(tx.id, tx.clone());
        Ok(tx)
    }
}
