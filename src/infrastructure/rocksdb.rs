use crate::domain::ports::TransactionStore;
use crate::domain::transaction::Transaction;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for transaction records, keyed by transaction id.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family mapping order ids to transaction ids.
pub const CF_ORDER_INDEX: &str = "order_index";
/// Column Family mapping gateway references to transaction ids.
pub const CF_REFERENCE_INDEX: &str = "reference_index";

/// A persistent transaction store backed by RocksDB.
///
/// Records are stored as JSON in the transactions Column Family, with two
/// index families for the order-id and external-reference lookups. Writers
/// serialize through a mutex so the version check and the put are atomic
/// with respect to each other.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbTransactionStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbTransactionStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = vec![
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_ORDER_INDEX, Options::default()),
            ColumnFamilyDescriptor::new(CF_REFERENCE_INDEX, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::StorageError(format!("missing column family {name}")))
    }

    fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let Some(bytes) = self.db.get_cf(cf, id.as_bytes())? else {
            return Ok(None);
        };
        let tx = serde_json::from_slice(&bytes)
            .map_err(|e| PaymentError::StorageError(format!("failed to deserialize transaction: {e}")))?;
        Ok(Some(tx))
    }

    fn get_indexed(&self, index_cf: &str, key: &str) -> Result<Option<Transaction>> {
        let cf = self.cf(index_cf)?;
        let Some(id_bytes) = self.db.get_cf(cf, key.as_bytes())? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&id_bytes)
            .map_err(|e| PaymentError::StorageError(format!("corrupt index entry: {e}")))?;
        self.get_transaction(id)
    }
}

#[async_trait]
impl TransactionStore for RocksDbTransactionStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.get_transaction(id)
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Transaction>> {
        self.get_indexed(CF_ORDER_INDEX, order_id)
    }

    async fn find_by_external_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        self.get_indexed(CF_REFERENCE_INDEX, reference)
    }

    async fn save(&self, mut tx: Transaction) -> Result<Transaction> {
        let _guard = self.write_lock.lock().await;

        match self.get_transaction(tx.id)? {
            Some(existing) => {
                if existing.version != tx.version {
                    return Err(PaymentError::PersistenceConflict(tx.id));
                }
            }
            None => {
                if tx.version != 0 {
                    return Err(PaymentError::PersistenceConflict(tx.id));
                }
                if self.get_indexed(CF_ORDER_INDEX, &tx.order_id)?.is_some() {
                    return Err(PaymentError::DuplicateOrder(tx.order_id));
                }
            }
        }

        tx.version += 1;
        tx.updated_at = Utc::now();

        let value = serde_json::to_vec(&tx)
            .map_err(|e| PaymentError::StorageError(format!("failed to serialize transaction: {e}")))?;
        self.db
            .put_cf(self.cf(CF_TRANSACTIONS)?, tx.id.as_bytes(), value)?;
        self.db.put_cf(
            self.cf(CF_ORDER_INDEX)?,
            tx.order_id.as_bytes(),
            tx.id.as_bytes(),
        )?;
        if let Some(reference) = &tx.external_reference {
            self.db.put_cf(
                self.cf(CF_REFERENCE_INDEX)?,
                reference.as_bytes(),
                tx.id.as_bytes(),
            )?;
        }

        Ok(tx)
    }
}
