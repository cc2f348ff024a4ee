use crate::domain::audit::AuditLog;
use crate::domain::expense::{Expense, ExpenseId, NewExpense};
use crate::domain::ports::{ChangeSet, ExpenseStore};
use crate::error::StoreError;
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for expense records, approval included.
pub const CF_EXPENSES: &str = "expenses";
/// Column Family for audit entries, keyed by expense id and sequence.
pub const CF_AUDIT: &str = "audit";
/// Column Family for counters.
pub const CF_META: &str = "meta";

const LAST_EXPENSE_ID: &[u8] = b"last_expense_id";
const LAST_AUDIT_SEQ: &[u8] = b"last_audit_seq";

/// A persistent record store implementation using RocksDB.
///
/// Each [`ChangeSet`] is written as a single `WriteBatch`, so an expense
/// update and its audit entry land together or not at all. Writers are
/// serialized through an async mutex, which makes the status check and the
/// batch write one atomic step within the process.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_EXPENSES, CF_AUDIT, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("{name} column family not found")))
    }

    fn read_counter(&self, key: &[u8]) -> Result<i64, StoreError> {
        let meta = self.cf(CF_META)?;
        match self.db.get_cf(meta, key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::Backend(format!("corrupt counter {}", String::from_utf8_lossy(key)))
                })?;
                Ok(i64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    fn read_expense(&self, id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        let expenses = self.cf(CF_EXPENSES)?;
        match self.db.get_cf(expenses, id.0.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn audit_key(expense_id: ExpenseId, seq: i64) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&expense_id.0.to_be_bytes());
        key[8..].copy_from_slice(&seq.to_be_bytes());
        key
    }
}

#[async_trait]
impl ExpenseStore for RocksDBStore {
    async fn insert(&self, expense: NewExpense) -> Result<Expense, StoreError> {
        let _guard = self.write_lock.lock().await;
        let id = self.read_counter(LAST_EXPENSE_ID)? + 1;
        let expense = expense.into_expense(ExpenseId(id));

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_EXPENSES)?, id.to_be_bytes(), serde_json::to_vec(&expense)?);
        batch.put_cf(self.cf(CF_META)?, LAST_EXPENSE_ID, id.to_be_bytes());
        self.db.write(batch)?;

        Ok(expense)
    }

    async fn get(&self, id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        self.read_expense(id)
    }

    async fn is_completed(&self, id: ExpenseId) -> Result<bool, StoreError> {
        self.read_expense(id)?
            .map(|expense| expense.is_completed())
            .ok_or(StoreError::NotFound(id))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let id = changes.expense.id;
        let current = self.read_expense(id)?.ok_or(StoreError::NotFound(id))?;
        if current.status != changes.expected_status {
            return Err(StoreError::Conflict {
                id,
                expected: changes.expected_status,
                actual: current.status,
            });
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_EXPENSES)?,
            id.0.to_be_bytes(),
            serde_json::to_vec(&changes.expense)?,
        );
        if let Some(audit) = &changes.audit {
            let seq = self.read_counter(LAST_AUDIT_SEQ)? + 1;
            batch.put_cf(
                self.cf(CF_AUDIT)?,
                Self::audit_key(id, seq),
                serde_json::to_vec(audit)?,
            );
            batch.put_cf(self.cf(CF_META)?, LAST_AUDIT_SEQ, seq.to_be_bytes());
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn audit_log(&self, id: ExpenseId) -> Result<Vec<AuditLog>, StoreError> {
        let prefix = id.0.to_be_bytes();
        let iter = self.db.iterator_cf(
            self.cf(CF_AUDIT)?,
            IteratorMode::From(&prefix, Direction::Forward),
        );

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }

    async fn expenses(&self) -> Result<Vec<Expense>, StoreError> {
        let iter = self.db.iterator_cf(self.cf(CF_EXPENSES)?, IteratorMode::Start);

        let mut expenses = Vec::new();
        for item in iter {
            let (_key, value) = item?;
            expenses.push(serde_json::from_slice(&value)?);
        }
        Ok(expenses)
    }
}
