use crate::domain::audit::AuditLog;
use crate::domain::expense::{Expense, ExpenseId, NewExpense};
use crate::domain::ports::{ChangeSet, ExpenseStore};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Records {
    last_id: i64,
    expenses: BTreeMap<ExpenseId, Expense>,
    audit: Vec<AuditLog>,
}

/// A thread-safe in-memory record store.
///
/// All records live behind a single `RwLock`, so a [`ChangeSet`] is applied
/// while holding the write lock and is never observed half-written.
/// Ideal for testing or for runs where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryExpenseStore {
    records: Arc<RwLock<Records>>,
}

impl InMemoryExpenseStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpenseStore for InMemoryExpenseStore {
    async fn insert(&self, expense: NewExpense) -> Result<Expense, StoreError> {
        let mut records = self.records.write().await;
        records.last_id += 1;
        let expense = expense.into_expense(ExpenseId(records.last_id));
        records.expenses.insert(expense.id, expense.clone());
        Ok(expense)
    }

    async fn get(&self, id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        let records = self.records.read().await;
        Ok(records.expenses.get(&id).cloned())
    }

    async fn is_completed(&self, id: ExpenseId) -> Result<bool, StoreError> {
        let records = self.records.read().await;
        records
            .expenses
            .get(&id)
            .map(Expense::is_completed)
            .ok_or(StoreError::NotFound(id))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let id = changes.expense.id;
        let current = records
            .expenses
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        if current.status != changes.expected_status {
            return Err(StoreError::Conflict {
                id,
                expected: changes.expected_status,
                actual: current.status,
            });
        }

        *current = changes.expense;
        if let Some(audit) = changes.audit {
            records.audit.push(audit);
        }
        Ok(())
    }

    async fn audit_log(&self, id: ExpenseId) -> Result<Vec<AuditLog>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .audit
            .iter()
            .filter(|entry| entry.expense_id == id)
            .cloned()
            .collect())
    }

    async fn expenses(&self) -> Result<Vec<Expense>, StoreError> {
        let records = self.records.read().await;
        Ok(records.expenses.values().cloned().collect())
    }
}
