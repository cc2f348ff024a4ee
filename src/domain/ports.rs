use super::audit::AuditLog;
use super::expense::{Expense, ExpenseId, ExpenseStatus, NewExpense};
use crate::error::{GatewayError, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything one workflow step wants persisted, applied all-or-nothing.
///
/// The write only goes through when the stored expense is still in
/// `expected_status`; otherwise the store answers [`StoreError::Conflict`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub expected_status: ExpenseStatus,
    /// New snapshot of the expense, approval included.
    pub expense: Expense,
    pub audit: Option<AuditLog>,
}

/// Transactional record store for expenses, approvals and audit entries.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Persists a new expense together with its approval and assigns its id.
    async fn insert(&self, expense: NewExpense) -> Result<Expense, StoreError>;
    async fn get(&self, id: ExpenseId) -> Result<Option<Expense>, StoreError>;
    async fn is_completed(&self, id: ExpenseId) -> Result<bool, StoreError>;
    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;
    /// Audit entries for one expense, oldest first.
    async fn audit_log(&self, id: ExpenseId) -> Result<Vec<AuditLog>, StoreError>;
    /// All expenses ordered by id.
    async fn expenses(&self) -> Result<Vec<Expense>, StoreError>;
}

pub type SharedExpenseStore = Arc<dyn ExpenseStore>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: i64,
    /// Idempotency key; stays the same across retries of one expense.
    pub external_id: String,
}

/// A payment the processor accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid {
        reference: Option<String>,
        status: Option<String>,
    },
    /// The processor already holds a payment for this external id.
    AlreadyPaid,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(&self, request: &PaymentRequest)
    -> Result<PaymentOutcome, GatewayError>;
}

pub type SharedPaymentGateway = Arc<dyn PaymentGateway>;
