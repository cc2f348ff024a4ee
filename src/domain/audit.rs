use super::expense::{ExpenseId, ExpenseStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable record of one status transition.
///
/// Audit entries are append-only: stores insert them and never update or
/// delete them, so the full history of an expense can be rebuilt from them
/// independently of the expense row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub expense_id: ExpenseId,
    /// `None` when the transition was made by the system.
    pub actor_id: Option<i64>,
    pub from_status: ExpenseStatus,
    pub to_status: ExpenseStatus,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
