use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Durable identifier assigned by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(pub i64);

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated monetary amount in minor currency units.
///
/// Only the rule engine hands these out, so an `Amount` is always within the
/// configured limits at the time it was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub(crate) fn new_unchecked(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    Pending,
    /// Both manager approval and auto-approval land here; `auto_approved`
    /// on the expense tells them apart.
    Approved,
    Rejected,
    Completed,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "pending",
            ExpenseStatus::Approved => "approved",
            ExpenseStatus::Rejected => "rejected",
            ExpenseStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExpenseStatus::Pending),
            "approved" => Ok(ExpenseStatus::Approved),
            "rejected" => Ok(ExpenseStatus::Rejected),
            "completed" => Ok(ExpenseStatus::Completed),
            other => Err(format!("unknown expense status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision record owned by an expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    /// Absent until a manager acts; stays absent for auto-approved expenses.
    pub approver_id: Option<i64>,
    pub status: ApprovalStatus,
    /// Free text. Failure annotations are appended, never replace earlier notes.
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Approval {
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            approver_id: None,
            status: ApprovalStatus::Pending,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends `note` to the existing notes, separated by `" - "`.
    pub fn append_note(&mut self, note: &str, now: DateTime<Utc>) {
        if self.notes.is_empty() {
            self.notes = note.to_string();
        } else {
            self.notes = format!("{} - {}", self.notes, note);
        }
        self.updated_at = now;
    }
}

/// An expense that has been built by a submission but not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    pub external_id: Uuid,
    pub user_id: i64,
    pub amount: Amount,
    pub description: String,
    pub receipt_url: String,
    pub status: ExpenseStatus,
    pub requires_approval: bool,
    pub auto_approved: bool,
    pub submitted_at: DateTime<Utc>,
    pub approval: Approval,
}

impl NewExpense {
    /// Attaches the durable id handed out by the store.
    pub fn into_expense(self, id: ExpenseId) -> Expense {
        Expense {
            id,
            external_id: self.external_id,
            user_id: self.user_id,
            amount: self.amount,
            description: self.description,
            receipt_url: self.receipt_url,
            status: self.status,
            requires_approval: self.requires_approval,
            auto_approved: self.auto_approved,
            submitted_at: self.submitted_at,
            processed_at: None,
            approval: self.approval,
        }
    }
}

/// A reimbursement request and its approval record.
///
/// `requires_approval` and `auto_approved` are fixed at submission and are
/// always each other's negation. `processed_at` is only set once the expense
/// reaches [`ExpenseStatus::Completed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    /// Exposed to the payment processor as the idempotency key.
    pub external_id: Uuid,
    pub user_id: i64,
    pub amount: Amount,
    pub description: String,
    pub receipt_url: String,
    pub status: ExpenseStatus,
    pub requires_approval: bool,
    pub auto_approved: bool,
    pub submitted_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub approval: Approval,
}

impl Expense {
    pub fn is_completed(&self) -> bool {
        self.status == ExpenseStatus::Completed
    }
}
