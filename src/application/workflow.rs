use crate::domain::audit::AuditLog;
use crate::domain::expense::{
    Approval, ApprovalStatus, Expense, ExpenseId, ExpenseStatus, NewExpense,
};
use crate::domain::ports::ChangeSet;
use crate::domain::rules::{self, RuleConfig};
use crate::error::{TransitionError, ValidationError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

pub const REASON_APPROVED: &str = "expense approved";
pub const REASON_REJECTED: &str = "expense rejected";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitExpense {
    pub user_id: i64,
    pub amount: i64,
    pub description: String,
    #[serde(default)]
    pub receipt_url: String,
}

/// Outcome of a manager decision: the new snapshot plus what to persist.
///
/// The expense passed to [`approve`] or [`reject`] is left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: ExpenseStatus,
    pub expense: Expense,
    pub audit: AuditLog,
}

impl Transition {
    pub fn into_changes(self) -> ChangeSet {
        ChangeSet {
            expected_status: self.from,
            expense: self.expense,
            audit: Some(self.audit),
        }
    }
}

/// Builds a new expense and its pending approval. Nothing is persisted.
pub fn submit(rules: &RuleConfig, input: SubmitExpense) -> Result<NewExpense, ValidationError> {
    let amount = rules.validate_submission(input.amount, &input.description)?;
    let requires_approval = rules.requires_approval(amount);
    let now = Utc::now();

    Ok(NewExpense {
        external_id: Uuid::new_v4(),
        user_id: input.user_id,
        amount,
        description: input.description,
        receipt_url: input.receipt_url,
        status: rules::initial_status(requires_approval),
        requires_approval,
        auto_approved: !requires_approval,
        submitted_at: now,
        approval: Approval::pending(now),
    })
}

pub fn approve(
    expense: &Expense,
    approver_id: Option<i64>,
    notes: &str,
) -> Result<Transition, TransitionError> {
    rules::can_approve(expense.status)?;
    decide(expense, approver_id, notes, ExpenseStatus::Approved)
}

pub fn reject(
    expense: &Expense,
    approver_id: Option<i64>,
    notes: &str,
) -> Result<Transition, TransitionError> {
    rules::can_reject(expense.status)?;
    decide(expense, approver_id, notes, ExpenseStatus::Rejected)
}

fn decide(
    expense: &Expense,
    approver_id: Option<i64>,
    notes: &str,
    to: ExpenseStatus,
) -> Result<Transition, TransitionError> {
    rules::can_proceed(expense)?;
    rules::can_transition(expense.status, to)?;

    let (approval_status, reason) = match to {
        ExpenseStatus::Approved => (ApprovalStatus::Approved, REASON_APPROVED),
        _ => (ApprovalStatus::Rejected, REASON_REJECTED),
    };
    let now = Utc::now();

    let mut next = expense.clone();
    next.status = to;
    next.approval.status = approval_status;
    next.approval.approver_id = approver_id;
    next.approval.notes = notes.to_string();
    next.approval.updated_at = now;

    let audit = build_audit_log_at(expense.id, approver_id, expense.status, to, reason, now);
    Ok(Transition {
        from: expense.status,
        expense: next,
        audit,
    })
}

pub fn build_audit_log(
    expense_id: ExpenseId,
    actor_id: Option<i64>,
    from_status: ExpenseStatus,
    to_status: ExpenseStatus,
    reason: &str,
) -> AuditLog {
    build_audit_log_at(expense_id, actor_id, from_status, to_status, reason, Utc::now())
}

fn build_audit_log_at(
    expense_id: ExpenseId,
    actor_id: Option<i64>,
    from_status: ExpenseStatus,
    to_status: ExpenseStatus,
    reason: &str,
    created_at: DateTime<Utc>,
) -> AuditLog {
    AuditLog {
        expense_id,
        actor_id,
        from_status,
        to_status,
        reason: reason.to_string(),
        created_at,
    }
}
