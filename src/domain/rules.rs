//! Pure business rules: amount validation and the expense status table.

use super::expense::{Amount, Expense, ExpenseStatus};
use crate::error::{ExpenseError, TransitionError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_MIN_AMOUNT: i64 = 10_000;
pub const DEFAULT_MAX_AMOUNT: i64 = 50_000_000;
pub const DEFAULT_APPROVAL_THRESHOLD: i64 = 1_000_000;

/// Amount limits used to validate submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleConfig {
    pub min_amount: i64,
    pub max_amount: i64,
    /// Amounts at or above this need a manager's approval.
    pub approval_threshold: i64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            min_amount: DEFAULT_MIN_AMOUNT,
            max_amount: DEFAULT_MAX_AMOUNT,
            approval_threshold: DEFAULT_APPROVAL_THRESHOLD,
        }
    }
}

impl RuleConfig {
    /// Checks `0 < min < threshold < max`.
    pub fn validate(&self) -> Result<(), ExpenseError> {
        if self.min_amount <= 0 {
            return Err(ExpenseError::Config(format!(
                "minimum amount must be positive, got {}",
                self.min_amount
            )));
        }
        if !(self.min_amount < self.approval_threshold && self.approval_threshold < self.max_amount)
        {
            return Err(ExpenseError::Config(format!(
                "approval threshold {} must lie strictly between minimum {} and maximum {}",
                self.approval_threshold, self.min_amount, self.max_amount
            )));
        }
        Ok(())
    }

    /// Validates a submission and returns the checked amount.
    ///
    /// Non-positive amounts are reported as [`ValidationError::InvalidAmount`]
    /// before the range checks run.
    pub fn validate_submission(
        &self,
        amount: i64,
        description: &str,
    ) -> Result<Amount, ValidationError> {
        if amount <= 0 {
            return Err(ValidationError::InvalidAmount);
        }
        if amount < self.min_amount {
            return Err(ValidationError::AmountTooSmall {
                min: self.min_amount,
            });
        }
        if amount > self.max_amount {
            return Err(ValidationError::AmountTooLarge {
                max: self.max_amount,
            });
        }
        if description.trim().is_empty() {
            return Err(ValidationError::EmptyDescription);
        }
        Ok(Amount::new_unchecked(amount))
    }

    pub fn requires_approval(&self, amount: Amount) -> bool {
        amount.value() >= self.approval_threshold
    }
}

/// Status an expense starts in. Auto-approved expenses reuse `approved`.
pub fn initial_status(requires_approval: bool) -> ExpenseStatus {
    if requires_approval {
        ExpenseStatus::Pending
    } else {
        ExpenseStatus::Approved
    }
}

fn allowed_targets(from: ExpenseStatus) -> &'static [ExpenseStatus] {
    match from {
        ExpenseStatus::Pending => &[ExpenseStatus::Approved, ExpenseStatus::Rejected],
        ExpenseStatus::Approved => &[ExpenseStatus::Completed],
        ExpenseStatus::Rejected | ExpenseStatus::Completed => &[],
    }
}

pub fn can_transition(from: ExpenseStatus, to: ExpenseStatus) -> Result<(), TransitionError> {
    if allowed_targets(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition { from, to })
    }
}

pub fn can_approve(status: ExpenseStatus) -> Result<(), TransitionError> {
    require_pending(status, ExpenseStatus::Approved)
}

pub fn can_reject(status: ExpenseStatus) -> Result<(), TransitionError> {
    require_pending(status, ExpenseStatus::Rejected)
}

fn require_pending(status: ExpenseStatus, to: ExpenseStatus) -> Result<(), TransitionError> {
    if status == ExpenseStatus::Pending {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition { from: status, to })
    }
}

/// Guards against deciding on the same expense twice.
pub fn can_proceed(expense: &Expense) -> Result<(), TransitionError> {
    match expense.status {
        ExpenseStatus::Pending => Ok(()),
        ExpenseStatus::Approved | ExpenseStatus::Rejected | ExpenseStatus::Completed => {
            Err(TransitionError::AlreadyFinalized)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "user")]
    Employee,
    Manager,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Employee => f.write_str("employee"),
            Role::Manager => f.write_str("manager"),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

/// Only managers approve or reject expenses.
pub fn can_decide(actor: &Actor) -> Result<(), ExpenseError> {
    match actor.role {
        Role::Manager => Ok(()),
        Role::Employee => Err(ExpenseError::Forbidden),
    }
}
