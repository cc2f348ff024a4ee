use crate::domain::expense::{ExpenseId, ExpenseStatus};
use thiserror::Error;

/// Rejections of a submission. Always caller-correctable, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount must be a positive integer")]
    InvalidAmount,
    #[error("amount is below minimum expense limit of {min}")]
    AmountTooSmall { min: i64 },
    #[error("amount exceeds maximum expense limit of {max}")]
    AmountTooLarge { max: i64 },
    #[error("description is required")]
    EmptyDescription,
}

/// Illegal status changes. Surfaced to the caller as a conflict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid expense status transition from {from} to {to}")]
    InvalidTransition {
        from: ExpenseStatus,
        to: ExpenseStatus,
    },
    #[error("expense has already been finalized")]
    AlreadyFinalized,
    #[error("expense is not pending for approval")]
    NotPendingApproval,
}

/// Failures talking to the payment processor. Transient from the settlement
/// worker's point of view.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("payment processor base URL is not configured")]
    NotConfigured,
    #[error("payment processor request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode payment response: {0}")]
    Decode(String),
    #[error("payment failed with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("expense {0} not found")]
    NotFound(ExpenseId),
    #[error("expense {id} changed concurrently: expected {expected}, found {actual}")]
    Conflict {
        id: ExpenseId,
        expected: ExpenseStatus,
        actual: ExpenseStatus,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("settlement queue is full, expense {0} needs a manual re-trigger")]
    QueueFull(ExpenseId),
    #[error("settlement worker has shut down, expense {0} needs a manual re-trigger")]
    Closed(ExpenseId),
}

#[derive(Error, Debug)]
pub enum ExpenseError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error("forbidden action")]
    Forbidden,
    #[error("expense {0} not found")]
    NotFound(ExpenseId),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExpenseError {
    /// True for errors the caller should see as a state conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ExpenseError::Transition(_) | ExpenseError::Store(StoreError::Conflict { .. })
        )
    }

    /// True for errors caused by the request itself rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExpenseError::Validation(_)
                | ExpenseError::Forbidden
                | ExpenseError::NotFound(_)
                | ExpenseError::InvalidCommand(_)
        ) || self.is_conflict()
    }
}

pub type Result<T> = std::result::Result<T, ExpenseError>;
