use crate::domain::expense::{ApprovalStatus, Expense, ExpenseStatus};
use crate::domain::ports::{PaymentOutcome, PaymentRequest, SharedPaymentGateway};
use crate::error::GatewayError;
use chrono::Utc;
use tracing::{debug, info};

pub const AUTO_APPROVED_NOTE: &str = "auto-approved";

/// Settles a single expense against the payment processor.
///
/// The request always carries the expense's external id, so repeating a
/// settlement after a lost response is safe.
#[derive(Clone)]
pub struct PaymentClient {
    gateway: SharedPaymentGateway,
}

impl PaymentClient {
    pub fn new(gateway: SharedPaymentGateway) -> Self {
        Self { gateway }
    }

    /// Pays out `expense` and returns its completed snapshot.
    ///
    /// The input is not modified; callers persist the returned value.
    pub async fn settle(&self, expense: &Expense) -> Result<Expense, GatewayError> {
        let request = PaymentRequest {
            amount: expense.amount.value(),
            external_id: expense.external_id.to_string(),
        };

        match self.gateway.create_payment(&request).await? {
            PaymentOutcome::Paid { reference, status } => {
                info!(
                    expense_id = %expense.id,
                    reference = reference.as_deref().unwrap_or("-"),
                    processor_status = status.as_deref().unwrap_or("-"),
                    "payment accepted"
                );
            }
            PaymentOutcome::AlreadyPaid => {
                debug!(expense_id = %expense.id, "payment already recorded by processor");
            }
        }

        let now = Utc::now();
        let mut settled = expense.clone();
        settled.status = ExpenseStatus::Completed;
        settled.processed_at = Some(now);
        if settled.auto_approved {
            settled.approval.status = ApprovalStatus::Approved;
            settled.approval.append_note(AUTO_APPROVED_NOTE, now);
        }
        Ok(settled)
    }
}
