use crate::domain::expense::{ApprovalStatus, Expense, ExpenseStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct ExpenseRow<'a> {
    id: i64,
    user: i64,
    amount: i64,
    status: ExpenseStatus,
    requires_approval: bool,
    auto_approved: bool,
    approval_status: ApprovalStatus,
    approver: Option<i64>,
    notes: &'a str,
    processed: bool,
    external_id: String,
}

impl<'a> From<&'a Expense> for ExpenseRow<'a> {
    fn from(expense: &'a Expense) -> Self {
        Self {
            id: expense.id.0,
            user: expense.user_id,
            amount: expense.amount.value(),
            status: expense.status,
            requires_approval: expense.requires_approval,
            auto_approved: expense.auto_approved,
            approval_status: expense.approval.status,
            approver: expense.approval.approver_id,
            notes: &expense.approval.notes,
            processed: expense.processed_at.is_some(),
            external_id: expense.external_id.to_string(),
        }
    }
}

/// Writes the final state of expenses as CSV.
pub struct ExpenseWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ExpenseWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_expenses(&mut self, expenses: &[Expense]) -> Result<()> {
        for expense in expenses {
            self.writer.serialize(ExpenseRow::from(expense))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::workflow::{self, SubmitExpense};
    use crate::domain::expense::ExpenseId;
    use crate::domain::rules::RuleConfig;

    #[test]
    fn test_writes_header_and_rows() {
        let expense = workflow::submit(
            &RuleConfig::default(),
            SubmitExpense {
                user_id: 5,
                amount: 2_000_000,
                description: "Laptop".to_string(),
                receipt_url: String::new(),
            },
        )
        .unwrap()
        .into_expense(ExpenseId(1));
        let approved = workflow::approve(&expense, Some(99), "ok").unwrap().expense;

        let mut buffer = Vec::new();
        ExpenseWriter::new(&mut buffer)
            .write_expenses(&[approved])
            .unwrap();
        let output = String::from_utf8(buffer).unwrap();
        let mut lines = output.lines();

        assert_eq!(
            lines.next().unwrap(),
            "id,user,amount,status,requires_approval,auto_approved,approval_status,approver,notes,processed,external_id"
        );
        assert_eq!(
            lines.next().unwrap(),
            format!(
                "1,5,2000000,approved,true,false,approved,99,ok,false,{}",
                expense.external_id
            )
        );
    }
}
