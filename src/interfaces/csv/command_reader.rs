use crate::application::workflow::SubmitExpense;
use crate::domain::expense::ExpenseId;
use crate::domain::rules::{Actor, Role};
use crate::error::{ExpenseError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Submit,
    Approve,
    Reject,
}

/// One row of a command file.
///
/// Columns: `action, actor, role, expense, amount, description, receipt, notes`.
/// Which columns are required depends on the action.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Command {
    pub action: Action,
    pub actor: i64,
    pub role: Option<Role>,
    pub expense: Option<i64>,
    pub amount: Option<i64>,
    pub description: Option<String>,
    pub receipt: Option<String>,
    pub notes: Option<String>,
}

/// A command checked for the fields its action needs.
#[derive(Debug, PartialEq, Clone)]
pub enum Request {
    Submit(SubmitExpense),
    Approve {
        expense: ExpenseId,
        actor: Actor,
        notes: String,
    },
    Reject {
        expense: ExpenseId,
        actor: Actor,
        notes: String,
    },
}

impl Command {
    pub fn into_request(self) -> Result<Request> {
        let actor = Actor {
            id: self.actor,
            role: self.role.unwrap_or(Role::Employee),
        };
        match self.action {
            Action::Submit => {
                let amount = self.amount.ok_or_else(|| {
                    ExpenseError::InvalidCommand("submit requires an amount".to_string())
                })?;
                Ok(Request::Submit(SubmitExpense {
                    user_id: actor.id,
                    amount,
                    description: self.description.unwrap_or_default(),
                    receipt_url: self.receipt.unwrap_or_default(),
                }))
            }
            Action::Approve | Action::Reject => {
                let expense = self.expense.map(ExpenseId).ok_or_else(|| {
                    ExpenseError::InvalidCommand(format!(
                        "{:?} requires an expense id",
                        self.action
                    ))
                })?;
                let notes = self.notes.unwrap_or_default();
                Ok(if self.action == Action::Approve {
                    Request::Approve {
                        expense,
                        actor,
                        notes,
                    }
                } else {
                    Request::Reject {
                        expense,
                        actor,
                        notes,
                    }
                })
            }
        }
    }
}

/// Reads commands from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<Command>`.
/// It handles whitespace trimming and short records automatically.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes commands.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(ExpenseError::from))
    }
}
