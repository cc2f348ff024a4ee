use super::settlement::SettlementHandle;
use super::workflow::{self, SubmitExpense, Transition};
use crate::domain::audit::AuditLog;
use crate::domain::expense::{Expense, ExpenseId};
use crate::domain::ports::SharedExpenseStore;
use crate::domain::rules::{self, Actor, RuleConfig};
use crate::error::{ExpenseError, Result};
use tracing::info;

/// Caller-facing expense actions.
///
/// Combines the workflow rules with the record store and hands approved
/// expenses to the settlement worker. Settlement runs in the background;
/// its failures never surface here.
#[derive(Clone)]
pub struct ExpenseService {
    store: SharedExpenseStore,
    rules: RuleConfig,
    settlement: SettlementHandle,
}

impl ExpenseService {
    pub fn new(store: SharedExpenseStore, rules: RuleConfig, settlement: SettlementHandle) -> Self {
        Self {
            store,
            rules,
            settlement,
        }
    }

    /// Validates and records a new expense. Auto-approved expenses are
    /// scheduled for settlement straight away.
    pub async fn submit(&self, input: SubmitExpense) -> Result<Expense> {
        let draft = workflow::submit(&self.rules, input)?;
        let expense = self.store.insert(draft).await?;
        info!(
            expense_id = %expense.id,
            user_id = expense.user_id,
            amount = expense.amount.value(),
            status = %expense.status,
            "expense submitted"
        );

        if expense.auto_approved {
            self.schedule(expense.id);
        }
        Ok(expense)
    }

    pub async fn approve(&self, id: ExpenseId, actor: &Actor, notes: &str) -> Result<Expense> {
        rules::can_decide(actor)?;
        let expense = self.load(id).await?;
        let transition = workflow::approve(&expense, Some(actor.id), notes)?;
        let expense = self.apply(transition).await?;

        self.schedule(expense.id);
        Ok(expense)
    }

    pub async fn reject(&self, id: ExpenseId, actor: &Actor, notes: &str) -> Result<Expense> {
        rules::can_decide(actor)?;
        let expense = self.load(id).await?;
        let transition = workflow::reject(&expense, Some(actor.id), notes)?;
        self.apply(transition).await
    }

    pub async fn get(&self, id: ExpenseId) -> Result<Expense> {
        self.load(id).await
    }

    pub async fn audit_log(&self, id: ExpenseId) -> Result<Vec<AuditLog>> {
        Ok(self.store.audit_log(id).await?)
    }

    pub async fn expenses(&self) -> Result<Vec<Expense>> {
        Ok(self.store.expenses().await?)
    }

    async fn load(&self, id: ExpenseId) -> Result<Expense> {
        self.store.get(id).await?.ok_or(ExpenseError::NotFound(id))
    }

    async fn apply(&self, transition: Transition) -> Result<Expense> {
        let expense = transition.expense.clone();
        let from = transition.from;
        self.store.commit(transition.into_changes()).await?;
        info!(
            expense_id = %expense.id,
            from = %from,
            to = %expense.status,
            approver_id = ?expense.approval.approver_id,
            "expense decided"
        );
        Ok(expense)
    }

    fn schedule(&self, id: ExpenseId) {
        // Already logged by the handle; the record is committed either way.
        let _ = self.settlement.schedule(id);
    }
}
