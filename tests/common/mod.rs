#![allow(dead_code)]

use async_trait::async_trait;
use expense_settlement::application::payment::PaymentClient;
use expense_settlement::application::service::ExpenseService;
use expense_settlement::application::settlement::{SettlementConfig, SettlementWorker, Settler};
use expense_settlement::application::workflow::SubmitExpense;
use expense_settlement::domain::audit::AuditLog;
use expense_settlement::domain::expense::{Expense, ExpenseId, NewExpense};
use expense_settlement::domain::ports::{
    ChangeSet, ExpenseStore, PaymentGateway, PaymentOutcome, PaymentRequest, SharedPaymentGateway,
};
use expense_settlement::domain::rules::{Actor, Role, RuleConfig};
use expense_settlement::error::{GatewayError, StoreError};
use expense_settlement::infrastructure::in_memory::InMemoryExpenseStore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MANAGER: Actor = Actor {
    id: 99,
    role: Role::Manager,
};

pub const EMPLOYEE: Actor = Actor {
    id: 1,
    role: Role::Employee,
};

pub fn expense_input(amount: i64) -> SubmitExpense {
    SubmitExpense {
        user_id: EMPLOYEE.id,
        amount,
        description: "Client dinner".to_string(),
        receipt_url: "https://receipts.example/1".to_string(),
    }
}

/// Millisecond delays for tests running on the real clock.
pub fn fast_settlement() -> SettlementConfig {
    SettlementConfig {
        grace_period: Duration::from_millis(5),
        retry_base_delay: Duration::from_millis(10),
        ..SettlementConfig::default()
    }
}

pub fn unavailable() -> GatewayError {
    GatewayError::Rejected {
        status: 503,
        message: "processor unavailable".to_string(),
    }
}

pub fn paid() -> PaymentOutcome {
    PaymentOutcome::Paid {
        reference: Some("pay_1".to_string()),
        status: Some("COMPLETED".to_string()),
    }
}

/// Answers from a script, then accepts every further call.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<PaymentOutcome, GatewayError>>>,
    requests: Mutex<Vec<PaymentRequest>>,
}

impl ScriptedGateway {
    pub fn new(script: Vec<Result<PaymentOutcome, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::default(),
        }
    }

    pub fn failing_first(failures: usize) -> Self {
        Self::new((0..failures).map(|_| Err(unavailable())).collect())
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::from(u16::MAX))
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentOutcome, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(paid()))
    }
}

/// In-memory store whose first `failures` commits fail.
pub struct FailingCommitStore {
    inner: InMemoryExpenseStore,
    failures: AtomicU32,
}

impl FailingCommitStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: InMemoryExpenseStore::new(),
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl ExpenseStore for FailingCommitStore {
    async fn insert(&self, expense: NewExpense) -> Result<Expense, StoreError> {
        self.inner.insert(expense).await
    }

    async fn get(&self, id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        self.inner.get(id).await
    }

    async fn is_completed(&self, id: ExpenseId) -> Result<bool, StoreError> {
        self.inner.is_completed(id).await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let remaining = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_ok() {
            return Err(StoreError::Backend("disk unavailable".to_string()));
        }
        self.inner.commit(changes).await
    }

    async fn audit_log(&self, id: ExpenseId) -> Result<Vec<AuditLog>, StoreError> {
        self.inner.audit_log(id).await
    }

    async fn expenses(&self) -> Result<Vec<Expense>, StoreError> {
        self.inner.expenses().await
    }
}

pub struct Engine {
    pub service: ExpenseService,
    pub worker: SettlementWorker,
    pub store: Arc<InMemoryExpenseStore>,
}

/// Service, worker and store wired together the way the binary does it.
pub fn engine(gateway: SharedPaymentGateway, settlement: SettlementConfig) -> Engine {
    let store = Arc::new(InMemoryExpenseStore::new());
    let settler = Settler::new(store.clone(), PaymentClient::new(gateway), settlement);
    let worker = SettlementWorker::start(settler);
    let service = ExpenseService::new(store.clone(), RuleConfig::default(), worker.handle());
    Engine {
        service,
        worker,
        store,
    }
}
