//! Background settlement of approved expenses.
//!
//! Triggers are queued on a bounded channel and drained by a dispatcher task
//! that runs each settlement as its own task, at most `concurrency` at a time.
//! A settlement re-reads the expense before every attempt and retries failed
//! payments with a linear backoff. Every write is conditional on the status it
//! read, and an in-flight set drops duplicate triggers for an expense that is
//! already being settled, so one expense is never completed twice.

use super::payment::PaymentClient;
use super::workflow;
use crate::domain::expense::{ExpenseId, ExpenseStatus};
use crate::domain::ports::{ChangeSet, SharedExpenseStore};
use crate::domain::rules;
use crate::error::{SettlementError, StoreError};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

pub const COMPLETION_REASON: &str = "completed by payment processing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementConfig {
    /// Delay before the first attempt, so the triggering write is visible.
    pub grace_period: Duration,
    pub max_attempts: u32,
    /// Attempt `n` failing waits `n * retry_base_delay` before the next one.
    pub retry_base_delay: Duration,
    /// Maximum number of settlements running at once.
    pub concurrency: usize,
    /// Maximum number of triggers waiting for a free worker.
    pub queue_capacity: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(3),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(5),
            concurrency: 4,
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Completed,
    /// Someone else already completed the expense.
    AlreadyCompleted,
    /// The expense is in a status that cannot be paid out.
    NotSettleable(ExpenseStatus),
    /// Every attempt failed; a failure note was written to the approval.
    Exhausted { attempts: u32 },
}

/// Runs the attempt loop for one expense.
#[derive(Clone)]
pub struct Settler {
    store: SharedExpenseStore,
    payment: PaymentClient,
    config: SettlementConfig,
}

impl Settler {
    pub fn new(store: SharedExpenseStore, payment: PaymentClient, config: SettlementConfig) -> Self {
        Self {
            store,
            payment,
            config,
        }
    }

    /// Drives `id` to completion or to terminal failure.
    ///
    /// Only a missing expense, or a failure note that could not be written
    /// after every retry, is returned as an error; payment and persistence
    /// failures during attempts are retried.
    pub async fn settle(&self, id: ExpenseId) -> Result<SettlementOutcome, StoreError> {
        pause(self.config.grace_period).await;

        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            if let Some(outcome) = self.attempt(id, attempt).await? {
                return Ok(outcome);
            }
            if attempt < max_attempts {
                let delay = self.backoff(attempt);
                debug!(expense_id = %id, attempt, ?delay, "retrying settlement");
                pause(delay).await;
            }
        }

        self.record_failure(id, max_attempts).await
    }

    /// Delay after failed attempt `attempt`, saturating instead of overflowing.
    fn backoff(&self, attempt: u32) -> Duration {
        self.config
            .retry_base_delay
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX)
    }

    /// One fetch-and-pay round. `Ok(None)` means the attempt failed and may
    /// be retried.
    async fn attempt(
        &self,
        id: ExpenseId,
        attempt: u32,
    ) -> Result<Option<SettlementOutcome>, StoreError> {
        match self.store.is_completed(id).await {
            Ok(true) => {
                debug!(expense_id = %id, "expense already completed");
                return Ok(Some(SettlementOutcome::AlreadyCompleted));
            }
            Ok(false) => {}
            Err(StoreError::NotFound(_)) => return Err(StoreError::NotFound(id)),
            Err(err) => {
                warn!(expense_id = %id, attempt, error = %err, "failed to check expense");
                return Ok(None);
            }
        }

        let expense = match self.store.get(id).await {
            Ok(Some(expense)) => expense,
            Ok(None) => return Err(StoreError::NotFound(id)),
            Err(err) => {
                warn!(expense_id = %id, attempt, error = %err, "failed to load expense");
                return Ok(None);
            }
        };

        if expense.is_completed() {
            debug!(expense_id = %id, "expense already completed");
            return Ok(Some(SettlementOutcome::AlreadyCompleted));
        }
        if let Err(err) = rules::can_transition(expense.status, ExpenseStatus::Completed) {
            warn!(expense_id = %id, error = %err, "expense cannot be settled");
            return Ok(Some(SettlementOutcome::NotSettleable(expense.status)));
        }

        let from_status = expense.status;
        let settled = match self.payment.settle(&expense).await {
            Ok(settled) => settled,
            Err(err) => {
                warn!(expense_id = %id, attempt, error = %err, "payment attempt failed");
                return Ok(None);
            }
        };

        let audit = workflow::build_audit_log(
            id,
            None,
            from_status,
            ExpenseStatus::Completed,
            COMPLETION_REASON,
        );
        let changes = ChangeSet {
            expected_status: from_status,
            expense: settled,
            audit: Some(audit),
        };

        match self.store.commit(changes).await {
            Ok(()) => {
                info!(expense_id = %id, attempt, "expense settled");
                Ok(Some(SettlementOutcome::Completed))
            }
            Err(err) => {
                // The processor has the payment; the retry re-sends the same
                // external id and is answered as a duplicate.
                error!(
                    expense_id = %id,
                    external_id = %expense.external_id,
                    attempt,
                    error = %err,
                    "payment accepted but local update failed, reconciliation required"
                );
                Ok(None)
            }
        }
    }

    /// Appends the failure note, retrying the write with the same backoff
    /// as payment attempts.
    async fn record_failure(
        &self,
        id: ExpenseId,
        attempts: u32,
    ) -> Result<SettlementOutcome, StoreError> {
        let note = format!("payment failed after {attempts} attempts");
        let max_writes = self.config.max_attempts.max(1);
        let mut external_id = None;
        let mut write = 0;

        loop {
            write += 1;
            let result = match self.store.get(id).await {
                Ok(Some(mut expense)) => {
                    if expense.is_completed() {
                        return Ok(SettlementOutcome::AlreadyCompleted);
                    }
                    external_id = Some(expense.external_id);
                    let expected_status = expense.status;
                    expense.approval.append_note(&note, Utc::now());
                    self.store
                        .commit(ChangeSet {
                            expected_status,
                            expense,
                            audit: None,
                        })
                        .await
                }
                Ok(None) => return Err(StoreError::NotFound(id)),
                Err(err) => Err(err),
            };

            match result {
                Ok(()) => {
                    error!(
                        expense_id = %id,
                        attempts,
                        "settlement gave up, manual intervention required"
                    );
                    return Ok(SettlementOutcome::Exhausted { attempts });
                }
                Err(err) if write < max_writes => {
                    warn!(expense_id = %id, write, error = %err, "failed to record payment failure");
                    pause(self.backoff(write)).await;
                }
                Err(err) => {
                    error!(
                        expense_id = %id,
                        external_id = ?external_id,
                        attempts,
                        error = %err,
                        "payment failure could not be recorded, reconciliation required"
                    );
                    return Err(err);
                }
            }
        }
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Cloneable, non-blocking trigger for settlements.
#[derive(Clone)]
pub struct SettlementHandle {
    sender: mpsc::Sender<ExpenseId>,
}

impl SettlementHandle {
    /// Queues `id` for settlement without waiting for it to run.
    pub fn schedule(&self, id: ExpenseId) -> Result<(), SettlementError> {
        match self.sender.try_send(id) {
            Ok(()) => {
                debug!(expense_id = %id, "settlement scheduled");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                error!(expense_id = %id, "settlement queue full, expense needs a manual re-trigger");
                Err(SettlementError::QueueFull(id))
            }
            Err(TrySendError::Closed(_)) => {
                error!(expense_id = %id, "settlement worker stopped, expense needs a manual re-trigger");
                Err(SettlementError::Closed(id))
            }
        }
    }
}

type InFlight = Arc<Mutex<HashSet<ExpenseId>>>;

/// Removes the expense from the in-flight set when its settlement ends.
struct InFlightGuard {
    in_flight: InFlight,
    id: ExpenseId,
}

impl InFlightGuard {
    fn claim(in_flight: &InFlight, id: ExpenseId) -> Option<Self> {
        let mut set = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        set.insert(id).then(|| Self {
            in_flight: in_flight.clone(),
            id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Bounded pool of settlement tasks fed from a queue.
pub struct SettlementWorker {
    handle: SettlementHandle,
    shutdown: oneshot::Sender<()>,
    dispatcher: JoinHandle<()>,
}

impl SettlementWorker {
    /// Starts the dispatcher. Must be called from within a tokio runtime.
    pub fn start(settler: Settler) -> Self {
        let capacity = settler.config.queue_capacity.max(1);
        let concurrency = settler.config.concurrency.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (shutdown, shutdown_rx) = oneshot::channel();

        let dispatcher = tokio::spawn(dispatch(
            Arc::new(settler),
            receiver,
            shutdown_rx,
            Arc::new(Semaphore::new(concurrency)),
        ));

        Self {
            handle: SettlementHandle { sender },
            shutdown,
            dispatcher,
        }
    }

    pub fn handle(&self) -> SettlementHandle {
        self.handle.clone()
    }

    /// Stops accepting triggers and waits for every queued and running
    /// settlement to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.dispatcher.await {
            error!(error = %err, "settlement dispatcher terminated abnormally");
        }
    }
}

async fn dispatch(
    settler: Arc<Settler>,
    mut receiver: mpsc::Receiver<ExpenseId>,
    mut shutdown: oneshot::Receiver<()>,
    permits: Arc<Semaphore>,
) {
    let in_flight: InFlight = Arc::default();
    let mut tasks = JoinSet::new();
    let mut closing = false;

    loop {
        let id = tokio::select! {
            _ = &mut shutdown, if !closing => {
                // Buffered triggers are still drained after close.
                receiver.close();
                closing = true;
                continue;
            }
            next = receiver.recv() => match next {
                Some(id) => id,
                None => break,
            },
        };

        let Some(guard) = InFlightGuard::claim(&in_flight, id) else {
            debug!(expense_id = %id, "settlement already in flight, trigger dropped");
            continue;
        };
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        let settler = settler.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let _guard = guard;
            match settler.settle(id).await {
                Ok(outcome) => debug!(expense_id = %id, ?outcome, "settlement finished"),
                Err(err) => error!(expense_id = %id, error = %err, "settlement aborted"),
            }
        });

        while let Some(finished) = tasks.try_join_next() {
            log_join(finished);
        }
    }

    while let Some(finished) = tasks.join_next().await {
        log_join(finished);
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        error!(error = %err, "settlement task panicked");
    }
}
