use clap::Parser;
use expense_settlement::application::payment::PaymentClient;
use expense_settlement::application::service::ExpenseService;
use expense_settlement::application::settlement::{SettlementConfig, SettlementWorker, Settler};
use expense_settlement::config::Config;
use expense_settlement::domain::ports::{SharedExpenseStore, SharedPaymentGateway};
use expense_settlement::domain::rules::RuleConfig;
use expense_settlement::error::ExpenseError;
use expense_settlement::infrastructure::http_gateway::{
    DEFAULT_DUPLICATE_MESSAGE, DEFAULT_DUPLICATE_STATUS, HttpPaymentGateway, PaymentConfig,
};
use expense_settlement::infrastructure::in_memory::InMemoryExpenseStore;
use expense_settlement::interfaces::csv::command_reader::{CommandReader, Request};
use expense_settlement::interfaces::csv::expense_writer::ExpenseWriter;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). Requires the `storage-rocksdb` feature.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Base URL of the payment processor
    #[arg(long, env = "PAYMENT_BASE_URL")]
    payment_url: Option<String>,

    /// Payment request timeout in milliseconds
    #[arg(long, env = "EXPENSE_PAYMENT_TIMEOUT_MS", default_value_t = 5_000)]
    payment_timeout_ms: u64,

    /// Status code the processor uses for a repeated external id
    #[arg(long, env = "EXPENSE_DUPLICATE_STATUS", default_value_t = DEFAULT_DUPLICATE_STATUS)]
    duplicate_status: u16,

    /// Message the processor uses for a repeated external id
    #[arg(long, env = "EXPENSE_DUPLICATE_MESSAGE", default_value = DEFAULT_DUPLICATE_MESSAGE)]
    duplicate_message: String,

    #[arg(long, env = "EXPENSE_MIN_AMOUNT", default_value_t = RuleConfig::default().min_amount)]
    min_amount: i64,

    #[arg(long, env = "EXPENSE_MAX_AMOUNT", default_value_t = RuleConfig::default().max_amount)]
    max_amount: i64,

    /// Amounts at or above this need a manager's approval
    #[arg(long, env = "EXPENSE_APPROVAL_THRESHOLD", default_value_t = RuleConfig::default().approval_threshold)]
    approval_threshold: i64,

    #[arg(long, env = "EXPENSE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Base of the linear backoff between payment attempts, in milliseconds
    #[arg(long, env = "EXPENSE_RETRY_DELAY_MS", default_value_t = 5_000)]
    retry_delay_ms: u64,

    /// Delay before the first payment attempt, in milliseconds
    #[arg(long, env = "EXPENSE_GRACE_PERIOD_MS", default_value_t = 3_000)]
    grace_period_ms: u64,

    /// Maximum number of settlements running at once
    #[arg(long, env = "EXPENSE_WORKERS", default_value_t = 4)]
    workers: usize,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            rules: RuleConfig {
                min_amount: self.min_amount,
                max_amount: self.max_amount,
                approval_threshold: self.approval_threshold,
            },
            payment: PaymentConfig {
                base_url: self.payment_url.clone(),
                timeout: Duration::from_millis(self.payment_timeout_ms),
                duplicate_status: self.duplicate_status,
                duplicate_message: self.duplicate_message.clone(),
            },
            settlement: SettlementConfig {
                grace_period: Duration::from_millis(self.grace_period_ms),
                max_attempts: self.max_attempts,
                retry_base_delay: Duration::from_millis(self.retry_delay_ms),
                concurrency: self.workers,
                ..SettlementConfig::default()
            },
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expense_settlement=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal()),
        )
        .init();
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<SharedExpenseStore> {
    use expense_settlement::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "using RocksDB storage");
            Ok(Arc::new(RocksDBStore::open(path).into_diagnostic()?))
        }
        None => Ok(Arc::new(InMemoryExpenseStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<SharedExpenseStore> {
    if let Some(path) = db_path {
        warn!(
            path = %path.display(),
            "built without the storage-rocksdb feature, falling back to in-memory storage"
        );
    }
    Ok(Arc::new(InMemoryExpenseStore::new()))
}

async fn execute(service: &ExpenseService, request: Request) -> Result<(), ExpenseError> {
    match request {
        Request::Submit(input) => service.submit(input).await.map(|_| ()),
        Request::Approve {
            expense,
            actor,
            notes,
        } => service.approve(expense, &actor, &notes).await.map(|_| ()),
        Request::Reject {
            expense,
            actor,
            notes,
        } => service.reject(expense, &actor, &notes).await.map(|_| ()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = cli.config();
    config.validate().into_diagnostic()?;

    let store = open_store(cli.db_path)?;
    let gateway: SharedPaymentGateway =
        Arc::new(HttpPaymentGateway::new(config.payment.clone()).into_diagnostic()?);
    if config.payment.base_url.is_none() {
        warn!("no payment processor configured, settlements will fail");
    }

    let settler = Settler::new(
        store.clone(),
        PaymentClient::new(gateway),
        config.settlement.clone(),
    );
    let worker = SettlementWorker::start(settler);
    let service = ExpenseService::new(store, config.rules.clone(), worker.handle());

    // Replay commands
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for (line, command) in reader.commands().enumerate() {
        let result = match command {
            Ok(command) => match command.into_request() {
                Ok(request) => execute(&service, request).await,
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(row = line + 1, error = %err, "command skipped");
        }
    }

    // Wait for every scheduled settlement before reporting
    worker.shutdown().await;

    let expenses = service.expenses().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = ExpenseWriter::new(stdout.lock());
    writer.write_expenses(&expenses).into_diagnostic()?;

    Ok(())
}
