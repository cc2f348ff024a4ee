use crate::application::settlement::SettlementConfig;
use crate::domain::rules::RuleConfig;
use crate::error::ExpenseError;
use crate::infrastructure::http_gateway::PaymentConfig;

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub rules: RuleConfig,
    pub payment: PaymentConfig,
    pub settlement: SettlementConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ExpenseError> {
        self.rules.validate()?;
        if self.payment.timeout.is_zero() {
            return Err(ExpenseError::Config(
                "payment timeout must be greater than zero".to_string(),
            ));
        }
        if self.settlement.max_attempts == 0 {
            return Err(ExpenseError::Config(
                "settlement needs at least one attempt".to_string(),
            ));
        }
        if self.settlement.concurrency == 0 || self.settlement.queue_capacity == 0 {
            return Err(ExpenseError::Config(
                "settlement concurrency and queue capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
