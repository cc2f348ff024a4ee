use crate::domain::ports::{PaymentGateway, PaymentOutcome, PaymentRequest};
use crate::error::GatewayError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_DUPLICATE_STATUS: u16 = 400;
pub const DEFAULT_DUPLICATE_MESSAGE: &str = "external id already exists";

/// Connection settings and the idempotency contract with the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    pub base_url: Option<String>,
    pub timeout: Duration,
    /// Status code the processor answers with for a repeated external id.
    pub duplicate_status: u16,
    /// Message that accompanies `duplicate_status` for a repeated external id.
    pub duplicate_message: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(5),
            duplicate_status: DEFAULT_DUPLICATE_STATUS,
            duplicate_message: DEFAULT_DUPLICATE_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PaymentData {
    id: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    #[serde(default)]
    data: Option<PaymentData>,
    #[serde(default)]
    message: String,
}

/// Payment processor client speaking JSON over HTTP.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    config: PaymentConfig,
}

impl HttpPaymentGateway {
    pub fn new(config: PaymentConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn payments_url(&self) -> Result<String, GatewayError> {
        match self.config.base_url.as_deref() {
            Some(base) if !base.trim().is_empty() => {
                Ok(format!("{}/v1/payments", base.trim_end_matches('/')))
            }
            _ => Err(GatewayError::NotConfigured),
        }
    }

    fn is_duplicate(&self, status: u16, message: &str) -> bool {
        status == self.config.duplicate_status && message == self.config.duplicate_message
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentOutcome, GatewayError> {
        let url = self.payments_url()?;
        debug!(%url, external_id = %request.external_id, amount = request.amount, "creating payment");

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        let parsed: PaymentResponse = serde_json::from_slice(&body)
            .map_err(|err| GatewayError::Decode(format!("status {status}: {err}")))?;

        debug!(%status, message = %parsed.message, "payment processor responded");

        if status.is_success() {
            let data = parsed.data.unwrap_or_default();
            return Ok(PaymentOutcome::Paid {
                reference: data.id,
                status: data.status,
            });
        }
        if self.is_duplicate(status.as_u16(), &parsed.message) {
            return Ok(PaymentOutcome::AlreadyPaid);
        }
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            message: parsed.message,
        })
    }
}
