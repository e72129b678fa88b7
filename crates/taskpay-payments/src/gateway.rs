//! Push-payment provider client.
//!
//! The provider prompts the subscriber's phone to authorize payment (an
//! STK-style push), then reports the outcome through a status endpoint the
//! platform polls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use taskpay_types::{Result, TaskPayError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Provider API base, e.g. `https://pay.example.com/api/v2`.
    pub base_url: String,
    pub api_username: String,
    pub api_password: String,
    pub channel_id: u32,
    /// Where the provider posts its asynchronous result.
    pub callback_url: String,
    pub provider: String,
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pay.example.com/api/v2".to_string(),
            api_username: String::new(),
            api_password: String::new(),
            channel_id: 0,
            callback_url: "https://taskpay.example.com/api/payments/callback".to_string(),
            provider: "m-pesa".to_string(),
            timeout_secs: 20,
        }
    }
}

/// A push request, already normalized and validated by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct PushRequest {
    /// `254[17]XXXXXXXX`
    pub phone: String,
    /// Whole local-currency units, as the provider expects.
    pub amount_kes: u64,
    /// Client-generated reference, unique per attempt.
    pub reference: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushAck {
    pub success: bool,
    /// The provider's own reference for the transaction, when it issues one.
    pub provider_reference: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Queued,
    Success,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Queued)
    }
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn initiate_push(&self, request: &PushRequest) -> Result<PushAck>;
    async fn transaction_status(&self, reference: &str) -> Result<TransactionStatus>;
}

#[derive(Serialize)]
struct ProviderPushPayload<'a> {
    amount: u64,
    phone_number: &'a str,
    channel_id: u32,
    provider: &'a str,
    external_reference: &'a str,
    callback_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Deserialize)]
struct ProviderPushResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct ProviderStatusResponse {
    status: String,
}

/// HTTP client for the real provider. Built once, with a bounded timeout
/// and basic auth from server-held credentials.
pub struct HttpGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TaskPayError::Payment(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PushGateway for HttpGateway {
    async fn initiate_push(&self, request: &PushRequest) -> Result<PushAck> {
        let url = format!("{}/payments", self.config.base_url);
        let payload = ProviderPushPayload {
            amount: request.amount_kes,
            phone_number: &request.phone,
            channel_id: self.config.channel_id,
            provider: &self.config.provider,
            external_reference: &request.reference,
            callback_url: &self.config.callback_url,
            description: request.description.as_deref(),
        };

        info!(
            reference = %request.reference,
            amount_kes = request.amount_kes,
            "📲 Initiating push payment"
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.api_username, Some(&self.config.api_password))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TaskPayError::Payment(format!("Provider unreachable: {}", e)))?;

        let http_status = response.status();
        let body: ProviderPushResponse = response
            .json()
            .await
            .map_err(|e| TaskPayError::Payment(format!("Malformed provider response: {}", e)))?;

        let queued = body.status.as_deref() == Some("QUEUED") || body.success == Some(true);
        if !http_status.is_success() || !queued {
            let message = body
                .error_message
                .unwrap_or_else(|| "Push initiation failed".to_string());
            warn!(reference = %request.reference, message = %message, "Push rejected by provider");
            return Err(TaskPayError::Payment(message));
        }

        Ok(PushAck {
            success: true,
            provider_reference: body.reference,
            message: Some("Push payment initiated".to_string()),
        })
    }

    async fn transaction_status(&self, reference: &str) -> Result<TransactionStatus> {
        let url = format!("{}/transaction-status", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("reference", reference)])
            .basic_auth(&self.config.api_username, Some(&self.config.api_password))
            .send()
            .await
            .map_err(|e| TaskPayError::Payment(format!("Provider unreachable: {}", e)))?;

        let body: ProviderStatusResponse = response
            .json()
            .await
            .map_err(|e| TaskPayError::Payment(format!("Malformed status response: {}", e)))?;

        let status = match body.status.as_str() {
            "SUCCESS" => TransactionStatus::Success,
            "FAILED" => TransactionStatus::Failed,
            "CANCELLED" => TransactionStatus::Cancelled,
            _ => TransactionStatus::Queued,
        };
        debug!(reference, ?status, "Transaction status polled");
        Ok(status)
    }
}
