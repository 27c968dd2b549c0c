//! Webhook delivery with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ScraperError;
use crate::models::WebhookStatus;

/// Webhook settings from the alert configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub timeout_sec: u64,
    /// Total delivery attempts.
    pub max_retries: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            timeout_sec: 5,
            max_retries: 3,
        }
    }
}

impl WebhookConfig {
    /// Target URL when delivery is enabled and configured.
    pub fn target(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Posts a JSON payload to a URL.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, url: &str, payload: &serde_json::Value) -> Result<(), ScraperError>;
}

/// reqwest-backed sender.
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new() -> Result<Self, ScraperError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::scrapers::http_client::USER_AGENT)
            .build()
            .map_err(|e| ScraperError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, url: &str, payload: &serde_json::Value) -> Result<(), ScraperError> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

/// Final state of a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub status: WebhookStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl DeliveryOutcome {
    pub fn skipped() -> Self {
        Self {
            status: WebhookStatus::Skipped,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Deliver `payload`, waiting `backoff`, `2 * backoff`, `4 * backoff`, ...
/// between attempts. Each attempt is bounded by the configured timeout.
pub async fn deliver_with_retry(
    sender: &dyn WebhookSender,
    config: &WebhookConfig,
    payload: &serde_json::Value,
    backoff: Duration,
) -> DeliveryOutcome {
    let Some(url) = config.target() else {
        return DeliveryOutcome::skipped();
    };

    let max_attempts = config.max_retries.max(1);
    let timeout = Duration::from_secs(config.timeout_sec.max(1));
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        let result = match tokio::time::timeout(timeout, sender.send(url, payload)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", timeout)),
        };
        match result {
            Ok(()) => {
                debug!("Webhook delivered on attempt {}", attempt);
                return DeliveryOutcome {
                    status: WebhookStatus::Sent,
                    attempts: attempt,
                    last_error: None,
                };
            }
            Err(e) => {
                warn!("Webhook attempt {}/{} failed: {}", attempt, max_attempts, e);
                last_error = Some(e);
            }
        }
        if attempt < max_attempts {
            tokio::time::sleep(backoff * 2u32.saturating_pow(attempt - 1)).await;
        }
    }

    DeliveryOutcome {
        status: WebhookStatus::Failed,
        attempts: max_attempts,
        last_error,
    }
}
