//! Queue health alerting.
//!
//! `AlertEngine::evaluate` reads queue stats and the trailing 24h metrics,
//! emits an alert for each rule that holds and is out of cooldown, and
//! delivers it to the configured webhook. Delivery failures only affect the
//! alert's `webhook_status`; the alert row is always written.

mod rules;
mod scheduler;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

pub use rules::{check_rules, Triggered};
pub use scheduler::AlertScheduler;
pub use webhook::{deliver_with_retry, DeliveryOutcome, HttpWebhookSender, WebhookConfig, WebhookSender};

use crate::models::{Alert, NewAlert};
use crate::repository::{StoreError, TaskStore};

/// Metrics window the rules look at.
pub const METRICS_WINDOW_HOURS: u32 = 24;

/// Alert engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    pub poll_interval_sec: u64,
    pub cooldown_sec: u64,
    pub threshold_backlog: u64,
    pub threshold_error_rate: f64,
    pub threshold_min_sample: u64,
    pub webhook: WebhookConfig,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_sec: 30,
            cooldown_sec: 300,
            threshold_backlog: 30,
            threshold_error_rate: 0.25,
            threshold_min_sample: 20,
            webhook: WebhookConfig::default(),
        }
    }
}

impl AlertConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_sec.max(1))
    }
}

pub struct AlertEngine {
    store: Arc<TaskStore>,
    config: AlertConfig,
    sender: Arc<dyn WebhookSender>,
    backoff: Duration,
}

impl AlertEngine {
    pub fn new(store: Arc<TaskStore>, config: AlertConfig, sender: Arc<dyn WebhookSender>) -> Self {
        Self {
            store,
            config,
            sender,
            backoff: Duration::from_secs(1),
        }
    }

    /// Base delay of the webhook backoff.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub async fn evaluate(&self) -> Result<Vec<Alert>, StoreError> {
        self.evaluate_at(Utc::now()).await
    }

    /// Evaluate every rule as of `now`. Returns the alerts emitted.
    pub async fn evaluate_at(&self, now: DateTime<Utc>) -> Result<Vec<Alert>, StoreError> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }
        let stats = self.store.queue_stats()?;
        let metrics = self.store.metrics(METRICS_WINDOW_HOURS)?;

        let mut emitted = Vec::new();
        for triggered in check_rules(&self.config, &stats, &metrics) {
            let severity = triggered.rule.severity();
            if let Some(previous) = self.store.latest_alert_in_cooldown_at(
                triggered.rule,
                self.config.cooldown_sec,
                Some(severity),
                now,
            )? {
                debug!(
                    "{} in cooldown since alert {}",
                    triggered.rule.as_str(),
                    previous.id
                );
                continue;
            }

            let alert = self.store.append_alert(
                NewAlert::new(triggered.rule, triggered.message, triggered.payload).at(now),
            )?;
            info!("Alert {} [{}]: {}", alert.id, alert.rule.as_str(), alert.message);
            emitted.push(self.deliver(alert).await?);
        }
        Ok(emitted)
    }

    /// Deliver an alert and record the outcome on its row.
    async fn deliver(&self, alert: Alert) -> Result<Alert, StoreError> {
        let payload = json!({
            "event": "scraper_alert",
            "alert": {
                "id": alert.id,
                "rule": alert.rule,
                "severity": alert.severity,
                "message": alert.message,
                "payload": alert.payload,
                "created_at": alert.created_at,
            },
        });
        let outcome =
            deliver_with_retry(self.sender.as_ref(), &self.config.webhook, &payload, self.backoff).await;
        if outcome.status == crate::models::WebhookStatus::Failed {
            warn!(
                "Webhook for alert {} failed after {} attempts",
                alert.id, outcome.attempts
            );
        }
        self.store.update_alert_webhook(
            alert.id,
            outcome.status,
            outcome.attempts,
            outcome.last_error.as_deref(),
        )?;
        Ok(self.store.get_alert(alert.id)?.unwrap_or(alert))
    }

    /// Send a test payload to the configured webhook without storing an alert.
    pub async fn send_test_webhook(&self) -> DeliveryOutcome {
        let payload = json!({
            "event": "scraper_alert_test",
            "message": "test alert from manga-scraper",
            "sent_at": Utc::now(),
        });
        deliver_with_retry(self.sender.as_ref(), &self.config.webhook, &payload, self.backoff).await
    }
}
