//! Health alert models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health rule that produced an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRule {
    BacklogHigh,
    ErrorRateHigh,
    StaleDetected,
}

impl AlertRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BacklogHigh => "backlog_high",
            Self::ErrorRateHigh => "error_rate_high",
            Self::StaleDetected => "stale_detected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "backlog_high" => Some(Self::BacklogHigh),
            "error_rate_high" => Some(Self::ErrorRateHigh),
            "stale_detected" => Some(Self::StaleDetected),
            _ => None,
        }
    }

    /// Severity each rule is emitted with.
    pub fn severity(&self) -> AlertSeverity {
        match self {
            Self::BacklogHigh | Self::StaleDetected => AlertSeverity::Warning,
            Self::ErrorRateHigh => AlertSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Error,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Outcome of webhook delivery for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Pending,
    Sent,
    Failed,
    Skipped,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// A stored alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub rule: AlertRule,
    pub severity: AlertSeverity,
    pub message: String,
    pub payload: serde_json::Value,
    pub webhook_status: WebhookStatus,
    pub webhook_attempts: u32,
    pub webhook_last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for inserting an alert row.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub rule: AlertRule,
    pub severity: AlertSeverity,
    pub message: String,
    pub payload: serde_json::Value,
    pub webhook_status: WebhookStatus,
    pub created_at: DateTime<Utc>,
}

impl NewAlert {
    pub fn new(rule: AlertRule, message: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            rule,
            severity: rule.severity(),
            message: message.into(),
            payload,
            webhook_status: WebhookStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Filters for paging through alerts, newest first.
#[derive(Debug, Clone)]
pub struct AlertQuery {
    pub page: usize,
    pub page_size: usize,
    pub severity: Option<AlertSeverity>,
    pub rule: Option<AlertRule>,
}

impl Default for AlertQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            severity: None,
            rule: None,
        }
    }
}
