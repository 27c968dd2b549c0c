//! Download task models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Lifecycle state of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Retrying,
    Success,
    Partial,
    Error,
}

impl TaskStatus {
    /// Statuses that still count toward the backlog.
    pub const ACTIVE: [TaskStatus; 3] = [Self::Pending, Self::Running, Self::Retrying];

    /// Statuses from which no further automatic transition occurs.
    pub const TERMINAL: [TaskStatus; 3] = [Self::Success, Self::Partial, Self::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "retrying" => Some(Self::Retrying),
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Compatibility status exposed to older clients.
    pub fn queue_status(&self) -> &'static str {
        match self {
            Self::Pending => "queued",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Success | Self::Partial => "done",
            Self::Error => "failed",
        }
    }
}

/// Structured result of a finished (or retrying) attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub success_count: usize,
    pub failed_count: usize,
    pub total: usize,
    pub output_dir: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A persisted download task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
    pub report: Option<TaskReport>,
    pub provider: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_code: Option<ErrorCode>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub request_fingerprint: Option<String>,
    pub request_payload: serde_json::Value,
    pub progress_completed: u32,
    pub progress_total: u32,
}

/// Values for inserting a task row.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
    pub request_payload: serde_json::Value,
    pub provider: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub request_fingerprint: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub error_code: Option<ErrorCode>,
}

impl NewTask {
    /// A freshly submitted task waiting to run.
    pub fn pending(
        task_id: impl Into<String>,
        request_payload: serde_json::Value,
        provider: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            message: "queued".to_string(),
            request_payload,
            provider: provider.into(),
            retry_count: 0,
            max_retries,
            next_retry_at: None,
            last_error: None,
            request_fingerprint: None,
            started_at: None,
            error_code: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.request_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}
