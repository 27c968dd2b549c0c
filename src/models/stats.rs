//! Aggregate queue and outcome statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of the task queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub running: u64,
    pub retrying: u64,
    /// Tasks in `success` or `partial`.
    pub done: u64,
    /// Tasks in `error`.
    pub failed: u64,
    /// pending + running + retrying.
    pub backlog: u64,
    /// Age of the oldest active task by `created_at`, if any.
    pub oldest_active_age_sec: Option<i64>,
}

/// Per-provider outcome counts inside a metrics window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub total: u64,
    pub success: u64,
    pub partial: u64,
    pub error: u64,
}

/// Outcome counts over a trailing window of hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub hours: u32,
    /// Every task touched in the window, whatever its status.
    pub total: u64,
    pub success: u64,
    pub partial: u64,
    pub error: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub by_provider: BTreeMap<String, ProviderMetrics>,
    pub by_error_code: BTreeMap<String, u64>,
}

impl TaskMetrics {
    /// Fill in the derived rates from the counts.
    pub fn finalize_rates(&mut self) {
        if self.total == 0 {
            self.success_rate = 0.0;
            self.error_rate = 0.0;
        } else {
            self.success_rate = self.success as f64 / self.total as f64;
            self.error_rate = self.error as f64 / self.total as f64;
        }
    }
}
