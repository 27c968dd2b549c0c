//! Health rules evaluated against queue stats and windowed metrics.

use serde_json::json;

use super::AlertConfig;
use crate::error::ErrorCode;
use crate::models::{AlertRule, QueueStats, TaskMetrics};

/// A rule whose condition currently holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Triggered {
    pub rule: AlertRule,
    pub message: String,
    pub payload: serde_json::Value,
}

pub fn check_rules(config: &AlertConfig, stats: &QueueStats, metrics: &TaskMetrics) -> Vec<Triggered> {
    let mut triggered = Vec::new();

    if stats.backlog >= config.threshold_backlog {
        triggered.push(Triggered {
            rule: AlertRule::BacklogHigh,
            message: format!(
                "scraper backlog is {} (threshold {})",
                stats.backlog, config.threshold_backlog
            ),
            payload: json!({
                "backlog": stats.backlog,
                "pending": stats.pending,
                "running": stats.running,
                "retrying": stats.retrying,
                "oldest_active_age_sec": stats.oldest_active_age_sec,
                "threshold": config.threshold_backlog,
            }),
        });
    }

    if metrics.total >= config.threshold_min_sample && metrics.error_rate >= config.threshold_error_rate {
        triggered.push(Triggered {
            rule: AlertRule::ErrorRateHigh,
            message: format!(
                "scraper error rate {:.1}% over {} tasks in {}h (threshold {:.1}%)",
                metrics.error_rate * 100.0,
                metrics.total,
                metrics.hours,
                config.threshold_error_rate * 100.0
            ),
            payload: json!({
                "total": metrics.total,
                "error": metrics.error,
                "error_rate": metrics.error_rate,
                "hours": metrics.hours,
                "threshold": config.threshold_error_rate,
                "min_sample": config.threshold_min_sample,
                "by_error_code": metrics.by_error_code,
            }),
        });
    }

    let stale = metrics
        .by_error_code
        .get(ErrorCode::TaskStale.as_str())
        .copied()
        .unwrap_or(0);
    if stale > 0 {
        triggered.push(Triggered {
            rule: AlertRule::StaleDetected,
            message: format!("{} stale scraper tasks recovered in {}h", stale, metrics.hours),
            payload: json!({ "stale": stale, "hours": metrics.hours }),
        });
    }

    triggered
}
