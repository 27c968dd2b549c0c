//! Row parsing helpers for the task store.

use crate::error::ErrorCode;
use crate::models::{Alert, AlertRule, AlertSeverity, Task, TaskReport, TaskStatus, WebhookStatus};
use crate::repository::{parse_datetime, parse_datetime_opt};

/// Parse a database row into a Task.
pub fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let report: Option<TaskReport> = row
        .get::<_, Option<String>>("report")?
        .and_then(|s| serde_json::from_str(&s).ok());
    let payload_str: String = row.get("request_payload")?;

    Ok(Task {
        task_id: row.get("task_id")?,
        status: TaskStatus::from_str(&row.get::<_, String>("status")?)
            .unwrap_or(TaskStatus::Error),
        message: row.get("message")?,
        report,
        provider: row.get("provider")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
        started_at: parse_datetime_opt(row.get("started_at")?),
        finished_at: parse_datetime_opt(row.get("finished_at")?),
        error_code: row
            .get::<_, Option<String>>("error_code")?
            .and_then(|s| ErrorCode::parse(&s)),
        retry_count: row.get::<_, i64>("retry_count")?.max(0) as u32,
        max_retries: row.get::<_, i64>("max_retries")?.max(0) as u32,
        next_retry_at: parse_datetime_opt(row.get("next_retry_at")?),
        last_error: row.get("last_error")?,
        request_fingerprint: row.get("request_fingerprint")?,
        request_payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        progress_completed: row.get::<_, i64>("progress_completed")?.max(0) as u32,
        progress_total: row.get::<_, i64>("progress_total")?.max(0) as u32,
    })
}

/// Parse a database row into an Alert.
pub fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
    let payload_str: String = row.get("payload")?;

    Ok(Alert {
        id: row.get("id")?,
        rule: AlertRule::from_str(&row.get::<_, String>("rule")?)
            .unwrap_or(AlertRule::BacklogHigh),
        severity: AlertSeverity::from_str(&row.get::<_, String>("severity")?)
            .unwrap_or(AlertSeverity::Warning),
        message: row.get("message")?,
        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        webhook_status: WebhookStatus::from_str(&row.get::<_, String>("webhook_status")?)
            .unwrap_or(WebhookStatus::Pending),
        webhook_attempts: row.get::<_, i64>("webhook_attempts")?.max(0) as u32,
        webhook_last_error: row.get("webhook_last_error")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}

/// `?, ?, ?` for an IN clause of `n` values.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
