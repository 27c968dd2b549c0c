//! Alert log operations.

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};

use super::helpers::row_to_alert;
use super::{Result, TaskStore};
use crate::models::{Alert, AlertQuery, AlertRule, AlertSeverity, NewAlert, WebhookStatus};
use crate::repository::fmt_ts;

impl TaskStore {
    pub fn append_alert(&self, alert: NewAlert) -> Result<Alert> {
        let created = fmt_ts(alert.created_at);
        let payload = serde_json::to_string(&alert.payload)?;
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO scraper_alerts (
                rule, severity, message, payload,
                webhook_status, webhook_attempts, webhook_last_error,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 0, NULL, ?, ?)
            "#,
            params![
                alert.rule.as_str(),
                alert.severity.as_str(),
                alert.message,
                payload,
                alert.webhook_status.as_str(),
                created,
                created,
            ],
        )?;
        let id = conn.last_insert_rowid();

        let stored = conn.query_row(
            "SELECT * FROM scraper_alerts WHERE id = ?",
            params![id],
            row_to_alert,
        )?;
        Ok(stored)
    }

    pub fn get_alert(&self, id: i64) -> Result<Option<Alert>> {
        let conn = self.lock()?;
        let alert = conn
            .query_row(
                "SELECT * FROM scraper_alerts WHERE id = ?",
                params![id],
                row_to_alert,
            )
            .optional()?;
        Ok(alert)
    }

    /// Record the final webhook delivery outcome.
    pub fn update_alert_webhook(
        &self,
        id: i64,
        status: WebhookStatus,
        attempts: u32,
        last_error: Option<&str>,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            r#"
            UPDATE scraper_alerts
            SET webhook_status = ?, webhook_attempts = ?, webhook_last_error = ?, updated_at = ?
            WHERE id = ?
            "#,
            params![
                status.as_str(),
                attempts,
                last_error,
                fmt_ts(Utc::now()),
                id
            ],
        )?;
        Ok(changed > 0)
    }

    /// Page through alerts, newest first. Returns the page and the total
    /// number of matching alerts.
    pub fn list_alerts(&self, query: &AlertQuery) -> Result<(Vec<Alert>, u64)> {
        let page = query.page.max(1);
        let page_size = query.page_size.clamp(1, 200);

        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(severity) = query.severity {
            clauses.push("severity = ?");
            values.push(Value::Text(severity.as_str().to_string()));
        }
        if let Some(rule) = query.rule {
            clauses.push("rule = ?");
            values.push(Value::Text(rule.as_str().to_string()));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let conn = self.lock()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM scraper_alerts {}", where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let mut page_values = values.clone();
        page_values.push(Value::Integer(page_size as i64));
        let offset = (page - 1)
            .checked_mul(page_size)
            .and_then(|offset| i64::try_from(offset).ok())
            .unwrap_or(i64::MAX);
        page_values.push(Value::Integer(offset));
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM scraper_alerts {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            where_sql
        ))?;
        let alerts = stmt
            .query_map(params_from_iter(page_values.iter()), row_to_alert)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((alerts, total.max(0) as u64))
    }

    /// Latest alert for `rule` (and `severity`, if given) created less than
    /// `cooldown_sec` ago.
    pub fn latest_alert_in_cooldown(
        &self,
        rule: AlertRule,
        cooldown_sec: u64,
        severity: Option<AlertSeverity>,
    ) -> Result<Option<Alert>> {
        self.latest_alert_in_cooldown_at(rule, cooldown_sec, severity, Utc::now())
    }

    /// Cooldown lookup evaluated at an explicit instant.
    pub fn latest_alert_in_cooldown_at(
        &self,
        rule: AlertRule,
        cooldown_sec: u64,
        severity: Option<AlertSeverity>,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let cutoff = fmt_ts(now - Duration::seconds(cooldown_sec as i64));
        let conn = self.lock()?;
        let alert = match severity {
            Some(severity) => conn
                .query_row(
                    r#"
                    SELECT * FROM scraper_alerts
                    WHERE rule = ? AND severity = ? AND created_at > ?
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                    "#,
                    params![rule.as_str(), severity.as_str(), cutoff],
                    row_to_alert,
                )
                .optional()?,
            None => conn
                .query_row(
                    r#"
                    SELECT * FROM scraper_alerts
                    WHERE rule = ? AND created_at > ?
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                    "#,
                    params![rule.as_str(), cutoff],
                    row_to_alert,
                )
                .optional()?,
        };
        Ok(alert)
    }
}
