//! Queue snapshots and windowed outcome metrics.

use chrono::{Duration, Utc};
use rusqlite::params;

use super::{Result, TaskStore};
use crate::models::{QueueStats, TaskMetrics, TaskStatus};
use crate::repository::{fmt_ts, parse_datetime};

impl TaskStore {
    /// Current counts per status bucket.
    pub fn queue_stats(&self) -> Result<QueueStats> {
        let conn = self.lock()?;
        let mut stats = QueueStats::default();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM scraper_tasks GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            let count = count.max(0) as u64;
            match TaskStatus::from_str(&status) {
                Some(TaskStatus::Pending) => stats.pending += count,
                Some(TaskStatus::Running) => stats.running += count,
                Some(TaskStatus::Retrying) => stats.retrying += count,
                Some(TaskStatus::Success) | Some(TaskStatus::Partial) => stats.done += count,
                Some(TaskStatus::Error) => stats.failed += count,
                None => {}
            }
        }
        stats.backlog = stats.pending + stats.running + stats.retrying;

        let oldest: Option<String> = conn.query_row(
            r#"
            SELECT MIN(created_at) FROM scraper_tasks
            WHERE status IN ('pending', 'running', 'retrying')
            "#,
            [],
            |row| row.get(0),
        )?;
        stats.oldest_active_age_sec = oldest.map(|ts| {
            (Utc::now() - parse_datetime(&ts)).num_seconds().max(0)
        });

        Ok(stats)
    }

    /// Outcome counts for tasks updated in the last `hours`.
    pub fn metrics(&self, hours: u32) -> Result<TaskMetrics> {
        let cutoff = fmt_ts(Utc::now() - Duration::hours(hours as i64));
        let conn = self.lock()?;

        let mut metrics = TaskMetrics {
            hours,
            ..Default::default()
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT provider, status, COUNT(*) FROM scraper_tasks
            WHERE updated_at >= ?
            GROUP BY provider, status
            "#,
        )?;
        let rows = stmt.query_map(params![cutoff], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for row in rows {
            let (provider, status, count) = row?;
            let count = count.max(0) as u64;
            let entry = metrics.by_provider.entry(provider).or_default();
            entry.total += count;
            metrics.total += count;
            match TaskStatus::from_str(&status) {
                Some(TaskStatus::Success) => {
                    entry.success += count;
                    metrics.success += count;
                }
                Some(TaskStatus::Partial) => {
                    entry.partial += count;
                    metrics.partial += count;
                }
                Some(TaskStatus::Error) => {
                    entry.error += count;
                    metrics.error += count;
                }
                _ => {}
            }
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT error_code, COUNT(*) FROM scraper_tasks
            WHERE updated_at >= ? AND error_code IS NOT NULL AND error_code != ''
            GROUP BY error_code
            "#,
        )?;
        let rows = stmt.query_map(params![cutoff], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (code, count) = row?;
            metrics.by_error_code.insert(code, count.max(0) as u64);
        }

        metrics.finalize_rates();
        Ok(metrics)
    }
}
