//! Task CRUD, idempotency lookups and recovery sweeps.

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, TransactionBehavior};
use tracing::{debug, warn};

use super::helpers::{placeholders, row_to_task};
use super::{Patch, Result, TaskStore, TaskUpdate};
use crate::error::ErrorCode;
use crate::models::{NewTask, Task, TaskStatus};
use crate::repository::fmt_ts;

fn opt_ts(dt: Option<DateTime<Utc>>) -> Value {
    dt.map(|d| Value::Text(fmt_ts(d))).unwrap_or(Value::Null)
}

fn opt_text(s: Option<String>) -> Value {
    s.map(Value::Text).unwrap_or(Value::Null)
}

fn status_values(statuses: &[TaskStatus]) -> Vec<Value> {
    statuses
        .iter()
        .map(|s| Value::Text(s.as_str().to_string()))
        .collect()
}

impl TaskStore {
    /// Insert a task, replacing any row with the same `task_id`.
    pub fn create_task(&self, task: NewTask) -> Result<Task> {
        let now = fmt_ts(Utc::now());
        let payload = serde_json::to_string(&task.request_payload)?;
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO scraper_tasks (
                task_id, status, message, report, provider,
                created_at, updated_at, started_at, finished_at, error_code,
                retry_count, max_retries, next_retry_at, last_error,
                request_fingerprint, request_payload,
                progress_completed, progress_total
            ) VALUES (?, ?, ?, NULL, ?, ?, ?, ?, NULL, ?, ?, ?, ?, ?, ?, ?, 0, 0)
            "#,
            params![
                task.task_id,
                task.status.as_str(),
                task.message,
                task.provider,
                now,
                now,
                task.started_at.map(fmt_ts),
                task.error_code.map(|c| c.as_str()),
                task.retry_count,
                task.max_retries,
                task.next_retry_at.map(fmt_ts),
                task.last_error,
                task.request_fingerprint,
                payload,
            ],
        )?;

        let created = conn.query_row(
            "SELECT * FROM scraper_tasks WHERE task_id = ?",
            params![task.task_id],
            row_to_task,
        )?;
        debug!("Created task {} ({})", created.task_id, created.provider);
        Ok(created)
    }

    /// Apply a partial update. Returns `false` when the task no longer exists
    /// or is already terminal and the update tries to change its status.
    pub fn update_task(&self, task_id: &str, update: TaskUpdate) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = tx
            .query_row(
                "SELECT * FROM scraper_tasks WHERE task_id = ?",
                params![task_id],
                row_to_task,
            )
            .optional()?;
        let Some(current) = current else {
            debug!("update_task: {} vanished, ignoring", task_id);
            return Ok(false);
        };

        if current.status.is_terminal() && update.status.is_some_and(|s| s != current.status) {
            warn!(
                "Refusing to move terminal task {} from {} to {:?}",
                task_id,
                current.status.as_str(),
                update.status.map(|s| s.as_str())
            );
            return Ok(false);
        }

        let now = Utc::now();
        let mut sets: Vec<&str> = vec!["updated_at = ?"];
        let mut values: Vec<Value> = vec![Value::Text(fmt_ts(now))];

        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(message) = update.message {
            sets.push("message = ?");
            values.push(Value::Text(message));
        }
        if let Some(report) = update.report {
            sets.push("report = ?");
            values.push(Value::Text(serde_json::to_string(&report)?));
        }
        if !update.error_code.is_unchanged() {
            sets.push("error_code = ?");
            let code = update.error_code.apply(None);
            values.push(opt_text(code.map(|c| c.as_str().to_string())));
        }
        if let Some(retry_count) = update.retry_count {
            sets.push("retry_count = ?");
            values.push(Value::Integer(retry_count as i64));
        }
        if let Some(max_retries) = update.max_retries {
            sets.push("max_retries = ?");
            values.push(Value::Integer(max_retries as i64));
        }
        if !update.last_error.is_unchanged() {
            sets.push("last_error = ?");
            values.push(opt_text(update.last_error.apply(None)));
        }
        if !update.started_at.is_unchanged() {
            sets.push("started_at = ?");
            values.push(opt_ts(update.started_at.apply(None)));
        }

        let next_retry_at = if update.finished {
            Patch::Clear
        } else {
            update.next_retry_at
        };
        if !next_retry_at.is_unchanged() {
            sets.push("next_retry_at = ?");
            values.push(opt_ts(next_retry_at.apply(None)));
        }
        if update.finished {
            sets.push("finished_at = ?");
            values.push(Value::Text(fmt_ts(now)));
        }

        values.push(Value::Text(task_id.to_string()));
        let sql = format!(
            "UPDATE scraper_tasks SET {} WHERE task_id = ?",
            sets.join(", ")
        );
        tx.execute(&sql, params_from_iter(values.iter()))?;
        tx.commit()?;
        Ok(true)
    }

    /// Record per-attempt progress. Also refreshes `updated_at`.
    pub fn update_progress(&self, task_id: &str, completed: u32, total: u32) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            r#"
            UPDATE scraper_tasks
            SET progress_completed = ?, progress_total = ?, updated_at = ?
            WHERE task_id = ?
            "#,
            params![completed, total, fmt_ts(Utc::now()), task_id],
        )?;
        Ok(changed > 0)
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let task = conn
            .query_row(
                "SELECT * FROM scraper_tasks WHERE task_id = ?",
                params![task_id],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    /// Most recently created tasks, optionally filtered by status.
    pub fn list_tasks(&self, limit: usize, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let tasks = match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM scraper_tasks WHERE status = ? ORDER BY created_at DESC LIMIT ?",
                )?;
                let rows = stmt.query_map(params![status.as_str(), limit as i64], row_to_task)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT * FROM scraper_tasks ORDER BY created_at DESC LIMIT ?")?;
                let rows = stmt.query_map(params![limit as i64], row_to_task)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(tasks)
    }

    /// Most recent task with this fingerprint, in one of `statuses`, updated
    /// within the last `within_minutes`.
    pub fn find_active_by_fingerprint(
        &self,
        fingerprint: &str,
        within_minutes: i64,
        statuses: &[TaskStatus],
    ) -> Result<Option<Task>> {
        if statuses.is_empty() {
            return Ok(None);
        }
        let cutoff = fmt_ts(Utc::now() - Duration::minutes(within_minutes));
        let sql = format!(
            r#"
            SELECT * FROM scraper_tasks
            WHERE request_fingerprint = ?
            AND updated_at >= ?
            AND status IN ({})
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
            placeholders(statuses.len())
        );

        let mut values = vec![
            Value::Text(fingerprint.to_string()),
            Value::Text(cutoff),
        ];
        values.extend(status_values(statuses));

        let conn = self.lock()?;
        let task = conn
            .query_row(&sql, params_from_iter(values.iter()), row_to_task)
            .optional()?;
        Ok(task)
    }

    /// Move tasks in `statuses` whose `updated_at` predates `stale_before` to
    /// terminal `error` with the given code. Returns the number of tasks moved.
    pub fn mark_stale_tasks(
        &self,
        stale_before: DateTime<Utc>,
        message: &str,
        error_code: ErrorCode,
        statuses: &[TaskStatus],
    ) -> Result<usize> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let now = fmt_ts(Utc::now());
        let sql = format!(
            r#"
            UPDATE scraper_tasks
            SET status = 'error', message = ?, error_code = ?, last_error = ?,
                finished_at = ?, updated_at = ?, next_retry_at = NULL
            WHERE updated_at < ?
            AND status IN ({})
            "#,
            placeholders(statuses.len())
        );

        let mut values = vec![
            Value::Text(message.to_string()),
            Value::Text(error_code.as_str().to_string()),
            Value::Text(message.to_string()),
            Value::Text(now.clone()),
            Value::Text(now),
            Value::Text(fmt_ts(stale_before)),
        ];
        values.extend(status_values(statuses));

        let conn = self.lock()?;
        let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(changed)
    }

    /// Delete terminal tasks that finished more than `days` ago.
    pub fn prune_completed(&self, days: i64) -> Result<usize> {
        let cutoff = fmt_ts(Utc::now() - Duration::days(days));
        let sql = format!(
            r#"
            DELETE FROM scraper_tasks
            WHERE COALESCE(finished_at, updated_at) < ?
            AND status IN ({})
            "#,
            placeholders(TaskStatus::TERMINAL.len())
        );
        let mut values = vec![Value::Text(cutoff)];
        values.extend(status_values(&TaskStatus::TERMINAL));

        let conn = self.lock()?;
        let deleted = conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (TaskStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = TaskStore::open(&dir.path().join("tasks.db")).unwrap();
        (store, dir)
    }

    fn new_task(id: &str) -> NewTask {
        NewTask::pending(id, serde_json::json!({"base_url": "https://x.test"}), "generic", 2)
    }

    #[test]
    fn test_create_and_get() {
        let (store, _dir) = store();
        let created = store.create_task(new_task("t1").with_fingerprint("fp")).unwrap();
        assert_eq!(created.status, TaskStatus::Pending);
        assert_eq!(created.max_retries, 2);

        let fetched = store.get_task("t1").unwrap().unwrap();
        assert_eq!(fetched.request_fingerprint.as_deref(), Some("fp"));
        assert_eq!(fetched.request_payload["base_url"], "https://x.test");
        assert!(store.get_task("missing").unwrap().is_none());
    }

    #[test]
    fn test_create_replaces_existing_row() {
        let (store, _dir) = store();
        store.create_task(new_task("t1")).unwrap();
        store
            .create_task(new_task("t1").with_message("second"))
            .unwrap();
        let tasks = store.list_tasks(10, None).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].message, "second");
    }

    #[test]
    fn test_update_missing_task_is_noop() {
        let (store, _dir) = store();
        let updated = store
            .update_task("nope", TaskUpdate::status(TaskStatus::Running, "go"))
            .unwrap();
        assert!(!updated);
    }

    #[test]
    fn test_finished_sets_finished_at_and_clears_retry() {
        let (store, _dir) = store();
        store.create_task(new_task("t1")).unwrap();
        store
            .update_task(
                "t1",
                TaskUpdate::status(TaskStatus::Retrying, "again").next_retry_at(Utc::now()),
            )
            .unwrap();
        store
            .update_task(
                "t1",
                TaskUpdate::status(TaskStatus::Success, "done")
                    .next_retry_at(Utc::now())
                    .finished(),
            )
            .unwrap();

        let task = store.get_task("t1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert!(task.finished_at.is_some());
        assert!(task.next_retry_at.is_none());
    }

    #[test]
    fn test_terminal_status_is_not_overwritten() {
        let (store, _dir) = store();
        store.create_task(new_task("t1")).unwrap();
        store
            .update_task("t1", TaskUpdate::status(TaskStatus::Partial, "some").finished())
            .unwrap();
        let moved = store
            .update_task("t1", TaskUpdate::status(TaskStatus::Running, "restart"))
            .unwrap();
        assert!(!moved);
        assert_eq!(
            store.get_task("t1").unwrap().unwrap().status,
            TaskStatus::Partial
        );
    }

    #[test]
    fn test_progress_updates() {
        let (store, _dir) = store();
        store.create_task(new_task("t1")).unwrap();
        assert!(store.update_progress("t1", 3, 10).unwrap());
        let task = store.get_task("t1").unwrap().unwrap();
        assert_eq!((task.progress_completed, task.progress_total), (3, 10));
        assert!(!store.update_progress("ghost", 1, 1).unwrap());
    }

    #[test]
    fn test_list_filters_by_status() {
        let (store, _dir) = store();
        store.create_task(new_task("a")).unwrap();
        store.create_task(new_task("b")).unwrap();
        store
            .update_task("b", TaskUpdate::status(TaskStatus::Running, "go"))
            .unwrap();

        let running = store.list_tasks(10, Some(TaskStatus::Running)).unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].task_id, "b");
        assert_eq!(store.list_tasks(1, None).unwrap().len(), 1);
    }
}
