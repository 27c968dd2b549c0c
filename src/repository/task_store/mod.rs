//! Durable task ledger and alert log.
//!
//! A single connection guarded by a mutex. Every public method takes the lock
//! for the duration of one statement or transaction and never across an
//! `.await`, so it is safe to call from async code.

mod alerts;
mod helpers;
mod schema;
mod stats;
mod tasks;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::{Patch, Result, StoreError};
use crate::error::ErrorCode;
use crate::models::{TaskReport, TaskStatus};

/// SQLite-backed store for scraper tasks and alerts.
pub struct TaskStore {
    db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl TaskStore {
    /// Open (or create) the store, migrating the schema if needed.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = super::connect(db_path)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            db_path: db_path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Partial update for a task row.
///
/// `Option` fields leave the column alone when `None`. `Patch` fields can
/// also clear the column.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub message: Option<String>,
    pub report: Option<TaskReport>,
    pub error_code: Patch<ErrorCode>,
    /// Stamp `finished_at` and clear `next_retry_at`.
    pub finished: bool,
    pub retry_count: Option<u32>,
    pub max_retries: Option<u32>,
    pub next_retry_at: Patch<DateTime<Utc>>,
    pub last_error: Patch<String>,
    pub started_at: Patch<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn report(mut self, report: TaskReport) -> Self {
        self.report = Some(report);
        self
    }

    pub fn error_code(mut self, code: impl Into<Patch<ErrorCode>>) -> Self {
        self.error_code = code.into();
        self
    }

    pub fn finished(mut self) -> Self {
        self.finished = true;
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    pub fn next_retry_at(mut self, at: impl Into<Patch<DateTime<Utc>>>) -> Self {
        self.next_retry_at = at.into();
        self
    }

    pub fn last_error(mut self, error: impl Into<Patch<String>>) -> Self {
        self.last_error = error.into();
        self
    }

    pub fn started_at(mut self, at: impl Into<Patch<DateTime<Utc>>>) -> Self {
        self.started_at = at.into();
        self
    }
}
