//! Table creation and additive column migration.

use std::collections::HashSet;

use rusqlite::Connection;
use tracing::info;

use super::Result;

/// Columns every `scraper_tasks` row must have, with their DDL.
///
/// Older databases are brought forward by adding whatever is missing. Columns
/// are never dropped or retyped.
const TASK_COLUMNS: &[(&str, &str)] = &[
    ("status", "TEXT NOT NULL DEFAULT 'pending'"),
    ("message", "TEXT NOT NULL DEFAULT ''"),
    ("report", "TEXT"),
    ("provider", "TEXT NOT NULL DEFAULT ''"),
    ("created_at", "TEXT NOT NULL DEFAULT ''"),
    ("updated_at", "TEXT NOT NULL DEFAULT ''"),
    ("started_at", "TEXT"),
    ("finished_at", "TEXT"),
    ("error_code", "TEXT"),
    ("retry_count", "INTEGER NOT NULL DEFAULT 0"),
    ("max_retries", "INTEGER NOT NULL DEFAULT 0"),
    ("next_retry_at", "TEXT"),
    ("last_error", "TEXT"),
    ("request_fingerprint", "TEXT"),
    ("request_payload", "TEXT NOT NULL DEFAULT '{}'"),
    ("progress_completed", "INTEGER NOT NULL DEFAULT 0"),
    ("progress_total", "INTEGER NOT NULL DEFAULT 0"),
];

const ALERT_COLUMNS: &[(&str, &str)] = &[
    ("rule", "TEXT NOT NULL DEFAULT ''"),
    ("severity", "TEXT NOT NULL DEFAULT 'warning'"),
    ("message", "TEXT NOT NULL DEFAULT ''"),
    ("payload", "TEXT NOT NULL DEFAULT '{}'"),
    ("webhook_status", "TEXT NOT NULL DEFAULT 'pending'"),
    ("webhook_attempts", "INTEGER NOT NULL DEFAULT 0"),
    ("webhook_last_error", "TEXT"),
    ("created_at", "TEXT NOT NULL DEFAULT ''"),
    ("updated_at", "TEXT NOT NULL DEFAULT ''"),
];

pub(super) fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS scraper_tasks (
            task_id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'pending',
            message TEXT NOT NULL DEFAULT '',
            report TEXT,
            provider TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL DEFAULT '',
            started_at TEXT,
            finished_at TEXT,
            error_code TEXT,

            -- Retry bookkeeping
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 0,
            next_retry_at TEXT,
            last_error TEXT,

            -- Idempotency
            request_fingerprint TEXT,
            request_payload TEXT NOT NULL DEFAULT '{}',

            -- Progress of the current attempt
            progress_completed INTEGER NOT NULL DEFAULT 0,
            progress_total INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS scraper_alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule TEXT NOT NULL DEFAULT '',
            severity TEXT NOT NULL DEFAULT 'warning',
            message TEXT NOT NULL DEFAULT '',
            payload TEXT NOT NULL DEFAULT '{}',
            webhook_status TEXT NOT NULL DEFAULT 'pending',
            webhook_attempts INTEGER NOT NULL DEFAULT 0,
            webhook_last_error TEXT,
            created_at TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL DEFAULT ''
        );
    "#,
    )?;

    add_missing_columns(conn, "scraper_tasks", TASK_COLUMNS)?;
    add_missing_columns(conn, "scraper_alerts", ALERT_COLUMNS)?;

    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_scraper_tasks_status_updated
            ON scraper_tasks(status, updated_at);
        CREATE INDEX IF NOT EXISTS idx_scraper_tasks_fingerprint
            ON scraper_tasks(request_fingerprint, updated_at);
        CREATE INDEX IF NOT EXISTS idx_scraper_tasks_updated
            ON scraper_tasks(updated_at);
        CREATE INDEX IF NOT EXISTS idx_scraper_alerts_rule_created
            ON scraper_alerts(rule, severity, created_at);
    "#,
    )?;
    Ok(())
}

fn existing_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(names)
}

fn add_missing_columns(conn: &Connection, table: &str, columns: &[(&str, &str)]) -> Result<()> {
    let existing = existing_columns(conn, table)?;
    for (name, ddl) in columns {
        if !existing.contains(*name) {
            info!("Migrating {}: adding column {}", table, name);
            conn.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, ddl),
                [],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adds_missing_columns_to_legacy_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE scraper_tasks (
                task_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            INSERT INTO scraper_tasks (task_id, status, message, created_at, updated_at)
            VALUES ('old', 'success', 'done', '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z');",
        )
        .unwrap();

        init_schema(&conn).unwrap();

        let cols = existing_columns(&conn, "scraper_tasks").unwrap();
        for (name, _) in TASK_COLUMNS {
            assert!(cols.contains(*name), "missing column {}", name);
        }

        let (status, retries): (String, i64) = conn
            .query_row(
                "SELECT status, retry_count FROM scraper_tasks WHERE task_id = 'old'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "success");
        assert_eq!(retries, 0);
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }
}
