mod common;

use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use common::open_store;
use manga_scraper::error::ErrorCode;
use manga_scraper::models::{NewTask, TaskStatus};
use manga_scraper::repository::{Patch, TaskUpdate};

fn pending(id: &str, provider: &str) -> NewTask {
    NewTask::pending(id, json!({ "chapter": id }), provider, 2)
}

fn finish(status: TaskStatus) -> TaskUpdate {
    TaskUpdate::status(status, status.as_str()).finished()
}

#[test]
fn test_queue_stats_buckets() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    for (id, status) in [
        ("a", None),
        ("b", None),
        ("c", Some(TaskStatus::Running)),
        ("d", Some(TaskStatus::Retrying)),
        ("e", Some(TaskStatus::Success)),
        ("f", Some(TaskStatus::Partial)),
        ("g", Some(TaskStatus::Error)),
    ] {
        store.create_task(pending(id, "toongod")).unwrap();
        if let Some(status) = status {
            store
                .update_task(id, TaskUpdate::status(status, status.as_str()))
                .unwrap();
        }
    }

    let stats = store.queue_stats().unwrap();
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.retrying, 1);
    assert_eq!(stats.done, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.backlog, 4);
    assert!(stats.oldest_active_age_sec.is_some());
}

#[test]
fn test_empty_queue_has_no_oldest_age() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let stats = store.queue_stats().unwrap();
    assert_eq!(stats.backlog, 0);
    assert!(stats.oldest_active_age_sec.is_none());
}

#[test]
fn test_metrics_by_provider_and_code() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    store.create_task(pending("ok1", "toongod")).unwrap();
    store.update_task("ok1", finish(TaskStatus::Success)).unwrap();
    store.create_task(pending("part", "toongod")).unwrap();
    store.update_task("part", finish(TaskStatus::Partial)).unwrap();
    store.create_task(pending("bad1", "mangaforfree")).unwrap();
    store
        .update_task(
            "bad1",
            finish(TaskStatus::Error).error_code(ErrorCode::AuthChallenge),
        )
        .unwrap();
    store.create_task(pending("bad2", "mangaforfree")).unwrap();
    store
        .update_task(
            "bad2",
            finish(TaskStatus::Error).error_code(ErrorCode::AuthChallenge),
        )
        .unwrap();

    let metrics = store.metrics(24).unwrap();
    assert_eq!(metrics.hours, 24);
    assert_eq!(metrics.total, 4);
    assert_eq!(metrics.success, 1);
    assert_eq!(metrics.partial, 1);
    assert_eq!(metrics.error, 2);
    assert!((metrics.error_rate - 0.5).abs() < f64::EPSILON);
    assert!((metrics.success_rate - 0.25).abs() < f64::EPSILON);

    let toongod = &metrics.by_provider["toongod"];
    assert_eq!((toongod.total, toongod.success, toongod.partial), (2, 1, 1));
    assert_eq!(metrics.by_provider["mangaforfree"].error, 2);
    assert_eq!(metrics.by_error_code.get("SCRAPER_AUTH_CHALLENGE"), Some(&2));
}

#[test]
fn test_fingerprint_lookup_ignores_terminal_tasks() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store
        .create_task(pending("t1", "toongod").with_fingerprint("fp"))
        .unwrap();

    let found = store
        .find_active_by_fingerprint("fp", 30, &TaskStatus::ACTIVE)
        .unwrap();
    assert_eq!(found.map(|t| t.task_id), Some("t1".to_string()));
    assert!(store
        .find_active_by_fingerprint("other", 30, &TaskStatus::ACTIVE)
        .unwrap()
        .is_none());

    store.update_task("t1", finish(TaskStatus::Success)).unwrap();
    assert!(store
        .find_active_by_fingerprint("fp", 30, &TaskStatus::ACTIVE)
        .unwrap()
        .is_none());
}

#[test]
fn test_partial_update_leaves_other_fields() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create_task(pending("t1", "toongod")).unwrap();
    store
        .update_task(
            "t1",
            TaskUpdate::status(TaskStatus::Retrying, "retry 1/2")
                .retry_count(1)
                .last_error("503"),
        )
        .unwrap();

    // Status-only update keeps the retry fields.
    store
        .update_task("t1", TaskUpdate::status(TaskStatus::Running, "again"))
        .unwrap();
    let task = store.get_task("t1").unwrap().unwrap();
    assert_eq!(task.retry_count, 1);
    assert_eq!(task.last_error.as_deref(), Some("503"));

    // An explicit clear removes the value.
    store
        .update_task(
            "t1",
            TaskUpdate::status(TaskStatus::Running, "again").last_error(Patch::<String>::Clear),
        )
        .unwrap();
    let task = store.get_task("t1").unwrap().unwrap();
    assert!(task.last_error.is_none());
    assert_eq!(task.retry_count, 1);
}

#[test]
fn test_partial_update_keeps_next_retry_at() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create_task(pending("t1", "toongod")).unwrap();

    let retry_at = chrono::Utc::now() + chrono::Duration::seconds(15);
    store
        .update_task(
            "t1",
            TaskUpdate::status(TaskStatus::Retrying, "retry 1/2").next_retry_at(retry_at),
        )
        .unwrap();

    store
        .update_task("t1", TaskUpdate::status(TaskStatus::Retrying, "still waiting"))
        .unwrap();
    let task = store.get_task("t1").unwrap().unwrap();
    assert_eq!(
        task.next_retry_at.map(|at| at.timestamp_micros()),
        Some(retry_at.timestamp_micros())
    );

    store
        .update_task(
            "t1",
            TaskUpdate::status(TaskStatus::Running, "again")
                .next_retry_at(Patch::<chrono::DateTime<chrono::Utc>>::Clear),
        )
        .unwrap();
    assert!(store.get_task("t1").unwrap().unwrap().next_retry_at.is_none());
}

#[test]
fn test_tasks_survive_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = open_store(dir.path());
        store.create_task(pending("t1", "toongod")).unwrap();
        store.update_progress("t1", 2, 5).unwrap();
    }
    let store = open_store(dir.path());
    let task = store.get_task("t1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!((task.progress_completed, task.progress_total), (2, 5));
    assert_eq!(task.request_payload, json!({ "chapter": "t1" }));
}

#[test]
fn test_prune_removes_only_finished_tasks() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create_task(pending("done", "toongod")).unwrap();
    store.update_task("done", finish(TaskStatus::Success)).unwrap();
    store.create_task(pending("active", "toongod")).unwrap();

    assert_eq!(store.prune_completed(7).unwrap(), 0);

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(store.prune_completed(0).unwrap(), 1);
    assert!(store.get_task("done").unwrap().is_none());
    assert!(store.get_task("active").unwrap().is_some());
}

#[test]
fn test_stale_sweep_only_touches_listed_statuses() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create_task(pending("p", "toongod")).unwrap();
    store.create_task(pending("r", "toongod")).unwrap();
    store
        .update_task("r", TaskUpdate::status(TaskStatus::Running, "working"))
        .unwrap();

    std::thread::sleep(Duration::from_millis(20));
    let moved = store
        .mark_stale_tasks(
            chrono::Utc::now(),
            "abandoned",
            ErrorCode::TaskStale,
            &[TaskStatus::Running],
        )
        .unwrap();
    assert_eq!(moved, 1);

    let running = store.get_task("r").unwrap().unwrap();
    assert_eq!(running.status, TaskStatus::Error);
    assert_eq!(running.error_code, Some(ErrorCode::TaskStale));
    assert!(running.finished_at.is_some());
    assert_eq!(
        store.get_task("p").unwrap().unwrap().status,
        TaskStatus::Pending
    );
}
