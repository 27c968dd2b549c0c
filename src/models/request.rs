//! Download submission payloads and status views.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{Task, TaskReport};
use crate::error::ErrorCode;

/// Manga being downloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaRef {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Chapter being downloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRef {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A chapter download request. Stored verbatim as the task's `request_payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_hint: Option<String>,
    pub manga: MangaRef,
    pub chapter: ChapterRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_rps: Option<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub cookies: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_state_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl DownloadRequest {
    pub fn new(base_url: impl Into<String>, manga_id: &str, chapter_id: &str) -> Self {
        Self {
            base_url: base_url.into(),
            site_hint: None,
            manga: MangaRef {
                id: manga_id.to_string(),
                title: String::new(),
                url: None,
            },
            chapter: ChapterRef {
                id: chapter_id.to_string(),
                title: String::new(),
                url: None,
            },
            http_mode: None,
            force_engine: None,
            concurrency: None,
            rate_limit_rps: None,
            cookies: HashMap::new(),
            storage_state_path: None,
            user_agent: None,
        }
    }
}

/// Site access options for browsing calls (search, catalog, chapter lists).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteAccess {
    pub base_url: String,
    #[serde(default)]
    pub site_hint: Option<String>,
    #[serde(default)]
    pub http_mode: Option<bool>,
    #[serde(default)]
    pub force_engine: Option<String>,
    #[serde(default)]
    pub rate_limit_rps: Option<f64>,
    #[serde(default)]
    pub cookies: HashMap<String, String>,
    #[serde(default)]
    pub storage_state_path: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl SiteAccess {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// The same options as a download request with empty references.
    pub fn to_request(&self) -> DownloadRequest {
        let mut request = DownloadRequest::new(self.base_url.clone(), "", "");
        request.site_hint = self.site_hint.clone();
        request.http_mode = self.http_mode;
        request.force_engine = self.force_engine.clone();
        request.rate_limit_rps = self.rate_limit_rps;
        request.cookies = self.cookies.clone();
        request.storage_state_path = self.storage_state_path.clone();
        request.user_agent = self.user_agent.clone();
        request
    }
}

/// Outcome of submitting a download request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
    /// `pending` for a new task, `existing` when deduplicated.
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

/// Task status as returned to API clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusView {
    pub task_id: String,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<TaskReport>,
    pub persisted: bool,
    pub provider: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub queue_status: String,
    pub progress_completed: u32,
    pub progress_total: u32,
}

impl From<&Task> for TaskStatusView {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            status: task.status.as_str().to_string(),
            message: task.message.clone(),
            report: task.report.clone(),
            persisted: true,
            provider: task.provider.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
            retry_count: task.retry_count,
            max_retries: task.max_retries,
            next_retry_at: task.next_retry_at,
            error_code: task.error_code,
            last_error: task.last_error.clone(),
            queue_status: task.status.queue_status().to_string(),
            progress_completed: task.progress_completed,
            progress_total: task.progress_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_request_deserializes() {
        let json = r#"{
            "base_url": "https://toongod.org",
            "manga": {"id": "solo-leveling", "title": "Solo Leveling"},
            "chapter": {"id": "chapter-1", "title": "Ch. 1"}
        }"#;
        let req: DownloadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.manga.id, "solo-leveling");
        assert!(req.site_hint.is_none());
        assert!(req.cookies.is_empty());
        assert!(req.chapter.url.is_none());
    }
}
