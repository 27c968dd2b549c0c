//! Task submission and status endpoints.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use super::super::AppState;
use super::api_types::ApiResponse;
use super::helpers::{bad_request, scraper_error, store_error};
use crate::models::{DownloadRequest, TaskStatus, TaskStatusView};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// Submit a chapter download. Duplicates of an active task return the
/// existing task id.
pub async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> impl IntoResponse {
    match state.download.submit(&request) {
        Ok(response) => ApiResponse::ok(response).into_response(),
        Err(e) => scraper_error(e),
    }
}

pub async fn get_task(State(state): State<AppState>, Path(task_id): Path<String>) -> impl IntoResponse {
    match state.download.status(&task_id) {
        Ok(view) => ApiResponse::ok(view).into_response(),
        Err(e) => scraper_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListTasksParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// Most recently updated tasks, optionally filtered by status.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListTasksParams>,
) -> impl IntoResponse {
    let status = match params.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => match TaskStatus::from_str(s) {
            Some(status) => Some(status),
            None => return bad_request(format!("unknown status '{}'", s)),
        },
        None => None,
    };
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    match state.download.store().list_tasks(limit, status) {
        Ok(tasks) => {
            let views: Vec<TaskStatusView> = tasks.iter().map(TaskStatusView::from).collect();
            ApiResponse::ok(views).into_response()
        }
        Err(e) => store_error(e),
    }
}
