//! HTTP request handlers for the scraper API.

mod admin;
pub mod api_types;
mod helpers;
mod providers;
mod state;
mod tasks;

pub use admin::{health, list_alerts, metrics, test_webhook};
pub use providers::{catalog, chapters, list_providers, search};
pub use state::{get_state, upload_state};
pub use tasks::{get_task, list_tasks, submit_task};

use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Liveness probe for container orchestration.
pub async fn ping() -> impl IntoResponse {
    StatusCode::OK
}
