//! Router configuration for the scraper API.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::ping))
        // Tasks
        .route(
            "/api/scraper/tasks",
            get(handlers::list_tasks).post(handlers::submit_task),
        )
        .route("/api/scraper/tasks/:task_id", get(handlers::get_task))
        // Providers and browsing
        .route("/api/scraper/providers", get(handlers::list_providers))
        .route("/api/scraper/search", post(handlers::search))
        .route("/api/scraper/catalog", post(handlers::catalog))
        .route("/api/scraper/chapters", post(handlers::chapters))
        // Storage state
        .route("/api/scraper/state", post(handlers::upload_state))
        .route("/api/scraper/state/:provider", get(handlers::get_state))
        // Admin (bearer token)
        .route("/api/scraper/admin/health", get(handlers::health))
        .route("/api/scraper/admin/metrics", get(handlers::metrics))
        .route("/api/scraper/admin/alerts", get(handlers::list_alerts))
        .route("/api/scraper/admin/alerts/test", post(handlers::test_webhook))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
