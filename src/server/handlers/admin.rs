//! Admin endpoints: queue health, metrics, alert history and webhook test.
//!
//! Every handler checks the bearer token first.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;

use super::super::AppState;
use super::api_types::{ApiResponse, HealthResponse, WebhookTestResponse};
use super::helpers::{bad_request, require_admin, store_error};
use crate::models::{AlertQuery, AlertRule, AlertSeverity};
use crate::services::alerts::METRICS_WINDOW_HOURS;

const MAX_METRICS_HOURS: u32 = 24 * 30;

pub async fn health(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(denied) = require_admin(&state, &headers) {
        return denied;
    }
    match state.download.store().queue_stats() {
        Ok(queue) => ApiResponse::ok(HealthResponse {
            queue,
            alerts_enabled: state.alerts.config().enabled,
            webhook_enabled: state.alerts.config().webhook.target().is_some(),
        })
        .into_response(),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct MetricsParams {
    pub hours: Option<u32>,
}

pub async fn metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<MetricsParams>,
) -> impl IntoResponse {
    if let Err(denied) = require_admin(&state, &headers) {
        return denied;
    }
    let hours = params
        .hours
        .unwrap_or(METRICS_WINDOW_HOURS)
        .clamp(1, MAX_METRICS_HOURS);
    match state.download.store().metrics(hours) {
        Ok(metrics) => ApiResponse::ok(metrics).into_response(),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AlertsParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub severity: Option<String>,
    pub rule: Option<String>,
}

pub async fn list_alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AlertsParams>,
) -> impl IntoResponse {
    if let Err(denied) = require_admin(&state, &headers) {
        return denied;
    }

    let mut query = AlertQuery::default();
    if let Some(page) = params.page {
        query.page = page.max(1);
    }
    if let Some(size) = params.page_size {
        query.page_size = size.clamp(1, 200);
    }
    if let Some(severity) = params.severity.as_deref().filter(|s| !s.is_empty()) {
        match AlertSeverity::from_str(severity) {
            Some(s) => query.severity = Some(s),
            None => return bad_request(format!("unknown severity '{}'", severity)),
        }
    }
    if let Some(rule) = params.rule.as_deref().filter(|s| !s.is_empty()) {
        match AlertRule::from_str(rule) {
            Some(r) => query.rule = Some(r),
            None => return bad_request(format!("unknown rule '{}'", rule)),
        }
    }

    match state.download.store().list_alerts(&query) {
        Ok((alerts, total)) => {
            ApiResponse::paginated(query.page, query.page_size, total, alerts).into_response()
        }
        Err(e) => store_error(e),
    }
}

/// Send a test payload to the configured webhook.
pub async fn test_webhook(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(denied) = require_admin(&state, &headers) {
        return denied;
    }
    let configured = state.alerts.config().webhook.target().is_some();
    let outcome = state.alerts.send_test_webhook().await;
    ApiResponse::ok(WebhookTestResponse { outcome, configured }).into_response()
}
