//! Storage-state (cookie) upload and inspection.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use super::super::AppState;
use super::api_types::{ApiResponse, StateInfoResponse, StateUploadResponse};
use super::helpers::{bad_request, scraper_error};
use crate::error::ScraperError;
use crate::scrapers::cookies::{save_storage_state, state_path};

#[derive(Debug, Deserialize)]
pub struct StateUploadBody {
    pub provider: String,
    /// Playwright storage state or a bare cookie array.
    pub storage_state: serde_json::Value,
}

pub async fn upload_state(
    State(state): State<AppState>,
    Json(body): Json<StateUploadBody>,
) -> impl IntoResponse {
    let Some(provider) = state.download.registry().get(body.provider.trim()) else {
        return bad_request(format!("unknown provider '{}'", body.provider));
    };
    let contents = body.storage_state.to_string();
    let state_dir = &state.download.config().state_dir;

    let (path, count) = match save_storage_state(state_dir, provider.key(), &contents).await {
        Ok(saved) => saved,
        Err(ScraperError::Parse(message)) => return bad_request(message),
        Err(e) => return scraper_error(e),
    };
    tracing::info!("Stored {} cookies for {}", count, provider.key());

    match state.download.cookies().expiry(&path).await {
        Ok(expiry) => ApiResponse::ok(StateUploadResponse {
            provider: provider.key().to_string(),
            path: path.display().to_string(),
            cookies: count,
            expiry,
        })
        .into_response(),
        Err(e) => scraper_error(e),
    }
}

pub async fn get_state(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> impl IntoResponse {
    let Some(provider) = state.download.registry().get(provider.trim()) else {
        return bad_request(format!("unknown provider '{}'", provider));
    };
    let path = state_path(&state.download.config().state_dir, provider.key());
    let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
    let expiry = if exists {
        match state.download.cookies().expiry(&path).await {
            Ok(expiry) => Some(expiry),
            Err(e) => return scraper_error(e),
        }
    } else {
        None
    };
    ApiResponse::ok(StateInfoResponse {
        provider: provider.key().to_string(),
        path: path.display().to_string(),
        exists,
        expiry,
    })
    .into_response()
}
