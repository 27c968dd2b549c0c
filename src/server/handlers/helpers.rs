//! Error mapping and admin access for handlers.

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use super::super::AppState;
use super::api_types::ApiResponse;
use crate::error::ScraperError;
use crate::repository::StoreError;

/// HTTP status for a service error.
pub fn status_for(error: &ScraperError) -> StatusCode {
    match error {
        ScraperError::ProviderUnavailable(_) | ScraperError::Request(_) => StatusCode::BAD_REQUEST,
        ScraperError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        ScraperError::Store(_) | ScraperError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ScraperError::BrowserUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ScraperError::CloudflareChallenge { .. }
        | ScraperError::HttpStatus { .. }
        | ScraperError::Transport(_)
        | ScraperError::Parse(_) => StatusCode::BAD_GATEWAY,
    }
}

pub fn scraper_error(error: ScraperError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", error);
    }
    ApiResponse::error_with_code(status, error.to_string(), Some(error.code().as_str())).into_response()
}

pub fn store_error(error: StoreError) -> Response {
    scraper_error(ScraperError::Store(error))
}

pub fn bad_request(message: impl Into<String>) -> Response {
    ApiResponse::error(StatusCode::BAD_REQUEST, message).into_response()
}

/// Check the `Authorization: Bearer <token>` header against the configured
/// admin token. Without a configured token every caller is rejected.
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ApiResponse::error(StatusCode::FORBIDDEN, "admin access is not configured").into_response());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    match presented {
        Some(token) if token == expected => Ok(()),
        Some(_) => Err(ApiResponse::error(StatusCode::FORBIDDEN, "invalid admin token").into_response()),
        None => Err(ApiResponse::error(StatusCode::UNAUTHORIZED, "admin token required").into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&ScraperError::ProviderUnavailable("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ScraperError::TaskNotFound("t".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ScraperError::CloudflareChallenge { url: "u".into() }),
            StatusCode::BAD_GATEWAY
        );
    }
}
