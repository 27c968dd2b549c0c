//! Response envelope and typed payloads.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::models::QueueStats;
use crate::scrapers::CookieExpiry;
use crate::services::alerts::DeliveryOutcome;

/// Standard API response envelope.
///
/// Every endpoint returns this wrapper:
/// ```json
/// { "error": false, "context": {}, "data": { ... } }
/// ```
#[derive(Debug, Serialize)]
pub struct ApiResponse<C: Serialize, T: Serialize> {
    pub error: bool,
    pub context: C,
    pub data: T,
}

/// Empty context for non-paginated responses.
#[derive(Debug, Default, Serialize)]
pub struct EmptyContext {}

/// Pagination context metadata.
#[derive(Debug, Serialize)]
pub struct PaginationContext {
    pub page: usize,
    pub per_page: usize,
    pub total: u64,
    pub total_pages: u64,
}

/// Error payload inside the envelope.
#[derive(Debug, Serialize)]
pub struct ErrorData {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl ApiResponse<EmptyContext, ErrorData> {
    pub fn error(status: StatusCode, message: impl Into<String>) -> impl IntoResponse {
        Self::error_with_code(status, message, None)
    }

    pub fn error_with_code(
        status: StatusCode,
        message: impl Into<String>,
        code: Option<&'static str>,
    ) -> impl IntoResponse {
        (
            status,
            Json(ApiResponse {
                error: true,
                context: EmptyContext {},
                data: ErrorData {
                    message: message.into(),
                    code,
                },
            }),
        )
    }
}

impl<T: Serialize> ApiResponse<EmptyContext, T> {
    pub fn ok(data: T) -> Json<ApiResponse<EmptyContext, T>> {
        Json(ApiResponse {
            error: false,
            context: EmptyContext {},
            data,
        })
    }
}

impl<T: Serialize> ApiResponse<PaginationContext, T> {
    pub fn paginated(
        page: usize,
        per_page: usize,
        total: u64,
        data: T,
    ) -> Json<ApiResponse<PaginationContext, T>> {
        let total_pages = total.div_ceil(per_page.max(1) as u64);
        Json(ApiResponse {
            error: false,
            context: PaginationContext {
                page,
                per_page,
                total,
                total_pages,
            },
            data,
        })
    }
}

/// Returned by `GET /api/scraper/admin/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub queue: QueueStats,
    pub alerts_enabled: bool,
    pub webhook_enabled: bool,
}

/// Returned by `POST /api/scraper/state`.
#[derive(Debug, Serialize)]
pub struct StateUploadResponse {
    pub provider: String,
    pub path: String,
    pub cookies: usize,
    pub expiry: CookieExpiry,
}

/// Returned by `GET /api/scraper/state/:provider`.
#[derive(Debug, Serialize)]
pub struct StateInfoResponse {
    pub provider: String,
    pub path: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<CookieExpiry>,
}

/// Returned by `POST /api/scraper/admin/alerts/test`.
#[derive(Debug, Serialize)]
pub struct WebhookTestResponse {
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
    pub configured: bool,
}
