//! Error taxonomy for the scraper subsystem.
//!
//! Failures surface to callers as stable string codes (`ErrorCode`), never as
//! Rust type names. `ScraperError` carries the detail and maps onto a code.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repository::StoreError;

/// Stable error codes persisted on tasks and returned by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "SCRAPER_PROVIDER_UNAVAILABLE")]
    ProviderUnavailable,
    #[serde(rename = "SCRAPER_BROWSER_UNAVAILABLE")]
    BrowserUnavailable,
    #[serde(rename = "SCRAPER_AUTH_CHALLENGE")]
    AuthChallenge,
    #[serde(rename = "SCRAPER_DOWNLOAD_FAILED")]
    DownloadFailed,
    #[serde(rename = "SCRAPER_IMAGE_EMPTY")]
    ImageEmpty,
    #[serde(rename = "SCRAPER_RETRY_EXHAUSTED")]
    RetryExhausted,
    #[serde(rename = "SCRAPER_TASK_STALE")]
    TaskStale,
    #[serde(rename = "SCRAPER_TASK_DUPLICATE")]
    TaskDuplicate,
    #[serde(rename = "SCRAPER_TASK_STORE_ERROR")]
    TaskStoreError,
    #[serde(rename = "SCRAPER_TASK_NOT_FOUND")]
    TaskNotFound,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 10] = [
        ErrorCode::ProviderUnavailable,
        ErrorCode::BrowserUnavailable,
        ErrorCode::AuthChallenge,
        ErrorCode::DownloadFailed,
        ErrorCode::ImageEmpty,
        ErrorCode::RetryExhausted,
        ErrorCode::TaskStale,
        ErrorCode::TaskDuplicate,
        ErrorCode::TaskStoreError,
        ErrorCode::TaskNotFound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ProviderUnavailable => "SCRAPER_PROVIDER_UNAVAILABLE",
            ErrorCode::BrowserUnavailable => "SCRAPER_BROWSER_UNAVAILABLE",
            ErrorCode::AuthChallenge => "SCRAPER_AUTH_CHALLENGE",
            ErrorCode::DownloadFailed => "SCRAPER_DOWNLOAD_FAILED",
            ErrorCode::ImageEmpty => "SCRAPER_IMAGE_EMPTY",
            ErrorCode::RetryExhausted => "SCRAPER_RETRY_EXHAUSTED",
            ErrorCode::TaskStale => "SCRAPER_TASK_STALE",
            ErrorCode::TaskDuplicate => "SCRAPER_TASK_DUPLICATE",
            ErrorCode::TaskStoreError => "SCRAPER_TASK_STORE_ERROR",
            ErrorCode::TaskNotFound => "SCRAPER_TASK_NOT_FOUND",
        }
    }

    /// Parse a persisted code. Unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_str() == s)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while resolving providers, fetching pages, or downloading.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("no provider available: {0}")]
    ProviderUnavailable(String),

    #[error("browser engine unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("cloudflare challenge not solved for {url}")]
    CloudflareChallenge { url: String },

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Connection resets, timeouts and other failures worth retrying.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request error: {0}")]
    Request(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for ScraperError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            return ScraperError::Transport(e.to_string());
        }
        if let Some(status) = e.status() {
            return ScraperError::HttpStatus {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        ScraperError::Request(e.to_string())
    }
}

impl ScraperError {
    /// Map onto the stable taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            ScraperError::ProviderUnavailable(_) => ErrorCode::ProviderUnavailable,
            ScraperError::BrowserUnavailable(_) => ErrorCode::BrowserUnavailable,
            ScraperError::CloudflareChallenge { .. } => ErrorCode::AuthChallenge,
            ScraperError::TaskNotFound(_) => ErrorCode::TaskNotFound,
            ScraperError::Store(_) => ErrorCode::TaskStoreError,
            ScraperError::HttpStatus { .. }
            | ScraperError::Transport(_)
            | ScraperError::Request(_)
            | ScraperError::Parse(_)
            | ScraperError::Io(_) => ErrorCode::DownloadFailed,
        }
    }

    /// Whether the failure is transient (429/5xx gateway errors, timeouts).
    pub fn is_transient(&self) -> bool {
        match self {
            ScraperError::HttpStatus { status, .. } => is_transient_status(*status),
            ScraperError::Transport(_) => true,
            _ => false,
        }
    }
}

/// HTTP statuses that are retried at the image and page level.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_round_trip_strings() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::parse("SOMETHING_ELSE"), None);
    }

    #[test]
    fn test_error_code_serializes_as_stable_string() {
        let json = serde_json::to_string(&ErrorCode::RetryExhausted).unwrap();
        assert_eq!(json, "\"SCRAPER_RETRY_EXHAUSTED\"");
    }

    #[test]
    fn test_transient_classification() {
        let err = ScraperError::HttpStatus {
            status: 503,
            url: "https://example.com/1.jpg".to_string(),
        };
        assert!(err.is_transient());
        assert_eq!(err.code(), ErrorCode::DownloadFailed);

        let err = ScraperError::HttpStatus {
            status: 404,
            url: "https://example.com/1.jpg".to_string(),
        };
        assert!(!err.is_transient());

        assert!(ScraperError::Transport("reset".into()).is_transient());
        assert!(!ScraperError::Parse("bad".into()).is_transient());
    }

    #[test]
    fn test_challenge_maps_to_auth_code() {
        let err = ScraperError::CloudflareChallenge {
            url: "https://example.com".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::AuthChallenge);
    }
}
