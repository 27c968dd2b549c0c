//! HTTP client with per-host limiting and transient retry.

mod response;
mod user_agent;

pub use response::{FetchedBytes, FetchedPage};
pub use user_agent::{browser_headers, resolve_user_agent, IMPERSONATE_USER_AGENTS, USER_AGENT};

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::cloudflare::is_challenge_response;
use super::context::{cookie_header, ProviderContext};
use super::rate_limiter::{HostPermit, RateLimitConfig, RateLimiter, DEFAULT_PER_HOST_CONCURRENCY};
use crate::error::{is_transient_status, ScraperError};

/// Backoff between attempts for transient failures.
pub const TRANSIENT_RETRY_SCHEDULE: [Duration; 3] = [
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_secs(2),
];

/// How requests present themselves to the remote site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestEngine {
    /// Library user agent, minimal headers.
    Http,
    /// Real browser user agent and navigation headers.
    #[default]
    Impersonate,
}

impl RequestEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Impersonate => "impersonate",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "http" | "httpx" => Some(Self::Http),
            "impersonate" | "curl_cffi" => Some(Self::Impersonate),
            _ => None,
        }
    }
}

/// Client construction options.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub engine: RequestEngine,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub per_host_concurrency: usize,
    pub default_rps: Option<f64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            engine: RequestEngine::default(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            per_host_concurrency: DEFAULT_PER_HOST_CONCURRENCY,
            default_rps: None,
        }
    }
}

/// One outgoing request.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub url: String,
    pub referer: Option<String>,
    pub cookies: HashMap<String, String>,
    pub user_agent: Option<String>,
    /// Force the plain engine for this request.
    pub http_mode: bool,
    pub rate_limit_rps: Option<f64>,
    /// Send as a form POST instead of a GET.
    pub form: Option<Vec<(String, String)>>,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Request carrying the context's cookies, user agent and limits.
    pub fn from_context(ctx: &ProviderContext, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            referer: ctx.referer.clone(),
            cookies: ctx.cookies.clone(),
            user_agent: ctx.user_agent.clone(),
            http_mode: ctx.http_mode,
            rate_limit_rps: ctx.rate_limit_rps,
            form: None,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_form(mut self, form: Vec<(String, String)>) -> Self {
        self.form = Some(form);
        self
    }
}

/// Fetches pages and binary resources.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a text page. Non-2xx responses are returned, not raised, so that
    /// callers can inspect challenge pages.
    async fn fetch_page(&self, request: &PageRequest) -> Result<FetchedPage, ScraperError>;

    /// Fetch a binary resource in a single attempt. Non-2xx is an error.
    async fn fetch_bytes(&self, request: &PageRequest) -> Result<FetchedBytes, ScraperError>;
}

/// reqwest-backed fetcher shared across tasks.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    engine: RequestEngine,
    rate_limiter: RateLimiter,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| ScraperError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            engine: config.engine,
            rate_limiter: RateLimiter::with_config(RateLimitConfig {
                per_host_concurrency: config.per_host_concurrency,
                default_rps: config.default_rps,
            }),
        })
    }

    pub fn engine(&self) -> RequestEngine {
        self.engine
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    async fn send(
        &self,
        request: &PageRequest,
    ) -> Result<(reqwest::Response, Option<HostPermit>), ScraperError> {
        let permit = self
            .rate_limiter
            .acquire(&request.url, request.rate_limit_rps)
            .await;

        let engine = if request.http_mode {
            RequestEngine::Http
        } else {
            self.engine
        };
        let user_agent = resolve_user_agent(engine, request.user_agent.as_deref());

        let mut builder = match &request.form {
            Some(form) => self.client.post(&request.url).form(form),
            None => self.client.get(&request.url),
        };
        builder = builder.header(header::USER_AGENT, user_agent);
        if engine == RequestEngine::Impersonate {
            for (name, value) in browser_headers() {
                builder = builder.header(*name, *value);
            }
        }
        if let Some(ref referer) = request.referer {
            builder = builder.header(header::REFERER, referer);
        }
        if let Some(cookie) = cookie_header(&request.cookies) {
            builder = builder.header(header::COOKIE, cookie);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        if let Some(ref permit) = permit {
            if status == 429 || status == 503 {
                self.rate_limiter
                    .report_rate_limit(&permit.domain, status)
                    .await;
            } else if response.status().is_success() {
                self.rate_limiter.report_success(&permit.domain).await;
            }
        }
        Ok((response, permit))
    }

    async fn fetch_page_once(&self, request: &PageRequest) -> Result<FetchedPage, ScraperError> {
        let (response, _permit) = self.send(request).await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response::collect_headers(response.headers());
        let body = response.text().await?;
        Ok(FetchedPage {
            status,
            url,
            body,
            headers,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<FetchedPage, ScraperError> {
        let mut attempt = 0;
        loop {
            let backoff = TRANSIENT_RETRY_SCHEDULE.get(attempt).copied();
            attempt += 1;

            match self.fetch_page_once(request).await {
                Ok(page) => {
                    let retryable = is_transient_status(page.status)
                        && !is_challenge_response(page.status, &page.headers, &page.body);
                    match backoff {
                        Some(delay) if retryable => {
                            debug!(
                                "HTTP {} from {}, retrying in {:?}",
                                page.status, request.url, delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                        _ => return Ok(page),
                    }
                }
                Err(e) => match backoff {
                    Some(delay) if e.is_transient() => {
                        warn!("Fetch of {} failed ({}), retrying in {:?}", request.url, e, delay);
                        tokio::time::sleep(delay).await;
                    }
                    _ => return Err(e),
                },
            }
        }
    }

    async fn fetch_bytes(&self, request: &PageRequest) -> Result<FetchedBytes, ScraperError> {
        let (response, _permit) = self.send(request).await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        if !response.status().is_success() {
            return Err(ScraperError::HttpStatus { status, url });
        }
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response.bytes().await?.to_vec();
        Ok(FetchedBytes {
            status,
            url,
            bytes,
            content_type,
        })
    }
}
