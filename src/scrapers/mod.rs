//! Site access: HTTP fetching, rate limiting, cookies, challenge handling
//! and browser rendering.

pub mod browser;
pub mod cloudflare;
pub mod context;
pub mod cookies;
pub mod http_client;
pub mod rate_limiter;

pub use browser::{BrowserEngine, UnavailableBrowser};
pub use cloudflare::{
    is_challenge_body, is_challenge_response, ChallengeResolver, ChallengeSolver,
    FlareSolverrClient, SolvedChallenge, SolvedCookieCache,
};
pub use context::{EngineKind, ProviderContext};
pub use cookies::{CookieExpiry, CookieStore, ExpiryStatus};
pub use http_client::{
    FetchedBytes, FetchedPage, HttpClient, HttpClientConfig, PageFetcher, PageRequest,
    RequestEngine,
};
pub use rate_limiter::RateLimiter;

use crate::error::ScraperError;

/// Fetch an HTML page, turning challenge pages into `CloudflareChallenge`
/// and other non-2xx responses into `HttpStatus`.
pub async fn fetch_html(
    fetcher: &dyn PageFetcher,
    request: &PageRequest,
) -> Result<FetchedPage, ScraperError> {
    let page = fetcher.fetch_page(request).await?;
    if is_challenge_response(page.status, &page.headers, &page.body) {
        return Err(ScraperError::CloudflareChallenge {
            url: request.url.clone(),
        });
    }
    if !page.is_success() {
        return Err(ScraperError::HttpStatus {
            status: page.status,
            url: page.url,
        });
    }
    Ok(page)
}
