//! Cloudflare challenge detection and solving.
//!
//! Challenge pages are recognised by a handful of high-confidence markers.
//! Large pages need two markers, since legitimate pages sometimes mention
//! Cloudflare by name. Solving is delegated to a FlareSolverr-compatible
//! service; the cookies it returns are cached per host.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::context::{host_of, ProviderContext};
use crate::error::ScraperError;

/// Lower-cased markers that identify a challenge page.
pub const CHALLENGE_MARKERS: &[&str] = &[
    "just a moment",
    "cf-challenge-running",
    "attention required",
    "cf_chl_opt",
    "challenge-platform",
    "checking your browser",
    "cf-browser-verification",
];

/// Bodies at least this large need two markers.
pub const LARGE_BODY_THRESHOLD: usize = 64 * 1024;

fn marker_count(body: &str) -> usize {
    let lower = body.to_lowercase();
    CHALLENGE_MARKERS
        .iter()
        .filter(|marker| lower.contains(*marker))
        .count()
}

/// Whether a body looks like a challenge page.
pub fn is_challenge_body(body: &str) -> bool {
    let required = if body.len() >= LARGE_BODY_THRESHOLD { 2 } else { 1 };
    marker_count(body) >= required
}

/// Whether a full response looks like a challenge. A 403/503 served by
/// Cloudflare needs only one marker regardless of size.
pub fn is_challenge_response(status: u16, headers: &HashMap<String, String>, body: &str) -> bool {
    let from_cloudflare = headers.contains_key("cf-ray")
        || headers
            .get("server")
            .is_some_and(|s| s.to_ascii_lowercase().contains("cloudflare"));
    if from_cloudflare && matches!(status, 403 | 503) && marker_count(body) >= 1 {
        return true;
    }
    is_challenge_body(body)
}

/// Result of a successful solve.
#[derive(Debug, Clone, Default)]
pub struct SolvedChallenge {
    pub cookies: HashMap<String, String>,
    /// Must be reused for follow-up requests; the clearance cookie is bound to it.
    pub user_agent: Option<String>,
    /// Page body the solver ended on, when it reports one.
    pub body: Option<String>,
}

/// Something that can clear a challenge for a URL.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    async fn solve(&self, url: &str) -> Result<SolvedChallenge, ScraperError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolverRequest<'a> {
    cmd: &'a str,
    url: &'a str,
    max_timeout: u64,
}

#[derive(Debug, Deserialize)]
struct SolverResponse {
    status: String,
    #[serde(default)]
    message: String,
    solution: Option<SolverSolution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolverSolution {
    #[serde(default)]
    cookies: Vec<SolverCookie>,
    user_agent: Option<String>,
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SolverCookie {
    name: String,
    value: String,
}

/// Client for a FlareSolverr-compatible `/v1` endpoint.
pub struct FlareSolverrClient {
    endpoint: String,
    client: reqwest::Client,
    max_timeout: Duration,
}

impl FlareSolverrClient {
    pub fn new(endpoint: impl Into<String>, max_timeout: Duration) -> Result<Self, ScraperError> {
        let client = reqwest::Client::builder()
            .timeout(max_timeout + Duration::from_secs(10))
            .build()
            .map_err(|e| ScraperError::Request(format!("failed to build solver client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            max_timeout,
        })
    }
}

#[async_trait]
impl ChallengeSolver for FlareSolverrClient {
    async fn solve(&self, url: &str) -> Result<SolvedChallenge, ScraperError> {
        info!("Requesting challenge solve for {}", url);
        let request = SolverRequest {
            cmd: "request.get",
            url,
            max_timeout: self.max_timeout.as_millis() as u64,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(ScraperError::HttpStatus {
                status: response.status().as_u16(),
                url: self.endpoint.clone(),
            });
        }
        let parsed: SolverResponse = response.json().await?;

        if parsed.status != "ok" {
            warn!("Solver returned {}: {}", parsed.status, parsed.message);
            return Err(ScraperError::CloudflareChallenge {
                url: url.to_string(),
            });
        }
        let solution = parsed.solution.ok_or_else(|| ScraperError::CloudflareChallenge {
            url: url.to_string(),
        })?;

        Ok(SolvedChallenge {
            cookies: solution
                .cookies
                .into_iter()
                .map(|c| (c.name, c.value))
                .collect(),
            user_agent: solution.user_agent,
            body: solution.response,
        })
    }
}

/// Cookies solved for a host.
#[derive(Debug, Clone)]
pub struct CachedSolve {
    pub cookies: HashMap<String, String>,
    pub user_agent: Option<String>,
    pub solved_at: DateTime<Utc>,
}

/// Solved cookies keyed by host. Last solve wins.
#[derive(Debug, Default)]
pub struct SolvedCookieCache {
    entries: RwLock<HashMap<String, CachedSolve>>,
}

impl SolvedCookieCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, host: &str) -> Option<CachedSolve> {
        self.entries.read().await.get(host).cloned()
    }

    pub async fn store(&self, host: &str, solved: &SolvedChallenge) {
        self.entries.write().await.insert(
            host.to_string(),
            CachedSolve {
                cookies: solved.cookies.clone(),
                user_agent: solved.user_agent.clone(),
                solved_at: Utc::now(),
            },
        );
    }

    /// Cached solve for the URL's host, trying the parent domain for
    /// subdomains such as image CDNs.
    pub async fn for_url(&self, url: &str) -> Option<CachedSolve> {
        let host = host_of(url)?;
        if let Some(hit) = self.get(&host).await {
            return Some(hit);
        }
        let (_, parent) = host.split_once('.')?;
        if parent.contains('.') {
            return self.get(parent).await;
        }
        None
    }
}

/// Turns a challenge into a new context carrying solved credentials.
#[derive(Clone)]
pub struct ChallengeResolver {
    solver: Option<Arc<dyn ChallengeSolver>>,
    cache: Arc<SolvedCookieCache>,
}

impl ChallengeResolver {
    pub fn new(solver: Option<Arc<dyn ChallengeSolver>>, cache: Arc<SolvedCookieCache>) -> Self {
        Self { solver, cache }
    }

    pub fn cache(&self) -> &Arc<SolvedCookieCache> {
        &self.cache
    }

    pub fn has_solver(&self) -> bool {
        self.solver.is_some()
    }

    /// Solve the challenge at `url` and derive a context with the solved
    /// cookies and user agent.
    pub async fn resolve(
        &self,
        ctx: &ProviderContext,
        url: &str,
    ) -> Result<ProviderContext, ScraperError> {
        let Some(solver) = &self.solver else {
            debug!("No challenge solver configured for {}", url);
            return Err(ScraperError::CloudflareChallenge {
                url: url.to_string(),
            });
        };

        let solved = match solver.solve(url).await {
            Ok(solved) => solved,
            Err(e) => {
                warn!("Challenge solver failed for {}: {}", url, e);
                return Err(ScraperError::CloudflareChallenge {
                    url: url.to_string(),
                });
            }
        };
        if solved.body.as_deref().is_some_and(is_challenge_body) {
            warn!("Solver still returned a challenge page for {}", url);
            return Err(ScraperError::CloudflareChallenge {
                url: url.to_string(),
            });
        }

        if let Some(host) = host_of(url) {
            self.cache.store(&host, &solved).await;
        }
        info!(
            "Challenge solved for {} ({} cookies)",
            url,
            solved.cookies.len()
        );
        Ok(ctx
            .with_cookies(&solved.cookies)
            .with_user_agent(solved.user_agent.clone()))
    }

    /// Context with any cached cookies for `url` applied.
    pub async fn apply_cached(&self, ctx: &ProviderContext, url: &str) -> ProviderContext {
        match self.cache.for_url(url).await {
            Some(cached) => ctx
                .with_cookies(&cached.cookies)
                .with_user_agent(cached.user_agent),
            None => ctx.clone(),
        }
    }

    /// Run `op` with cached cookies applied. On a challenge, solve it and run
    /// `op` once more with the solved context. Returns the result together
    /// with the context that produced it.
    pub async fn run<T, F, Fut>(
        &self,
        ctx: &ProviderContext,
        url: &str,
        op: F,
    ) -> Result<(T, ProviderContext), ScraperError>
    where
        F: Fn(ProviderContext) -> Fut,
        Fut: Future<Output = Result<T, ScraperError>>,
    {
        let first_ctx = self.apply_cached(ctx, url).await;
        let challenged_url = match op(first_ctx.clone()).await {
            Ok(value) => return Ok((value, first_ctx)),
            Err(ScraperError::CloudflareChallenge { url }) => url,
            Err(e) => return Err(e),
        };

        info!("Challenge at {}, attempting solve", challenged_url);
        let solved_ctx = self.resolve(&first_ctx, &challenged_url).await?;
        let value = op(solved_ctx.clone()).await?;
        Ok((value, solved_ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSolver(SolvedChallenge);

    #[async_trait]
    impl ChallengeSolver for StaticSolver {
        async fn solve(&self, _url: &str) -> Result<SolvedChallenge, ScraperError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_detects_small_challenge_page() {
        let body = "<html><title>Just a moment...</title></html>";
        assert!(is_challenge_body(body));
        assert!(!is_challenge_body("<html><body>Chapter 1</body></html>"));
    }

    #[test]
    fn test_large_pages_need_two_markers() {
        let filler = "x".repeat(LARGE_BODY_THRESHOLD);
        let one = format!("{}<p>Attention required</p>", filler);
        assert!(!is_challenge_body(&one));
        let two = format!("{}<p>Attention required</p><div id=challenge-platform>", filler);
        assert!(is_challenge_body(&two));
    }

    #[test]
    fn test_cloudflare_403_with_single_marker() {
        let filler = "x".repeat(LARGE_BODY_THRESHOLD);
        let body = format!("{}just a moment", filler);
        let mut headers = HashMap::new();
        headers.insert("cf-ray".to_string(), "abc".to_string());
        assert!(is_challenge_response(403, &headers, &body));
        assert!(!is_challenge_response(200, &headers, &body));
    }

    #[tokio::test]
    async fn test_resolve_without_solver_fails() {
        let resolver = ChallengeResolver::new(None, Arc::new(SolvedCookieCache::new()));
        let ctx = ProviderContext::new("https://site.test");
        let err = resolver.resolve(&ctx, "https://site.test/ch/1").await.unwrap_err();
        assert!(matches!(err, ScraperError::CloudflareChallenge { .. }));
    }

    struct DownSolver;

    #[async_trait]
    impl ChallengeSolver for DownSolver {
        async fn solve(&self, url: &str) -> Result<SolvedChallenge, ScraperError> {
            Err(ScraperError::HttpStatus {
                status: 500,
                url: url.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_solver_failure_reports_challenge() {
        let resolver =
            ChallengeResolver::new(Some(Arc::new(DownSolver)), Arc::new(SolvedCookieCache::new()));
        let err = resolver
            .run(&ProviderContext::new("https://site.test"), "https://site.test/ch", |_ctx| async {
                Err::<u32, _>(ScraperError::CloudflareChallenge {
                    url: "https://site.test/ch".to_string(),
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::AuthChallenge);
    }

    #[tokio::test]
    async fn test_resolve_caches_cookies_and_user_agent() {
        let mut cookies = HashMap::new();
        cookies.insert("cf_clearance".to_string(), "ok".to_string());
        let solver = StaticSolver(SolvedChallenge {
            cookies,
            user_agent: Some("SolverUA".to_string()),
            body: Some("<html>reader</html>".to_string()),
        });
        let resolver =
            ChallengeResolver::new(Some(Arc::new(solver)), Arc::new(SolvedCookieCache::new()));
        let ctx = ProviderContext::new("https://site.test");

        let solved = resolver.resolve(&ctx, "https://site.test/ch/1").await.unwrap();
        assert_eq!(solved.cookies["cf_clearance"], "ok");
        assert_eq!(solved.user_agent.as_deref(), Some("SolverUA"));
        assert!(ctx.cookies.is_empty());

        let cached = resolver
            .apply_cached(&ProviderContext::new("https://site.test"), "https://cdn.site.test/1.jpg")
            .await;
        assert_eq!(cached.cookies["cf_clearance"], "ok");
    }

    #[tokio::test]
    async fn test_run_retries_once_with_solved_context() {
        let mut cookies = HashMap::new();
        cookies.insert("cf_clearance".to_string(), "ok".to_string());
        let solver = StaticSolver(SolvedChallenge {
            cookies,
            user_agent: None,
            body: None,
        });
        let resolver =
            ChallengeResolver::new(Some(Arc::new(solver)), Arc::new(SolvedCookieCache::new()));
        let calls = std::sync::atomic::AtomicUsize::new(0);

        let (value, used) = resolver
            .run(&ProviderContext::new("https://site.test"), "https://site.test/ch", |ctx| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if ctx.cookies.contains_key("cf_clearance") {
                        Ok(7)
                    } else {
                        Err(ScraperError::CloudflareChallenge {
                            url: "https://site.test/ch".to_string(),
                        })
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(used.cookies["cf_clearance"], "ok");
    }

    #[tokio::test]
    async fn test_solver_returning_challenge_is_rejected() {
        let solver = StaticSolver(SolvedChallenge {
            cookies: HashMap::new(),
            user_agent: None,
            body: Some("<title>Just a moment...</title>".to_string()),
        });
        let resolver =
            ChallengeResolver::new(Some(Arc::new(solver)), Arc::new(SolvedCookieCache::new()));
        let err = resolver
            .resolve(&ProviderContext::new("https://site.test"), "https://site.test/")
            .await
            .unwrap_err();
        assert!(matches!(err, ScraperError::CloudflareChallenge { .. }));
    }
}
