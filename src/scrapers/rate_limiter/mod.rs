//! Per-host concurrency and request-rate limiter.
//!
//! Each host gets a semaphore capping in-flight requests and a minimum
//! interval between request starts. Rate-limit responses widen the interval
//! until the host recovers.

mod domain_state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, RwLock};
use tracing::{debug, warn};

use super::context::host_of;
use domain_state::DomainState;

/// Default number of concurrent requests per host.
pub const DEFAULT_PER_HOST_CONCURRENCY: usize = 4;

/// Upper bound on the extra spacing added after rate-limit responses.
const MAX_PENALTY: Duration = Duration::from_secs(10);

/// Longest spacing a requested rate can impose between request starts.
const MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub per_host_concurrency: usize,
    /// Requests per second applied when the caller gives none.
    pub default_rps: Option<f64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_host_concurrency: DEFAULT_PER_HOST_CONCURRENCY,
            default_rps: None,
        }
    }
}

/// Held for the duration of one request.
#[derive(Debug)]
pub struct HostPermit {
    pub domain: String,
    _permit: OwnedSemaphorePermit,
}

/// Per-host limiter shared by every client clone.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn interval_for(&self, rps: Option<f64>) -> Duration {
        match rps.or(self.config.default_rps) {
            Some(rps) if rps > 0.0 => Duration::try_from_secs_f64(1.0 / rps)
                .map_or(MAX_INTERVAL, |interval| interval.min(MAX_INTERVAL)),
            _ => Duration::ZERO,
        }
    }

    /// Wait for a concurrency slot and the interval gate for the URL's host.
    /// Returns `None` for URLs without a host.
    pub async fn acquire(&self, url: &str, rps: Option<f64>) -> Option<HostPermit> {
        let domain = host_of(url)?;
        let interval = self.interval_for(rps);

        let semaphore = {
            let mut domains = self.domains.write().await;
            domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(self.config.per_host_concurrency))
                .semaphore
                .clone()
        };
        let permit = semaphore.acquire_owned().await.ok()?;

        let wait = {
            let mut domains = self.domains.write().await;
            let state = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(self.config.per_host_concurrency));
            state.reserve(interval, Instant::now())
        };
        if wait > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }

        Some(HostPermit {
            domain,
            _permit: permit,
        })
    }

    /// Report a 429/503 so later requests to the host are spaced further.
    pub async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.rate_limit_hits += 1;
            state.penalty = (state.penalty * 2)
                .max(Duration::from_millis(500))
                .min(MAX_PENALTY);
            warn!(
                "Rate limited by {} (HTTP {}), spacing requests by extra {:?}",
                domain, status_code, state.penalty
            );
        }
    }

    /// Report a successful request, clearing any penalty.
    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            if state.penalty > Duration::ZERO {
                debug!("Domain {} recovered from rate limit backoff", domain);
                state.penalty = Duration::ZERO;
            }
        }
    }

    /// (total_requests, rate_limit_hits) for a host.
    pub async fn stats(&self, domain: &str) -> Option<(u64, u64)> {
        let domains = self.domains.read().await;
        domains
            .get(domain)
            .map(|s| (s.total_requests, s.rate_limit_hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_tracks_per_host() {
        let limiter = RateLimiter::new();
        let permit = limiter
            .acquire("https://a.example.com/page", None)
            .await
            .unwrap();
        assert_eq!(permit.domain, "a.example.com");
        drop(permit);
        limiter.acquire("https://a.example.com/2", None).await;
        limiter.acquire("https://b.example.com/", None).await;

        assert_eq!(limiter.stats("a.example.com").await, Some((2, 0)));
        assert_eq!(limiter.stats("b.example.com").await, Some((1, 0)));
        assert!(limiter.acquire("not a url", None).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrency_cap() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            per_host_concurrency: 1,
            default_rps: None,
        });
        let first = limiter.acquire("https://a.test/1", None).await.unwrap();

        let second = tokio::time::timeout(
            Duration::from_millis(50),
            limiter.acquire("https://a.test/2", None),
        )
        .await;
        assert!(second.is_err(), "second acquire should block");

        drop(first);
        let third = tokio::time::timeout(
            Duration::from_millis(200),
            limiter.acquire("https://a.test/3", None),
        )
        .await;
        assert!(third.is_ok());
    }

    #[test]
    fn test_interval_is_capped_for_tiny_rates() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.interval_for(Some(2.0)), Duration::from_millis(500));
        assert_eq!(limiter.interval_for(Some(1e-20)), MAX_INTERVAL);
        assert_eq!(limiter.interval_for(Some(0.001)), MAX_INTERVAL);
        assert_eq!(limiter.interval_for(Some(0.0)), Duration::ZERO);
        assert_eq!(limiter.interval_for(None), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_tiny_rate_does_not_panic() {
        let limiter = RateLimiter::new();
        let permit = tokio::spawn(async move {
            limiter
                .acquire("https://a.test/x", Some(1e-20))
                .await
                .map(|p| p.domain)
        })
        .await
        .unwrap();
        assert_eq!(permit.as_deref(), Some("a.test"));
    }

    #[tokio::test]
    async fn test_rate_limit_penalty_and_recovery() {
        let limiter = RateLimiter::new();
        limiter.acquire("https://slow.test/", None).await;
        limiter.report_rate_limit("slow.test", 429).await;
        assert_eq!(limiter.stats("slow.test").await, Some((1, 1)));
        limiter.report_success("slow.test").await;
    }
}
