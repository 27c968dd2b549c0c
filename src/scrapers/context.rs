//! Per-request execution parameters passed through provider calls.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Which engine renders reader pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Http,
    Browser,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Browser => "browser",
        }
    }

    /// `playwright` is accepted as an alias of `browser`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "browser" | "playwright" | "chromium" => Some(Self::Browser),
            _ => None,
        }
    }
}

/// Immutable request context. Cloudflare flows derive a new context rather
/// than mutating an existing one.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderContext {
    pub base_url: String,
    pub cookies: HashMap<String, String>,
    pub user_agent: Option<String>,
    /// Plain HTTP with the library user agent, no browser impersonation.
    pub http_mode: bool,
    pub force_engine: Option<EngineKind>,
    pub rate_limit_rps: Option<f64>,
    pub concurrency: usize,
    pub referer: Option<String>,
}

impl ProviderContext {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            cookies: HashMap::new(),
            user_agent: None,
            http_mode: false,
            force_engine: None,
            rate_limit_rps: None,
            concurrency: 6,
            referer: None,
        }
    }

    /// Host of `base_url`, lower-cased.
    pub fn host(&self) -> Option<String> {
        host_of(&self.base_url)
    }

    /// New context with `cookies` merged over the existing ones.
    pub fn with_cookies(&self, cookies: &HashMap<String, String>) -> Self {
        let mut next = self.clone();
        for (name, value) in cookies {
            next.cookies.insert(name.clone(), value.clone());
        }
        next
    }

    pub fn with_user_agent(&self, user_agent: Option<String>) -> Self {
        let mut next = self.clone();
        if user_agent.is_some() {
            next.user_agent = user_agent;
        }
        next
    }

    pub fn with_referer(&self, referer: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.referer = Some(referer.into());
        next
    }

    pub fn wants_browser(&self) -> bool {
        self.force_engine == Some(EngineKind::Browser)
    }
}

/// Lower-cased host of a URL.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Format cookies as a `Cookie` header value, sorted by name.
pub fn cookie_header(cookies: &HashMap<String, String>) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    let mut pairs: Vec<_> = cookies.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    Some(
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_aliases() {
        assert_eq!(EngineKind::from_str("playwright"), Some(EngineKind::Browser));
        assert_eq!(EngineKind::from_str("HTTP"), Some(EngineKind::Http));
        assert_eq!(EngineKind::from_str("curl"), None);
    }

    #[test]
    fn test_with_cookies_does_not_mutate_original() {
        let mut ctx = ProviderContext::new("https://toongod.org");
        ctx.cookies.insert("a".into(), "1".into());
        let mut solved = HashMap::new();
        solved.insert("cf_clearance".to_string(), "xyz".to_string());
        solved.insert("a".to_string(), "2".to_string());

        let next = ctx.with_cookies(&solved).with_user_agent(Some("UA".into()));
        assert_eq!(ctx.cookies.len(), 1);
        assert_eq!(ctx.cookies["a"], "1");
        assert_eq!(next.cookies["a"], "2");
        assert_eq!(next.cookies["cf_clearance"], "xyz");
        assert_eq!(next.user_agent.as_deref(), Some("UA"));
    }

    #[test]
    fn test_cookie_header_is_sorted() {
        let mut cookies = HashMap::new();
        cookies.insert("b".to_string(), "2".to_string());
        cookies.insert("a".to_string(), "1".to_string());
        assert_eq!(cookie_header(&cookies).as_deref(), Some("a=1; b=2"));
        assert_eq!(cookie_header(&HashMap::new()), None);
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://WWW.Example.com/x").as_deref(), Some("www.example.com"));
        assert_eq!(host_of("not a url"), None);
    }
}
