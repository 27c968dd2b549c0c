//! User agent handling for HTTP requests.

use super::RequestEngine;

pub const USER_AGENT: &str = concat!("manga-scraper/", env!("CARGO_PKG_VERSION"));

/// Real browser user agents for impersonate mode.
pub const IMPERSONATE_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Pick a browser user agent for impersonate mode.
pub fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    IMPERSONATE_USER_AGENTS[nanos % IMPERSONATE_USER_AGENTS.len()]
}

/// Resolve the user agent for a request.
/// - an explicit value always wins
/// - `Impersonate` picks a real browser string
/// - `Http` uses the library's own
pub fn resolve_user_agent(engine: RequestEngine, explicit: Option<&str>) -> String {
    match (explicit, engine) {
        (Some(custom), _) if !custom.trim().is_empty() => custom.to_string(),
        (_, RequestEngine::Impersonate) => random_user_agent().to_string(),
        (_, RequestEngine::Http) => USER_AGENT.to_string(),
    }
}

/// Extra headers a desktop browser sends with a navigation.
pub fn browser_headers() -> &'static [(&'static str, &'static str)] {
    &[
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent_default() {
        let ua = resolve_user_agent(RequestEngine::Http, None);
        assert!(ua.starts_with("manga-scraper/"));
    }

    #[test]
    fn test_resolve_user_agent_impersonate() {
        let ua = resolve_user_agent(RequestEngine::Impersonate, None);
        assert!(ua.contains("Mozilla"));
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        let ua = resolve_user_agent(RequestEngine::Impersonate, Some("MyBot/1.0"));
        assert_eq!(ua, "MyBot/1.0");
        let ua = resolve_user_agent(RequestEngine::Http, Some("  "));
        assert!(ua.starts_with("manga-scraper/"));
    }
}
