//! Site adapters and host-based provider resolution.

pub mod generic;
pub mod html;
pub mod madara;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

pub use generic::GenericProvider;
pub use madara::{MadaraProvider, MadaraSite, MANGAFORFREE, TOONGOD};
pub use types::{CatalogPage, ChapterSummary, MangaSummary, ProviderInfo};

use crate::error::ScraperError;
use crate::scrapers::context::host_of;
use crate::scrapers::{BrowserEngine, PageFetcher, ProviderContext};

/// Adapter for one family of manga sites.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used as the site hint and in task reports.
    fn key(&self) -> &'static str;

    fn label(&self) -> &'static str;

    /// Registrable domains this adapter serves. Subdomains match too.
    fn hosts(&self) -> &'static [&'static str];

    /// Whether the adapter may be pointed at hosts outside `hosts()`.
    fn supports_custom_host(&self) -> bool {
        false
    }

    fn manga_url(&self, base_url: &str, manga_id: &str) -> String;

    fn chapter_url(&self, base_url: &str, manga_id: &str, chapter_id: &str) -> String;

    async fn search(&self, ctx: &ProviderContext, keyword: &str) -> Result<Vec<MangaSummary>, ScraperError>;

    async fn catalog(
        &self,
        ctx: &ProviderContext,
        page: u32,
        orderby: Option<&str>,
        path: Option<&str>,
    ) -> Result<CatalogPage, ScraperError>;

    async fn chapters(&self, ctx: &ProviderContext, manga_url: &str) -> Result<Vec<ChapterSummary>, ScraperError>;

    /// Ordered image URLs of a chapter's reader page.
    async fn reader_images(&self, ctx: &ProviderContext, chapter_url: &str) -> Result<Vec<String>, ScraperError>;

    fn serves_host(&self, host: &str) -> bool {
        let host = host.trim_start_matches("www.");
        self.hosts()
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            key: self.key().to_string(),
            label: self.label().to_string(),
            hosts: self.hosts().iter().map(|h| h.to_string()).collect(),
            supports_custom_host: self.supports_custom_host(),
        }
    }
}

/// Named adapters plus the generic fallback.
#[derive(Clone)]
pub struct ProviderRegistry {
    named: Vec<Arc<dyn Provider>>,
    fallback: Arc<dyn Provider>,
}

impl ProviderRegistry {
    /// Registry with the built-in adapters sharing one fetcher and browser.
    pub fn new(fetcher: Arc<dyn PageFetcher>, browser: Arc<dyn BrowserEngine>) -> Self {
        Self {
            named: vec![
                Arc::new(MadaraProvider::new(TOONGOD, fetcher.clone())),
                Arc::new(MadaraProvider::new(MANGAFORFREE, fetcher.clone())),
            ],
            fallback: Arc::new(GenericProvider::new(fetcher, browser)),
        }
    }

    pub fn with_providers(named: Vec<Arc<dyn Provider>>, fallback: Arc<dyn Provider>) -> Self {
        Self { named, fallback }
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Provider>> {
        let key = key.trim().to_ascii_lowercase();
        self.named
            .iter()
            .chain(std::iter::once(&self.fallback))
            .find(|p| p.key() == key)
            .cloned()
    }

    pub fn list(&self) -> Vec<ProviderInfo> {
        self.named
            .iter()
            .chain(std::iter::once(&self.fallback))
            .map(|p| p.info())
            .collect()
    }

    /// Pick the adapter for `base_url`, honouring an optional site hint.
    pub fn resolve(&self, base_url: &str, hint: Option<&str>) -> Result<Arc<dyn Provider>, ScraperError> {
        let base_url = base_url.trim();
        if base_url.is_empty() {
            return Err(ScraperError::ProviderUnavailable("base_url is empty".to_string()));
        }
        let host = host_of(base_url)
            .ok_or_else(|| ScraperError::ProviderUnavailable(format!("invalid base_url: {}", base_url)))?;

        if let Some(hint) = hint.map(str::trim).filter(|h| !h.is_empty()) {
            let provider = self
                .get(hint)
                .ok_or_else(|| ScraperError::ProviderUnavailable(format!("unknown provider: {}", hint)))?;
            if provider.serves_host(&host) || provider.supports_custom_host() {
                return Ok(provider);
            }
            return Err(ScraperError::ProviderUnavailable(format!(
                "provider {} does not serve host {}",
                provider.key(),
                host
            )));
        }

        if let Some(provider) = self.named.iter().find(|p| p.serves_host(&host)) {
            return Ok(provider.clone());
        }
        debug!("No named provider for {}, using {}", host, self.fallback.key());
        Ok(self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::{FetchedBytes, FetchedPage, PageRequest, UnavailableBrowser};

    struct NoFetch;

    #[async_trait]
    impl PageFetcher for NoFetch {
        async fn fetch_page(&self, request: &PageRequest) -> Result<FetchedPage, ScraperError> {
            Err(ScraperError::Transport(format!("offline: {}", request.url)))
        }

        async fn fetch_bytes(&self, request: &PageRequest) -> Result<FetchedBytes, ScraperError> {
            Err(ScraperError::Transport(format!("offline: {}", request.url)))
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(Arc::new(NoFetch), Arc::new(UnavailableBrowser))
    }

    #[test]
    fn test_resolve_by_host() {
        let reg = registry();
        assert_eq!(reg.resolve("https://www.toongod.org/", None).unwrap().key(), "toongod");
        assert_eq!(reg.resolve("https://mangaforfree.com", None).unwrap().key(), "mangaforfree");
        assert_eq!(reg.resolve("https://other.test", None).unwrap().key(), "generic");
    }

    #[test]
    fn test_resolve_with_hint() {
        let reg = registry();
        assert_eq!(reg.resolve("https://toongod.org", Some("TOONGOD")).unwrap().key(), "toongod");
        assert_eq!(reg.resolve("https://mirror.test", Some("generic")).unwrap().key(), "generic");

        let err = reg.resolve("https://mirror.test", Some("toongod")).err().unwrap();
        assert_eq!(err.code(), crate::error::ErrorCode::ProviderUnavailable);
        let err = reg.resolve("https://toongod.org", Some("nope")).err().unwrap();
        assert_eq!(err.code(), crate::error::ErrorCode::ProviderUnavailable);
    }

    #[test]
    fn test_resolve_rejects_bad_base_url() {
        let reg = registry();
        assert!(reg.resolve("  ", None).is_err());
        assert!(reg.resolve("not a url", None).is_err());
    }

    #[test]
    fn test_list_includes_fallback() {
        let keys: Vec<_> = registry().list().into_iter().map(|p| p.key).collect();
        assert_eq!(keys, vec!["toongod", "mangaforfree", "generic"]);
    }

    #[test]
    fn test_url_builders() {
        let reg = registry();
        let p = reg.get("toongod").unwrap();
        assert_eq!(
            p.chapter_url("https://toongod.org/", "solo", "chapter-1"),
            "https://toongod.org/webtoon/solo/chapter-1/"
        );
        let p = reg.get("mangaforfree").unwrap();
        assert_eq!(p.manga_url("https://mangaforfree.com", "solo"), "https://mangaforfree.com/manga/solo/");
    }
}
