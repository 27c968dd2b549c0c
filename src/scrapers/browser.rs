//! Browser rendering for reader pages that build their image list in JS.
//!
//! Uses chromiumoxide (CDP) when built with the `browser` feature. Without
//! it, every render fails with `BrowserUnavailable`.

use async_trait::async_trait;

use super::context::ProviderContext;
use crate::error::ScraperError;

/// Renders a page in a real browser and returns the final HTML.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn render(&self, ctx: &ProviderContext, url: &str) -> Result<String, ScraperError>;
}

/// Engine used when no browser is available.
#[derive(Debug, Default, Clone)]
pub struct UnavailableBrowser;

#[async_trait]
impl BrowserEngine for UnavailableBrowser {
    async fn render(&self, _ctx: &ProviderContext, url: &str) -> Result<String, ScraperError> {
        Err(ScraperError::BrowserUnavailable(format!(
            "browser support not compiled in; cannot render {}",
            url
        )))
    }
}

/// The best engine this build can offer.
pub fn default_engine(chrome_path: Option<std::path::PathBuf>) -> std::sync::Arc<dyn BrowserEngine> {
    #[cfg(feature = "browser")]
    {
        std::sync::Arc::new(chromium::ChromiumBrowser::new(chrome_path))
    }
    #[cfg(not(feature = "browser"))]
    {
        let _ = chrome_path;
        std::sync::Arc::new(UnavailableBrowser)
    }
}

#[cfg(feature = "browser")]
pub mod chromium {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetUserAgentOverrideParams};
    use chromiumoxide::{Browser, BrowserConfig};
    use futures::StreamExt;
    use tokio::sync::Mutex;
    use tracing::{debug, info, warn};

    use super::BrowserEngine;
    use crate::error::ScraperError;
    use crate::scrapers::context::{host_of, ProviderContext};

    /// Headless Chromium launched on first use and reused afterwards.
    pub struct ChromiumBrowser {
        chrome_path: Option<PathBuf>,
        browser: Mutex<Option<Arc<Browser>>>,
    }

    impl ChromiumBrowser {
        pub fn new(chrome_path: Option<PathBuf>) -> Self {
            Self {
                chrome_path,
                browser: Mutex::new(None),
            }
        }

        async fn ensure_browser(&self) -> Result<Arc<Browser>, ScraperError> {
            let mut guard = self.browser.lock().await;
            if let Some(browser) = guard.as_ref() {
                return Ok(browser.clone());
            }

            info!("Launching headless browser");
            let mut builder = BrowserConfig::builder();
            if let Some(ref path) = self.chrome_path {
                builder = builder.chrome_executable(path);
            }
            let config = builder
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--no-sandbox")
                .arg("--disable-gpu")
                .build()
                .map_err(ScraperError::BrowserUnavailable)?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| ScraperError::BrowserUnavailable(e.to_string()))?;

            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            let browser = Arc::new(browser);
            *guard = Some(browser.clone());
            Ok(browser)
        }
    }

    #[async_trait]
    impl BrowserEngine for ChromiumBrowser {
        async fn render(&self, ctx: &ProviderContext, url: &str) -> Result<String, ScraperError> {
            let browser = self.ensure_browser().await?;
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| ScraperError::Request(e.to_string()))?;

            if let Some(ref ua) = ctx.user_agent {
                page.execute(SetUserAgentOverrideParams::new(ua.clone()))
                    .await
                    .map_err(|e| ScraperError::Request(e.to_string()))?;
            }

            if let Some(domain) = host_of(url) {
                for (name, value) in &ctx.cookies {
                    match CookieParam::builder()
                        .name(name.clone())
                        .value(value.clone())
                        .domain(domain.clone())
                        .build()
                    {
                        Ok(param) => {
                            if let Err(e) = page.set_cookie(param).await {
                                warn!("Failed to set cookie {}: {}", name, e);
                            }
                        }
                        Err(e) => warn!("Failed to build cookie {}: {}", name, e),
                    }
                }
            }

            debug!("Rendering {}", url);
            page.goto(url)
                .await
                .map_err(|e| ScraperError::Request(e.to_string()))?;
            let _ = page.wait_for_navigation().await;
            tokio::time::sleep(Duration::from_millis(1500)).await;

            let content = page
                .content()
                .await
                .map_err(|e| ScraperError::Request(e.to_string()));
            let _ = page.close().await;
            content
        }
    }
}
