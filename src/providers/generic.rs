//! Fallback adapter for hosts without a dedicated provider.
//!
//! Tries Madara markup first, then falls back to heuristics over common
//! reader layouts and inline script image arrays.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use tracing::{debug, info};

use super::html::{absolutize, clean_text, dedup_preserving_order, image_src, last_segment, looks_like_image, selector};
use super::madara::{self, catalog_url, fetch_chapter_list, search_url, trim_base};
use super::types::{CatalogPage, ChapterSummary, MangaSummary};
use super::Provider;
use crate::error::ScraperError;
use crate::scrapers::{fetch_html, BrowserEngine, PageFetcher, PageRequest, ProviderContext};

const READER_SELECTORS: &[&str] = &[
    "div.reading-content img",
    "div.read-content img",
    "div.page-break img",
    "div#readerarea img",
    "div.reader-area img",
    "div.chapter-content img",
    "div.entry-content img",
    "main img",
    "img[loading='lazy']",
];

/// Substrings that mark site chrome rather than chapter pages.
const CHROME_MARKERS: &[&str] = &["logo", "icon", "avatar", "banner"];

pub struct GenericProvider {
    fetcher: Arc<dyn PageFetcher>,
    browser: Arc<dyn BrowserEngine>,
}

impl GenericProvider {
    pub fn new(fetcher: Arc<dyn PageFetcher>, browser: Arc<dyn BrowserEngine>) -> Self {
        Self { fetcher, browser }
    }

    async fn get(&self, ctx: &ProviderContext, url: &str) -> Result<String, ScraperError> {
        let request = PageRequest::from_context(ctx, url);
        Ok(fetch_html(self.fetcher.as_ref(), &request).await?.body)
    }

    async fn post(
        &self,
        ctx: &ProviderContext,
        url: &str,
        form: Vec<(String, String)>,
    ) -> Result<String, ScraperError> {
        let request = PageRequest::from_context(ctx, url).with_form(form);
        Ok(fetch_html(self.fetcher.as_ref(), &request).await?.body)
    }
}

fn is_page_image(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    looks_like_image(url) && !CHROME_MARKERS.iter().any(|m| lower.contains(m))
}

/// Extract reader images from rendered or fetched HTML.
pub(crate) fn extract_reader_images(html: &str, page_url: &str) -> Result<Vec<String>, ScraperError> {
    let document = Html::parse_document(html);
    for css in READER_SELECTORS {
        let sel = selector(css)?;
        let urls: Vec<String> = document
            .select(&sel)
            .filter_map(|img| image_src(&img, page_url))
            .filter(|u| is_page_image(u))
            .collect();
        if !urls.is_empty() {
            debug!("Reader images matched by {}", css);
            return Ok(dedup_preserving_order(urls));
        }
    }

    // Readers that build the page list in JS embed the URLs in a script.
    let re = Regex::new(r#"https?:(?:\\?/){2}[^"'\s<>]+?\.(?:jpe?g|png|webp)"#)
        .map_err(|e| ScraperError::Parse(e.to_string()))?;
    let script = selector("script")?;
    let mut urls = Vec::new();
    for el in document.select(&script) {
        let text: String = el.text().collect();
        for m in re.find_iter(&text) {
            let url = m.as_str().replace("\\/", "/");
            if is_page_image(&url) {
                urls.push(url);
            }
        }
    }
    Ok(dedup_preserving_order(urls))
}

/// Links that look like series pages, for sites without Madara listings.
pub(crate) fn heuristic_listing(html: &str, page_url: &str) -> Result<Vec<MangaSummary>, ScraperError> {
    let document = Html::parse_document(html);
    let anchor = selector("a[href]")?;
    let mut seen = std::collections::HashSet::new();
    let mut items = Vec::new();
    for a in document.select(&anchor) {
        let Some(url) = a.value().attr("href").and_then(|h| absolutize(page_url, h)) else {
            continue;
        };
        let lower = url.to_ascii_lowercase();
        let series = (lower.contains("/manga/") || lower.contains("/series/") || lower.contains("/webtoon/"))
            && !lower.contains("chapter")
            && !lower.contains("/page/");
        if !series {
            continue;
        }
        let title = a
            .value()
            .attr("title")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| clean_text(&a));
        let Some(id) = last_segment(&url) else {
            continue;
        };
        if title.is_empty() || ["manga", "series", "webtoon"].contains(&id.as_str()) {
            continue;
        }
        if seen.insert(url.clone()) {
            items.push(MangaSummary {
                id,
                title,
                url,
                cover_url: None,
            });
        }
    }
    Ok(items)
}

/// Links that look like chapters, in document order.
pub(crate) fn heuristic_chapters(html: &str, page_url: &str) -> Result<Vec<ChapterSummary>, ScraperError> {
    let document = Html::parse_document(html);
    let anchor = selector("a[href]")?;
    let mut seen = std::collections::HashSet::new();
    let mut chapters = Vec::new();
    for a in document.select(&anchor) {
        let Some(url) = a.value().attr("href").and_then(|h| absolutize(page_url, h)) else {
            continue;
        };
        let lower = url.to_ascii_lowercase();
        let chapter_like = lower.contains("chapter") || lower.contains("/episode") || lower.contains("/ch-");
        let navigation = ["/page/", "/tag/", "/genre/", "/category/", "?s="]
            .iter()
            .any(|n| lower.contains(n));
        if !chapter_like || navigation {
            continue;
        }
        let Some(id) = last_segment(&url) else {
            continue;
        };
        if seen.insert(url.clone()) {
            let title = clean_text(&a);
            chapters.push(ChapterSummary {
                title: if title.is_empty() { id.clone() } else { title },
                id,
                url,
            });
        }
    }
    Ok(chapters)
}

#[async_trait]
impl Provider for GenericProvider {
    fn key(&self) -> &'static str {
        "generic"
    }

    fn label(&self) -> &'static str {
        "Generic"
    }

    fn hosts(&self) -> &'static [&'static str] {
        &[]
    }

    fn supports_custom_host(&self) -> bool {
        true
    }

    fn manga_url(&self, base_url: &str, manga_id: &str) -> String {
        format!("{}/manga/{}/", trim_base(base_url), manga_id)
    }

    fn chapter_url(&self, base_url: &str, manga_id: &str, chapter_id: &str) -> String {
        format!("{}/manga/{}/{}/", trim_base(base_url), manga_id, chapter_id)
    }

    async fn search(&self, ctx: &ProviderContext, keyword: &str) -> Result<Vec<MangaSummary>, ScraperError> {
        let url = search_url(&ctx.base_url, keyword);
        let body = self.get(ctx, &url).await?;
        let items = madara::parse_listing(&body, &url)?;
        if !items.is_empty() {
            return Ok(items);
        }
        heuristic_listing(&body, &url)
    }

    async fn catalog(
        &self,
        ctx: &ProviderContext,
        page: u32,
        orderby: Option<&str>,
        path: Option<&str>,
    ) -> Result<CatalogPage, ScraperError> {
        let path = path.filter(|p| !p.trim().is_empty()).unwrap_or("manga");
        let url = catalog_url(&ctx.base_url, path, page, orderby);
        let body = self.get(ctx, &url).await?;
        let mut items = madara::parse_listing(&body, &url)?;
        if items.is_empty() {
            items = heuristic_listing(&body, &url)?;
        }
        Ok(CatalogPage {
            page: page.max(1),
            has_more: madara::parse_has_more(&body)?,
            items,
        })
    }

    async fn chapters(&self, ctx: &ProviderContext, manga_url: &str) -> Result<Vec<ChapterSummary>, ScraperError> {
        let chapters = fetch_chapter_list(
            |url| async move { self.get(ctx, &url).await },
            |url, form| async move { self.post(ctx, &url, form).await },
            &ctx.base_url,
            manga_url,
        )
        .await;
        match chapters {
            Ok(list) if !list.is_empty() => Ok(list),
            _ => {
                let body = self.get(ctx, manga_url).await?;
                heuristic_chapters(&body, manga_url)
            }
        }
    }

    async fn reader_images(&self, ctx: &ProviderContext, chapter_url: &str) -> Result<Vec<String>, ScraperError> {
        let body = if ctx.wants_browser() {
            info!("Rendering {} in browser", chapter_url);
            self.browser.render(ctx, chapter_url).await?
        } else {
            self.get(ctx, chapter_url).await?
        };
        extract_reader_images(&body, chapter_url)
    }
}
