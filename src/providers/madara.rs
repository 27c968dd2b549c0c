//! Adapters for sites running the Madara (WP-Manga) WordPress theme.
//!
//! The parsing functions here are shared with the generic adapter, which
//! tries Madara markup first before falling back to heuristics.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use tracing::debug;

use super::html::{absolutize, clean_text, dedup_preserving_order, image_src, last_segment, selector};
use super::types::{CatalogPage, ChapterSummary, MangaSummary};
use super::Provider;
use crate::error::ScraperError;
use crate::scrapers::{fetch_html, PageFetcher, PageRequest, ProviderContext};

/// Static description of a Madara site.
#[derive(Debug, Clone, Copy)]
pub struct MadaraSite {
    pub key: &'static str,
    pub label: &'static str,
    pub hosts: &'static [&'static str],
    /// Path segment under which series live (`manga`, `webtoon`, ...).
    pub manga_path: &'static str,
}

pub const TOONGOD: MadaraSite = MadaraSite {
    key: "toongod",
    label: "ToonGod",
    hosts: &["toongod.org"],
    manga_path: "webtoon",
};

pub const MANGAFORFREE: MadaraSite = MadaraSite {
    key: "mangaforfree",
    label: "MangaForFree",
    hosts: &["mangaforfree.com"],
    manga_path: "manga",
};

/// Listing containers and the title link inside each, most specific first.
const LISTING_PATTERNS: &[(&str, &str)] = &[
    ("div.c-tabs-item__content", ".post-title a"),
    ("div.page-item-detail", ".post-title a"),
    ("div.page-item-detail", "h3 a"),
    ("div.page-listing-item", "h3 a"),
];

const NEXT_PAGE: &str = ".nav-previous a, a.nextpostslink, a.next.page-numbers";
const READER_IMAGES: &[&str] = &["div.reading-content img", "div.page-break img"];

pub struct MadaraProvider {
    site: MadaraSite,
    fetcher: Arc<dyn PageFetcher>,
}

impl MadaraProvider {
    pub fn new(site: MadaraSite, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { site, fetcher }
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

pub(crate) fn trim_base(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

/// Parse search results or a catalog page.
pub(crate) fn parse_listing(html: &str, page_url: &str) -> Result<Vec<MangaSummary>, ScraperError> {
    let document = Html::parse_document(html);
    let img = selector("img")?;

    for (container, link) in LISTING_PATTERNS {
        let container_sel = selector(container)?;
        let link_sel = selector(link)?;
        let mut items = Vec::new();

        for element in document.select(&container_sel) {
            let Some(anchor) = element.select(&link_sel).next() else {
                continue;
            };
            let Some(url) = anchor.value().attr("href").and_then(|h| absolutize(page_url, h)) else {
                continue;
            };
            let title = clean_text(&anchor);
            let Some(id) = last_segment(&url) else {
                continue;
            };
            if title.is_empty() {
                continue;
            }
            let cover_url = element.select(&img).next().and_then(|i| image_src(&i, page_url));
            items.push(MangaSummary {
                id,
                title,
                url,
                cover_url,
            });
        }

        if !items.is_empty() {
            return Ok(items);
        }
    }
    Ok(Vec::new())
}

pub(crate) fn parse_has_more(html: &str) -> Result<bool, ScraperError> {
    let document = Html::parse_document(html);
    Ok(document.select(&selector(NEXT_PAGE)?).next().is_some())
}

/// Parse a chapter list. Madara lists newest first; the result is in
/// reading order.
pub(crate) fn parse_chapters(html: &str, page_url: &str) -> Result<Vec<ChapterSummary>, ScraperError> {
    let document = Html::parse_fragment(html);
    let item_sel = selector("li.wp-manga-chapter")?;
    let link_sel = selector("a")?;

    let mut chapters = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for item in document.select(&item_sel) {
        let Some(anchor) = item.select(&link_sel).find(|a| a.value().attr("href").is_some()) else {
            continue;
        };
        let Some(url) = anchor.value().attr("href").and_then(|h| absolutize(page_url, h)) else {
            continue;
        };
        let Some(id) = last_segment(&url) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        let title = clean_text(&anchor);
        chapters.push(ChapterSummary {
            title: if title.is_empty() { id.clone() } else { title },
            id,
            url,
        });
    }
    chapters.reverse();
    Ok(chapters)
}

/// WordPress post id of a series page, used by the admin-ajax chapter list.
pub(crate) fn parse_post_id(html: &str) -> Result<Option<String>, ScraperError> {
    let document = Html::parse_document(html);
    let holder = selector("#manga-chapters-holder")?;
    if let Some(id) = document
        .select(&holder)
        .next()
        .and_then(|el| el.value().attr("data-id"))
    {
        return Ok(Some(id.to_string()));
    }

    let re = Regex::new(r#"manga_id["']?\s*[:=]\s*["']?(\d+)"#)
        .map_err(|e| ScraperError::Parse(e.to_string()))?;
    let script = selector("script")?;
    for el in document.select(&script) {
        let text: String = el.text().collect();
        if let Some(cap) = re.captures(&text) {
            return Ok(Some(cap[1].to_string()));
        }
    }
    Ok(None)
}

pub(crate) fn parse_reader_images(html: &str, page_url: &str) -> Result<Vec<String>, ScraperError> {
    let document = Html::parse_document(html);
    for css in READER_IMAGES {
        let sel = selector(css)?;
        let urls: Vec<String> = document
            .select(&sel)
            .filter_map(|img| image_src(&img, page_url))
            .collect();
        if !urls.is_empty() {
            return Ok(dedup_preserving_order(urls));
        }
    }
    Ok(Vec::new())
}

/// Fetch a chapter list, trying the series page, the `ajax/chapters`
/// endpoint and finally `admin-ajax.php`.
pub(crate) async fn fetch_chapter_list<G, P, GF, PF>(
    get: G,
    post: P,
    base_url: &str,
    manga_url: &str,
) -> Result<Vec<ChapterSummary>, ScraperError>
where
    G: Fn(String) -> GF,
    P: Fn(String, Vec<(String, String)>) -> PF,
    GF: std::future::Future<Output = Result<String, ScraperError>>,
    PF: std::future::Future<Output = Result<String, ScraperError>>,
{
    let page = get(manga_url.to_string()).await?;
    let chapters = parse_chapters(&page, manga_url)?;
    if !chapters.is_empty() {
        return Ok(chapters);
    }

    let ajax_url = format!("{}/ajax/chapters/", manga_url.trim_end_matches('/'));
    debug!("No inline chapter list on {}, trying {}", manga_url, ajax_url);
    match post(ajax_url, Vec::new()).await {
        Ok(body) => {
            let chapters = parse_chapters(&body, manga_url)?;
            if !chapters.is_empty() {
                return Ok(chapters);
            }
        }
        Err(e) => debug!("ajax/chapters failed for {}: {}", manga_url, e),
    }

    let Some(post_id) = parse_post_id(&page)? else {
        return Ok(Vec::new());
    };
    let admin_ajax = format!("{}/wp-admin/admin-ajax.php", trim_base(base_url));
    let body = post(
        admin_ajax,
        vec![
            ("action".to_string(), "manga_get_chapters".to_string()),
            ("manga".to_string(), post_id),
        ],
    )
    .await?;
    parse_chapters(&body, manga_url)
}

pub(crate) fn catalog_url(base_url: &str, path: &str, page: u32, orderby: Option<&str>) -> String {
    let path = path.trim_matches('/');
    let mut url = if page <= 1 {
        format!("{}/{}/", trim_base(base_url), path)
    } else {
        format!("{}/{}/page/{}/", trim_base(base_url), path, page)
    };
    if let Some(order) = orderby.map(str::trim).filter(|o| !o.is_empty()) {
        url.push_str("?m_orderby=");
        url.push_str(&urlencoding::encode(order));
    }
    url
}

pub(crate) fn search_url(base_url: &str, keyword: &str) -> String {
    format!(
        "{}/?s={}&post_type=wp-manga",
        trim_base(base_url),
        urlencoding::encode(keyword.trim())
    )
}

#[async_trait]
impl Provider for MadaraProvider {
    fn key(&self) -> &'static str {
        self.site.key
    }

    fn label(&self) -> &'static str {
        self.site.label
    }

    fn hosts(&self) -> &'static [&'static str] {
        self.site.hosts
    }

    fn manga_url(&self, base_url: &str, manga_id: &str) -> String {
        format!("{}/{}/{}/", trim_base(base_url), self.site.manga_path, manga_id)
    }

    fn chapter_url(&self, base_url: &str, manga_id: &str, chapter_id: &str) -> String {
        format!(
            "{}/{}/{}/{}/",
            trim_base(base_url),
            self.site.manga_path,
            manga_id,
            chapter_id
        )
    }

    async fn search(&self, ctx: &ProviderContext, keyword: &str) -> Result<Vec<MangaSummary>, ScraperError> {
        let url = search_url(&ctx.base_url, keyword);
        let body = self.get(ctx, &url).await?;
        parse_listing(&body, &url)
    }

    async fn catalog(
        &self,
        ctx: &ProviderContext,
        page: u32,
        orderby: Option<&str>,
        path: Option<&str>,
    ) -> Result<CatalogPage, ScraperError> {
        let path = path.filter(|p| !p.trim().is_empty()).unwrap_or(self.site.manga_path);
        let url = catalog_url(&ctx.base_url, path, page, orderby);
        let body = self.get(ctx, &url).await?;
        Ok(CatalogPage {
            page: page.max(1),
            has_more: parse_has_more(&body)?,
            items: parse_listing(&body, &url)?,
        })
    }

    async fn chapters(&self, ctx: &ProviderContext, manga_url: &str) -> Result<Vec<ChapterSummary>, ScraperError> {
        fetch_chapter_list(
            |url| async move { self.get(ctx, &url).await },
            |url, form| async move { self.post(ctx, &url, form).await },
            &ctx.base_url,
            manga_url,
        )
        .await
    }

    async fn reader_images(&self, ctx: &ProviderContext, chapter_url: &str) -> Result<Vec<String>, ScraperError> {
        let body = self.get(ctx, chapter_url).await?;
        let images = parse_reader_images(&body, chapter_url)?;
        debug!("{}: {} reader images on {}", self.site.key, images.len(), chapter_url);
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <div class="page-item-detail">
          <div class="item-thumb"><img data-src="/covers/solo.jpg" src="data:,"></div>
          <h3 class="h5 post-title"><a href="https://site.test/manga/solo-leveling/"> Solo
            Leveling </a></h3>
        </div>
        <div class="page-item-detail">
          <h3 class="post-title"><a href="/manga/omniscient/">Omniscient</a></h3>
        </div>
        <div class="nav-previous"><a href="/manga/page/2/">Older</a></div>
    "#;

    #[test]
    fn test_parse_listing() {
        let items = parse_listing(LISTING, "https://site.test/manga/").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "solo-leveling");
        assert_eq!(items[0].title, "Solo Leveling");
        assert_eq!(items[0].cover_url.as_deref(), Some("https://site.test/covers/solo.jpg"));
        assert_eq!(items[1].url, "https://site.test/manga/omniscient/");
        assert!(parse_has_more(LISTING).unwrap());
        assert!(!parse_has_more("<html></html>").unwrap());
    }

    #[test]
    fn test_parse_chapters_in_reading_order() {
        let html = r#"
            <ul class="main version-chap">
              <li class="wp-manga-chapter"><a href="/manga/x/chapter-2/">Chapter 2</a>
                  <span class="chapter-release-date"><a href="/manga/x/chapter-2/">new</a></span></li>
              <li class="wp-manga-chapter"><a href="/manga/x/chapter-1/">Chapter 1</a></li>
            </ul>"#;
        let chapters = parse_chapters(html, "https://site.test/manga/x/").unwrap();
        let ids: Vec<_> = chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["chapter-1", "chapter-2"]);
        assert_eq!(chapters[1].title, "Chapter 2");
    }

    #[test]
    fn test_parse_post_id() {
        let html = r#"<div id="manga-chapters-holder" data-id="4242"></div>"#;
        assert_eq!(parse_post_id(html).unwrap().as_deref(), Some("4242"));
        let html = r#"<script>var manga = {"manga_id":"77"};</script>"#;
        assert_eq!(parse_post_id(html).unwrap().as_deref(), Some("77"));
        assert_eq!(parse_post_id("<p></p>").unwrap(), None);
    }

    #[test]
    fn test_parse_reader_images() {
        let html = r#"
            <div class="reading-content">
              <div class="page-break"><img data-src=" https://cdn.test/1.jpg "></div>
              <div class="page-break"><img src="https://cdn.test/2.webp"></div>
              <div class="page-break"><img src="https://cdn.test/1.jpg"></div>
            </div>"#;
        let images = parse_reader_images(html, "https://site.test/manga/x/chapter-1/").unwrap();
        assert_eq!(images, vec!["https://cdn.test/1.jpg", "https://cdn.test/2.webp"]);
    }

    #[test]
    fn test_urls() {
        assert_eq!(
            catalog_url("https://site.test/", "manga", 3, Some("latest")),
            "https://site.test/manga/page/3/?m_orderby=latest"
        );
        assert_eq!(catalog_url("https://site.test", "/webtoon/", 1, None), "https://site.test/webtoon/");
        assert_eq!(
            search_url("https://site.test", "solo leveling"),
            "https://site.test/?s=solo%20leveling&post_type=wp-manga"
        );
    }
}
