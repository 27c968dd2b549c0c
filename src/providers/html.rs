//! HTML helpers shared by the adapters.

use scraper::{ElementRef, Selector};
use url::Url;

use crate::error::ScraperError;

/// Lazy-loading attributes checked before `src`.
const IMAGE_ATTRS: &[&str] = &["data-src", "data-lazy-src", "data-original", "data-cfsrc", "src"];

/// Compile a CSS selector.
pub fn selector(css: &str) -> Result<Selector, ScraperError> {
    Selector::parse(css).map_err(|e| ScraperError::Parse(format!("invalid selector {}: {:?}", css, e)))
}

/// Resolve `href` against `base`. Returns `None` for unusable links.
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("data:") || href.starts_with("javascript:") {
        return None;
    }
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

/// Image URL of an `<img>`, preferring lazy-load attributes.
pub fn image_src(img: &ElementRef, page_url: &str) -> Option<String> {
    IMAGE_ATTRS
        .iter()
        .filter_map(|attr| img.value().attr(attr))
        .find_map(|value| absolutize(page_url, value))
}

/// Whether a URL's path ends in a known image extension.
pub fn looks_like_image(url: &str) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| url.to_ascii_lowercase());
    [".jpg", ".jpeg", ".png", ".webp", ".gif", ".avif"]
        .iter()
        .any(|ext| path.ends_with(ext))
}

/// Last non-empty path segment of a URL, used as an id.
pub fn last_segment(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(|s| s.to_string())
}

/// Collapse whitespace in element text.
pub fn clean_text(el: &ElementRef) -> String {
    el.text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop duplicates while keeping first-seen order.
pub fn dedup_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}
