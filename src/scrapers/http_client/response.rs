//! HTTP response wrappers.

use std::collections::HashMap;

/// A fetched HTML/text page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// A fetched binary resource.
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    pub status: u16,
    pub url: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Collect response headers with lower-cased names.
pub(crate) fn collect_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            out.insert(name.as_str().to_ascii_lowercase(), v.to_string());
        }
    }
    out
}
