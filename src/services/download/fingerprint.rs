//! Request fingerprints used to deduplicate submissions.

use sha2::{Digest, Sha256};
use url::Url;

/// Lower-cased `scheme://host[:port]` with no path or trailing slash.
/// Unparseable input is lower-cased and stripped of trailing slashes.
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim();
    match Url::parse(trimmed) {
        Ok(url) if url.host_str().is_some() => {
            let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
            match url.port() {
                Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                None => format!("{}://{}", url.scheme(), host),
            }
        }
        _ => trimmed.trim_end_matches('/').to_ascii_lowercase(),
    }
}

/// SHA-256 hex over the normalized base URL, provider, manga id and chapter
/// id. Each field is length-prefixed so separators inside ids cannot shift
/// one field into the next.
pub fn request_fingerprint(base_url: &str, provider: &str, manga_id: &str, chapter_id: &str) -> String {
    let base = normalize_base_url(base_url);
    let mut hasher = Sha256::new();
    for field in [base.as_str(), provider, manga_id.trim(), chapter_id.trim()] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("HTTPS://ToonGod.org/"), "https://toongod.org");
        assert_eq!(normalize_base_url("https://toongod.org/webtoon/x"), "https://toongod.org");
        assert_eq!(normalize_base_url("http://localhost:8080//"), "http://localhost:8080");
        assert_eq!(normalize_base_url("https://site.test:443/"), "https://site.test");
        assert_eq!(normalize_base_url("Not A URL//"), "not a url");
    }

    #[test]
    fn test_fingerprint_ignores_cosmetic_differences() {
        let a = request_fingerprint("https://toongod.org/", "toongod", "solo", "ch-1");
        let b = request_fingerprint("HTTPS://TOONGOD.ORG", "toongod", "solo", "ch-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, request_fingerprint("https://toongod.org", "toongod", "solo", "ch-2"));
        assert_ne!(a, request_fingerprint("https://toongod.org", "generic", "solo", "ch-1"));
    }

    #[test]
    fn test_fingerprint_fields_do_not_run_together() {
        let a = request_fingerprint("https://toongod.org", "toongod", "a|b", "c");
        let b = request_fingerprint("https://toongod.org", "toongod", "a", "b|c");
        assert_ne!(a, b);
    }
}
