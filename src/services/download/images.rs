//! Per-image download with transient retry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use crate::error::ScraperError;
use crate::scrapers::{PageFetcher, PageRequest};

const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Replace anything outside `[A-Za-z0-9_-]` with `_`. When that changed the
/// id, a short hash of the original is appended so distinct ids such as
/// `a.b` and `a/b` keep distinct directories.
pub fn safe_component(value: &str) -> String {
    let trimmed = value.trim();
    let cleaned: String = trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        return "_".to_string();
    }
    if cleaned == trimmed {
        return cleaned;
    }
    let digest = hex::encode(Sha256::digest(trimmed.as_bytes()));
    format!("{}-{}", cleaned, &digest[..8])
}

/// Extension from the URL path, limited to known image types.
pub fn infer_extension(url: &str) -> &'static str {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or(url).to_string());
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    KNOWN_EXTENSIONS
        .iter()
        .find(|known| **known == ext)
        .copied()
        .unwrap_or("jpg")
}

pub fn image_file_name(index: usize, ext: &str) -> String {
    format!("{:03}.{}", index, ext)
}

/// Where a downloaded image ended up.
#[derive(Debug, Clone)]
pub struct SavedImage {
    pub path: PathBuf,
    /// The file already existed and was not fetched again.
    pub reused: bool,
}

async fn existing_non_empty(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
}

/// Download one image into `dir` as `{index:03}.{ext}`.
///
/// Transient failures are retried after each delay in `schedule`; the
/// final error is returned once the schedule is used up.
pub async fn download_image(
    fetcher: &dyn PageFetcher,
    request: &PageRequest,
    dir: &Path,
    index: usize,
    schedule: &[Duration],
) -> Result<SavedImage, ScraperError> {
    let path = dir.join(image_file_name(index, infer_extension(&request.url)));
    if existing_non_empty(&path).await {
        debug!("Reusing {}", path.display());
        return Ok(SavedImage { path, reused: true });
    }

    let mut attempt = 0;
    loop {
        let result = match fetcher.fetch_bytes(request).await {
            Ok(fetched) if fetched.bytes.is_empty() => Err(ScraperError::Request(format!(
                "empty image body from {}",
                request.url
            ))),
            Ok(fetched) => Ok(fetched.bytes),
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                let partial = path.with_extension("part");
                tokio::fs::write(&partial, &bytes).await?;
                tokio::fs::rename(&partial, &path).await?;
                return Ok(SavedImage { path, reused: false });
            }
            Err(e) if e.is_transient() && attempt < schedule.len() => {
                let delay = schedule[attempt];
                attempt += 1;
                warn!(
                    "Image {} failed ({}), retry {}/{} in {:?}",
                    request.url,
                    e,
                    attempt,
                    schedule.len(),
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
