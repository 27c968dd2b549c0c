//! Cookies from uploaded browser storage-state files.
//!
//! Accepts Playwright-style `{"cookies": [...]}` documents or a bare cookie
//! array. Parsed files are cached by path and modification time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ScraperError;

/// Window within which a cookie counts as "expiring".
const EXPIRING_WINDOW_HOURS: i64 = 24;

/// One cookie from a storage-state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageCookie {
    #[serde(alias = "key")]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix seconds. Missing or negative means a session cookie.
    #[serde(default, alias = "expirationDate")]
    pub expires: Option<f64>,
}

fn default_path() -> String {
    "/".to_string()
}

impl StorageCookie {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = self.expires.filter(|e| *e > 0.0)?;
        Utc.timestamp_opt(secs as i64, 0).single()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }

    /// Domain match with an optional leading dot on the cookie domain.
    pub fn matches_host(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return false;
        }
        let host = host.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StorageStateDoc {
    State {
        #[serde(default)]
        cookies: Vec<StorageCookie>,
    },
    Bare(Vec<StorageCookie>),
}

/// Parse a storage-state document.
pub fn parse_storage_state(json: &str) -> Result<Vec<StorageCookie>, ScraperError> {
    let doc: StorageStateDoc = serde_json::from_str(json)
        .map_err(|e| ScraperError::Parse(format!("invalid storage state: {}", e)))?;
    Ok(match doc {
        StorageStateDoc::State { cookies } => cookies,
        StorageStateDoc::Bare(cookies) => cookies,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStatus {
    Valid,
    Expiring,
    Expired,
    /// Only session cookies, no expiry known.
    Session,
}

/// Summary of how long a cookie set stays usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieExpiry {
    pub total: usize,
    pub expired: usize,
    pub earliest_expiry: Option<DateTime<Utc>>,
    pub status: ExpiryStatus,
}

/// Summarise expiry at `now`. An empty set counts as expired.
pub fn summarize_expiry(cookies: &[StorageCookie], now: DateTime<Utc>) -> CookieExpiry {
    let expired = cookies.iter().filter(|c| c.is_expired(now)).count();
    let earliest_expiry = cookies
        .iter()
        .filter(|c| !c.is_expired(now))
        .filter_map(|c| c.expires_at())
        .min();

    let status = if cookies.is_empty() || expired == cookies.len() {
        ExpiryStatus::Expired
    } else {
        match earliest_expiry {
            Some(at) if at - now <= Duration::hours(EXPIRING_WINDOW_HOURS) => ExpiryStatus::Expiring,
            Some(_) => ExpiryStatus::Valid,
            None => ExpiryStatus::Session,
        }
    };

    CookieExpiry {
        total: cookies.len(),
        expired,
        earliest_expiry,
        status,
    }
}

type CacheEntry = (Option<SystemTime>, Arc<Vec<StorageCookie>>);

/// Caches parsed storage-state files.
#[derive(Debug, Default)]
pub struct CookieStore {
    cache: RwLock<HashMap<PathBuf, CacheEntry>>,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load cookies from a file, reusing the cached parse when the file's
    /// modification time is unchanged.
    pub async fn load(&self, path: &Path) -> Result<Arc<Vec<StorageCookie>>, ScraperError> {
        let modified = tokio::fs::metadata(path).await?.modified().ok();

        if let Some((cached_mtime, cookies)) = self.cache.read().await.get(path) {
            if cached_mtime.is_some() && *cached_mtime == modified {
                return Ok(cookies.clone());
            }
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let cookies = Arc::new(parse_storage_state(&contents)?);
        debug!("Loaded {} cookies from {}", cookies.len(), path.display());
        self.cache
            .write()
            .await
            .insert(path.to_path_buf(), (modified, cookies.clone()));
        Ok(cookies)
    }

    /// Unexpired cookies from `path` that apply to `host`.
    pub async fn cookies_for_host(
        &self,
        path: &Path,
        host: &str,
    ) -> Result<HashMap<String, String>, ScraperError> {
        let now = Utc::now();
        let cookies = self.load(path).await?;
        Ok(cookies
            .iter()
            .filter(|c| c.matches_host(host) && !c.is_expired(now))
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect())
    }

    pub async fn expiry(&self, path: &Path) -> Result<CookieExpiry, ScraperError> {
        let cookies = self.load(path).await?;
        Ok(summarize_expiry(&cookies, Utc::now()))
    }
}

/// Where the storage state for a provider is kept.
pub fn state_path(state_dir: &Path, provider: &str) -> PathBuf {
    let safe: String = provider
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    state_dir.join(format!("{}.json", safe))
}

/// Validate and write an uploaded storage state. Returns the written path and
/// the number of cookies it holds.
pub async fn save_storage_state(
    state_dir: &Path,
    provider: &str,
    contents: &str,
) -> Result<(PathBuf, usize), ScraperError> {
    let cookies = parse_storage_state(contents)?;
    tokio::fs::create_dir_all(state_dir).await?;
    let path = state_path(state_dir, provider);
    tokio::fs::write(&path, contents).await?;
    Ok((path, cookies.len()))
}
