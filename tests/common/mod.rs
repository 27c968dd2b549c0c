//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use manga_scraper::error::ScraperError;
use manga_scraper::providers::ProviderRegistry;
use manga_scraper::repository::TaskStore;
use manga_scraper::scrapers::{
    ChallengeResolver, ChallengeSolver, CookieStore, FetchedBytes, FetchedPage, PageFetcher,
    PageRequest, SolvedChallenge, SolvedCookieCache, UnavailableBrowser,
};
use manga_scraper::services::{DownloadConfig, DownloadService};

pub const BASE_URL: &str = "https://toongod.org";

/// How the fake site answers an image request.
#[derive(Debug, Clone)]
pub enum ImageReply {
    Bytes(Vec<u8>),
    Status(u16),
}

/// In-memory site. Pages and images are keyed by URL. When `clearance` is
/// set, pages are served as a Cloudflare challenge unless the request
/// carries that cookie.
#[derive(Default)]
pub struct FakeSite {
    pages: Mutex<HashMap<String, String>>,
    images: Mutex<HashMap<String, ImageReply>>,
    clearance: Mutex<Option<String>>,
    pub page_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    pub fn image(&self, url: &str, reply: ImageReply) {
        self.images.lock().unwrap().insert(url.to_string(), reply);
    }

    pub fn require_cookie(&self, name: &str) {
        *self.clearance.lock().unwrap() = Some(name.to_string());
    }

    /// A reader page for `chapter_url` with one `<img>` per image URL, all
    /// answering with a tiny JPEG.
    pub fn chapter(&self, chapter_url: &str, images: &[&str]) {
        let imgs: String = images
            .iter()
            .map(|src| format!("<div class=\"page-break\"><img src=\"{}\"></div>", src))
            .collect();
        self.page(
            chapter_url,
            &format!(
                "<html><body><div class=\"reading-content\">{}</div></body></html>",
                imgs
            ),
        );
        for src in images {
            self.image(src, ImageReply::Bytes(vec![0xff, 0xd8, 0xff, 0xe0]));
        }
    }

    fn challenge(url: &str) -> FetchedPage {
        let mut headers = HashMap::new();
        headers.insert("server".to_string(), "cloudflare".to_string());
        headers.insert("cf-ray".to_string(), "abc123".to_string());
        FetchedPage {
            status: 403,
            url: url.to_string(),
            body: "<html><title>Just a moment...</title></html>".to_string(),
            headers,
        }
    }
}

#[async_trait]
impl PageFetcher for FakeSite {
    async fn fetch_page(&self, request: &PageRequest) -> Result<FetchedPage, ScraperError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let required = self.clearance.lock().unwrap().clone();
        if let Some(cookie) = required {
            if !request.cookies.contains_key(&cookie) {
                return Ok(Self::challenge(&request.url));
            }
        }
        let body = self.pages.lock().unwrap().get(&request.url).cloned();
        Ok(match body {
            Some(body) => FetchedPage {
                status: 200,
                url: request.url.clone(),
                body,
                headers: HashMap::new(),
            },
            None => FetchedPage {
                status: 404,
                url: request.url.clone(),
                body: "not found".to_string(),
                headers: HashMap::new(),
            },
        })
    }

    async fn fetch_bytes(&self, request: &PageRequest) -> Result<FetchedBytes, ScraperError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.images.lock().unwrap().get(&request.url).cloned();
        match reply {
            Some(ImageReply::Bytes(bytes)) => Ok(FetchedBytes {
                status: 200,
                url: request.url.clone(),
                bytes,
                content_type: Some("image/jpeg".to_string()),
            }),
            Some(ImageReply::Status(status)) => Err(ScraperError::HttpStatus {
                status,
                url: request.url.clone(),
            }),
            None => Err(ScraperError::HttpStatus {
                status: 404,
                url: request.url.clone(),
            }),
        }
    }
}

/// Solver that always hands back the same cookies.
pub struct StaticSolver {
    pub cookies: HashMap<String, String>,
    pub calls: AtomicUsize,
}

impl StaticSolver {
    pub fn clearance(name: &str, value: &str) -> Arc<Self> {
        let mut cookies = HashMap::new();
        cookies.insert(name.to_string(), value.to_string());
        Arc::new(Self {
            cookies,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChallengeSolver for StaticSolver {
    async fn solve(&self, _url: &str) -> Result<SolvedChallenge, ScraperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SolvedChallenge {
            cookies: self.cookies.clone(),
            user_agent: Some("Mozilla/5.0 (solver)".to_string()),
            body: None,
        })
    }
}

/// Solver whose backend answers every request with a server error.
#[derive(Default)]
pub struct FailingSolver {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ChallengeSolver for FailingSolver {
    async fn solve(&self, url: &str) -> Result<SolvedChallenge, ScraperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ScraperError::HttpStatus {
            status: 500,
            url: url.to_string(),
        })
    }
}

/// Download config rooted in `dir` with no waiting between attempts.
pub fn fast_config(dir: &Path) -> DownloadConfig {
    let mut config = DownloadConfig::new(dir.join("raw"), dir.join("storage_state"));
    config.retry_delay = Duration::ZERO;
    config.image_retry_schedule = vec![Duration::ZERO];
    config
}

pub fn open_store(dir: &Path) -> Arc<TaskStore> {
    Arc::new(TaskStore::open(&dir.join("tasks.db")).unwrap())
}

/// Service wired to `site`, with an optional challenge solver.
pub fn service(
    dir: &Path,
    site: Arc<FakeSite>,
    solver: Option<Arc<dyn ChallengeSolver>>,
    config: DownloadConfig,
) -> Arc<DownloadService> {
    let fetcher: Arc<dyn PageFetcher> = site;
    let registry = Arc::new(ProviderRegistry::new(
        fetcher.clone(),
        Arc::new(UnavailableBrowser),
    ));
    let challenges = Arc::new(ChallengeResolver::new(
        solver,
        Arc::new(SolvedCookieCache::new()),
    ));
    Arc::new(DownloadService::new(
        open_store(dir),
        registry,
        fetcher,
        challenges,
        Arc::new(CookieStore::new()),
        config,
    ))
}

pub fn chapter_url(manga: &str, chapter: &str) -> String {
    format!("{}/webtoon/{}/{}/", BASE_URL, manga, chapter)
}
