//! Wiring of the store, HTTP stack and services from resolved settings.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::alerts::{AlertEngine, HttpWebhookSender, WebhookSender};
use super::download::{DownloadEvent, DownloadService};
use crate::config::{Config, Settings};
use crate::error::ScraperError;
use crate::providers::ProviderRegistry;
use crate::repository::TaskStore;
use crate::scrapers::browser::default_engine;
use crate::scrapers::{
    ChallengeResolver, ChallengeSolver, CookieStore, FlareSolverrClient, HttpClient, PageFetcher,
    SolvedCookieCache,
};

/// Everything a command or the server needs, built once per process.
pub struct ServiceContext {
    pub settings: Settings,
    pub config: Config,
    pub store: Arc<TaskStore>,
    pub download: Arc<DownloadService>,
    pub alerts: Arc<AlertEngine>,
}

impl ServiceContext {
    pub fn build(settings: Settings, config: Config) -> Result<Self, ScraperError> {
        Self::build_with_events(settings, config, None)
    }

    /// Like [`ServiceContext::build`], streaming download events to `events`.
    pub fn build_with_events(
        settings: Settings,
        config: Config,
        events: Option<mpsc::Sender<DownloadEvent>>,
    ) -> Result<Self, ScraperError> {
        settings.ensure_directories()?;
        let store = Arc::new(TaskStore::open(&settings.database_path())?);

        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpClient::new(config.http.client_config())?);
        let browser = default_engine(config.http.chrome_path.as_deref().map(PathBuf::from));
        let registry = Arc::new(ProviderRegistry::new(fetcher.clone(), browser));

        let solver: Option<Arc<dyn ChallengeSolver>> = match config.http.solver_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Some(Arc::new(FlareSolverrClient::new(
                url.trim(),
                config.http.solver_timeout(),
            )?)),
            _ => None,
        };
        let challenges = Arc::new(ChallengeResolver::new(
            solver,
            Arc::new(SolvedCookieCache::new()),
        ));

        let mut download = DownloadService::new(
            store.clone(),
            registry,
            fetcher,
            challenges,
            Arc::new(CookieStore::new()),
            config.download_config(&settings),
        );
        if let Some(tx) = events {
            download = download.with_events(tx);
        }

        let sender: Arc<dyn WebhookSender> = Arc::new(HttpWebhookSender::new()?);
        let alerts = Arc::new(AlertEngine::new(store.clone(), config.alerts.clone(), sender));

        Ok(Self {
            settings,
            config,
            store,
            download: Arc::new(download),
            alerts,
        })
    }
}
