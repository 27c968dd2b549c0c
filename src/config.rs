//! Configuration management for the scraper service.
//!
//! A config file is discovered with `prefer` (or passed with `--config`),
//! parsed by extension, and resolved into [`Settings`] for on-disk paths.
//! Section structs (`http`, `tasks`, `alerts`, `server`) are read by the
//! services directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scrapers::http_client::{HttpClientConfig, RequestEngine};
use crate::scrapers::rate_limiter::DEFAULT_PER_HOST_CONCURRENCY;
use crate::services::download::DEFAULT_CONCURRENCY;
use crate::services::{AlertConfig, DownloadConfig};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "scraper_tasks.db";

const RAW_SUBDIR: &str = "raw";
const STATE_SUBDIR: &str = "storage_state";

/// Environment overrides.
pub const ENV_DATA_DIR: &str = "MANGA_SCRAPER_DATA_DIR";
pub const ENV_SOLVER_URL: &str = "MANGA_SCRAPER_SOLVER_URL";
pub const ENV_ADMIN_TOKEN: &str = "MANGA_SCRAPER_ADMIN_TOKEN";

/// Resolved filesystem layout.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside `data_dir`.
    pub database_filename: String,
    /// Chapter images land under `raw_dir/{manga}/{chapter}/`.
    pub raw_dir: PathBuf,
    /// Uploaded storage-state files, one per provider.
    pub state_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        // Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("manga-scraper");
        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Create settings rooted at a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            raw_dir: data_dir.join(RAW_SUBDIR),
            state_dir: data_dir.join(STATE_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
        }
    }

    fn set_data_dir(&mut self, data_dir: PathBuf) {
        self.raw_dir = data_dir.join(RAW_SUBDIR);
        self.state_dir = data_dir.join(STATE_SUBDIR);
        self.data_dir = data_dir;
    }

    /// Full path to the task database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [&self.data_dir, &self.raw_dir, &self.state_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                tracing::error!("Failed to create {}: {}", dir.display(), e);
                e
            })?;
        }
        Ok(())
    }
}

/// Outgoing HTTP behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// `http` or `impersonate`.
    pub engine: String,
    pub timeout_sec: u64,
    pub connect_timeout_sec: u64,
    pub per_host_concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_rps: Option<f64>,
    /// FlareSolverr-compatible endpoint. Challenge solving is off when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver_url: Option<String>,
    pub solver_timeout_sec: u64,
    /// Chrome/Chromium binary for the `browser` feature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            engine: RequestEngine::default().as_str().to_string(),
            timeout_sec: 30,
            connect_timeout_sec: 10,
            per_host_concurrency: DEFAULT_PER_HOST_CONCURRENCY,
            default_rps: None,
            solver_url: None,
            solver_timeout_sec: 60,
            chrome_path: None,
        }
    }
}

impl HttpSettings {
    pub fn client_config(&self) -> HttpClientConfig {
        let engine = RequestEngine::from_str(self.engine.trim()).unwrap_or_else(|| {
            tracing::warn!("Unknown http engine '{}', using default", self.engine);
            RequestEngine::default()
        });
        HttpClientConfig {
            engine,
            timeout: Duration::from_secs(self.timeout_sec.max(1)),
            connect_timeout: Duration::from_secs(self.connect_timeout_sec.max(1)),
            per_host_concurrency: self.per_host_concurrency.max(1),
            default_rps: self.default_rps.filter(|r| *r > 0.0),
        }
    }

    pub fn solver_timeout(&self) -> Duration {
        Duration::from_secs(self.solver_timeout_sec.max(1))
    }
}

/// Task queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    pub max_retries: u32,
    pub retry_delay_sec: u64,
    pub idempotent_window_minutes: i64,
    pub stale_after_minutes: i64,
    pub retention_days: i64,
    pub default_concurrency: usize,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_sec: 15,
            idempotent_window_minutes: 30,
            stale_after_minutes: 10,
            retention_days: 7,
            default_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// HTTP server binding and admin access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Bearer token for `/api/scraper/admin/*`. Admin routes reject every
    /// caller when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            admin_token: None,
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub tasks: TaskSettings,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub server: ServerSettings,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery.
    pub async fn load() -> Self {
        match prefer::load("manga-scraper").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}; using defaults", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// TOML and YAML by extension, JSON otherwise.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// The config file's directory, if loaded from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved against `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.set_data_dir(self.resolve_path(data_dir, base_dir));
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_value(ENV_DATA_DIR) {
            tracing::debug!("Using {} from environment: {}", ENV_DATA_DIR, dir);
            self.data_dir = Some(dir);
        }
        if let Some(url) = env_value(ENV_SOLVER_URL) {
            tracing::debug!("Using {} from environment: {}", ENV_SOLVER_URL, url);
            self.http.solver_url = Some(url);
        }
        if let Some(token) = env_value(ENV_ADMIN_TOKEN) {
            self.server.admin_token = Some(token);
        }
    }

    /// Download service configuration for the resolved layout.
    pub fn download_config(&self, settings: &Settings) -> DownloadConfig {
        let mut config = DownloadConfig::new(&settings.raw_dir, &settings.state_dir);
        config.max_retries = self.tasks.max_retries;
        config.retry_delay = Duration::from_secs(self.tasks.retry_delay_sec);
        config.idempotent_window_minutes = self.tasks.idempotent_window_minutes;
        config.stale_after_minutes = self.tasks.stale_after_minutes;
        config.retention_days = self.tasks.retention_days;
        config.default_concurrency = self.tasks.default_concurrency.max(1);
        config
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory (--data flag).
    pub data: Option<PathBuf>,
}

/// Look for a config file inside the data directory.
fn find_config_in_data_dir(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["toml", "yaml", "yml", "json"];
    let basenames = ["manga-scraper", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

async fn load_file_config(options: &LoadOptions) -> Result<Config, String> {
    // Priority 1: explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return Config::load_from_path(config_path).await;
    }

    // Priority 2: config inside --data
    if let Some(ref data_dir) = options.data {
        if let Some(config_path) = find_config_in_data_dir(data_dir) {
            tracing::debug!("Found config in data dir: {}", config_path.display());
            return Config::load_from_path(&config_path).await;
        }
    }

    // Priority 3: auto-discover via prefer
    Ok(Config::load().await)
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Load settings with explicit options. An explicitly named config file that
/// fails to parse is an error; discovered files fall back to defaults.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<(Settings, Config), String> {
    let mut config = load_file_config(&options).await?;
    config.apply_env_overrides();

    let mut settings = Settings::default();
    let base_dir = config.base_dir().unwrap_or_else(current_dir);
    config.apply_to_settings(&mut settings, &base_dir);

    // --data takes precedence over both file and environment
    if let Some(ref data) = options.data {
        let dir = if data.is_absolute() {
            data.clone()
        } else {
            current_dir().join(data)
        };
        settings.set_data_dir(dir);
    }

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_settings_layout() {
        let settings = Settings::with_data_dir(PathBuf::from("/srv/scraper"));
        assert_eq!(settings.raw_dir, PathBuf::from("/srv/scraper/raw"));
        assert_eq!(settings.state_dir, PathBuf::from("/srv/scraper/storage_state"));
        assert_eq!(
            settings.database_path(),
            PathBuf::from("/srv/scraper/scraper_tasks.db")
        );
    }

    #[test]
    fn test_resolve_path_relative_to_base() {
        let config = Config::default();
        let base = Path::new("/etc/manga");
        assert_eq!(config.resolve_path("data", base), PathBuf::from("/etc/manga/data"));
        assert_eq!(config.resolve_path("/abs", base), PathBuf::from("/abs"));
    }

    #[tokio::test]
    async fn test_load_toml_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manga-scraper.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "store"

[tasks]
max_retries = 5
retry_delay_sec = 1

[alerts]
threshold_backlog = 3

[alerts.webhook]
enabled = true
url = "http://hooks.local/x"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.tasks.max_retries, 5);
        assert_eq!(config.tasks.stale_after_minutes, 10);
        assert_eq!(config.alerts.threshold_backlog, 3);
        assert_eq!(config.alerts.cooldown_sec, 300);
        assert_eq!(config.alerts.webhook.target(), Some("http://hooks.local/x"));

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, &config.base_dir().unwrap());
        assert_eq!(settings.data_dir, dir.path().join("store"));
        assert_eq!(settings.raw_dir, dir.path().join("store").join("raw"));

        let download = config.download_config(&settings);
        assert_eq!(download.max_retries, 5);
        assert_eq!(download.retry_delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_load_yaml_and_json() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("c.yaml");
        std::fs::write(&yaml, "server:\n  port: 9000\n").unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");

        let json = dir.path().join("c.json");
        std::fs::write(&json, r#"{"http": {"engine": "http", "default_rps": 2.0}}"#).unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        let client = config.http.client_config();
        assert_eq!(client.engine, RequestEngine::Http);
        assert_eq!(client.default_rps, Some(2.0));
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "tasks = [").unwrap();
        assert!(Config::load_from_path(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_data_flag_finds_config_and_wins() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "data_dir = \"/elsewhere\"\n[server]\nport = 9100\n",
        )
        .unwrap();

        let (settings, config) = load_settings_with_options(LoadOptions {
            config_path: None,
            data: Some(dir.path().to_path_buf()),
        })
        .await
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.state_dir, dir.path().join("storage_state"));
    }
}
