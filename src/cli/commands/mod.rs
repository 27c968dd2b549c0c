//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod cookies;
mod download;
mod providers;
mod queue;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::helpers::parse_cookie_pair;
use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "mscrape")]
#[command(about = "Persistent scraper task queue for raw manga chapters")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file and MANGA_SCRAPER_DATA_DIR)
    #[arg(long, short = 'd', global = true)]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and the alert loop
    Serve {
        /// Address to bind: port, host, or host:port (defaults to config)
        bind: Option<String>,
    },

    /// Download one chapter in the foreground
    Download {
        /// Site base URL, e.g. https://toongod.org
        base_url: String,
        /// Manga slug
        manga_id: String,
        /// Chapter slug
        chapter_id: String,
        /// Provider key to use instead of host matching
        #[arg(long)]
        site: Option<String>,
        /// Explicit chapter URL
        #[arg(long)]
        chapter_url: Option<String>,
        /// Parallel image downloads
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
        /// Plain HTTP without browser impersonation
        #[arg(long)]
        http_mode: bool,
        /// Reader engine: http or browser
        #[arg(long)]
        engine: Option<String>,
        /// Requests per second toward the site
        #[arg(long)]
        rps: Option<f64>,
        /// Extra cookie, repeatable
        #[arg(long = "cookie", value_parser = parse_cookie_pair)]
        cookies: Vec<(String, String)>,
        /// Storage-state JSON to take cookies from
        #[arg(long)]
        storage_state: Option<String>,
        /// User agent override
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Show one task
    Status {
        task_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show queue counts and recent tasks
    Queue {
        /// Only tasks with this status
        #[arg(long)]
        status: Option<String>,
        /// Number of recent tasks to list
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Outcome metrics over a trailing window
    Metrics {
        #[arg(long, default_value = "24")]
        hours: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Health alerts
    Alerts {
        #[command(subcommand)]
        command: AlertCommands,
    },

    /// Delete finished tasks past the retention window
    Prune,

    /// Fail tasks left active by a previous process
    Recover,

    /// List registered providers
    Providers {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage stored cookies (storage state)
    Cookies {
        #[command(subcommand)]
        command: CookieCommands,
    },
}

#[derive(Subcommand)]
enum AlertCommands {
    /// List stored alerts, newest first
    List {
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long, default_value = "20")]
        page_size: usize,
        /// warning or error
        #[arg(long)]
        severity: Option<String>,
        /// backlog_high, error_rate_high or stale_detected
        #[arg(long)]
        rule: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Evaluate the rules once and deliver any alerts
    Check,
    /// Send a test payload to the configured webhook
    Test,
}

#[derive(Subcommand)]
enum CookieCommands {
    /// Import a storage-state file for a provider
    Import {
        provider: String,
        file: PathBuf,
    },
    /// Show cookie expiry for a provider
    Show {
        provider: String,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data: cli.data,
    };
    let (settings, config) = load_settings_with_options(options)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Serve { bind } => serve::cmd_serve(settings, config, bind.as_deref()).await,
        Commands::Download {
            base_url,
            manga_id,
            chapter_id,
            site,
            chapter_url,
            concurrency,
            http_mode,
            engine,
            rps,
            cookies,
            storage_state,
            user_agent,
        } => {
            let mut request = crate::models::DownloadRequest::new(base_url, &manga_id, &chapter_id);
            request.site_hint = site;
            request.chapter.url = chapter_url;
            request.concurrency = concurrency;
            request.http_mode = http_mode.then_some(true);
            request.force_engine = engine;
            request.rate_limit_rps = rps;
            request.cookies = cookies.into_iter().collect();
            request.storage_state_path = storage_state;
            request.user_agent = user_agent;
            download::cmd_download(settings, config, request).await
        }
        Commands::Status { task_id, json } => {
            download::cmd_status(settings, config, &task_id, json).await
        }
        Commands::Queue {
            status,
            limit,
            json,
        } => queue::cmd_queue(settings, config, status.as_deref(), limit, json).await,
        Commands::Metrics { hours, json } => queue::cmd_metrics(settings, config, hours, json).await,
        Commands::Alerts { command } => match command {
            AlertCommands::List {
                page,
                page_size,
                severity,
                rule,
                json,
            } => {
                queue::cmd_alerts_list(
                    settings,
                    config,
                    page,
                    page_size,
                    severity.as_deref(),
                    rule.as_deref(),
                    json,
                )
                .await
            }
            AlertCommands::Check => queue::cmd_alerts_check(settings, config).await,
            AlertCommands::Test => queue::cmd_alerts_test(settings, config).await,
        },
        Commands::Prune => queue::cmd_prune(settings, config).await,
        Commands::Recover => queue::cmd_recover(settings, config).await,
        Commands::Providers { json } => providers::cmd_providers(settings, config, json).await,
        Commands::Cookies { command } => match command {
            CookieCommands::Import { provider, file } => {
                cookies::cmd_import(settings, config, &provider, &file).await
            }
            CookieCommands::Show { provider } => {
                cookies::cmd_show(settings, config, &provider).await
            }
        },
    }
}
