//! HTTP API for submitting scraper tasks and watching queue health.
//!
//! Startup runs the staleness sweep and retention prune, then starts the
//! alert loop next to the listener. Ctrl-C stops both.

mod handlers;
mod routes;

pub use handlers::api_types;
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::services::{AlertEngine, AlertScheduler, DownloadService, ServiceContext};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub download: Arc<DownloadService>,
    pub alerts: Arc<AlertEngine>,
    /// Bearer token for admin routes.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(download: Arc<DownloadService>, alerts: Arc<AlertEngine>, admin_token: Option<String>) -> Self {
        Self {
            download,
            alerts,
            admin_token: admin_token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .map(Arc::from),
        }
    }

    pub fn from_context(ctx: &ServiceContext) -> Self {
        Self::new(
            ctx.download.clone(),
            ctx.alerts.clone(),
            ctx.config.server.admin_token.clone(),
        )
    }
}

/// Start the web server and the alert loop.
pub async fn serve(ctx: ServiceContext, host: &str, port: u16) -> anyhow::Result<()> {
    let recovered = ctx.download.recover_stale()?;
    let pruned = ctx.download.prune()?;
    tracing::info!("Startup: {} stale tasks recovered, {} pruned", recovered, pruned);

    let scheduler = if ctx.alerts.config().enabled {
        Some(AlertScheduler::start(
            ctx.alerts.clone(),
            ctx.alerts.config().poll_interval(),
        ))
    } else {
        tracing::info!("Alert loop disabled");
        None
    };

    let state = AppState::from_context(&ctx);
    if state.admin_token.is_none() {
        tracing::warn!("No admin token configured; admin routes will reject all requests");
    }
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
