//! Periodic alert evaluation loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::AlertEngine;

/// Handle to the background evaluation loop.
pub struct AlertScheduler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl AlertScheduler {
    /// Evaluate immediately, then every `interval`, until stopped.
    pub fn start(engine: Arc<AlertEngine>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let interval = interval.max(Duration::from_millis(10));

        let handle = tokio::spawn(async move {
            info!("Alert loop started (every {:?})", interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    result = engine.evaluate() => match result {
                        Ok(alerts) if !alerts.is_empty() => info!("Emitted {} alerts", alerts.len()),
                        Ok(_) => debug!("No alerts"),
                        Err(e) => warn!("Alert evaluation failed: {}", e),
                    },
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("Alert loop stopped");
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Alert loop ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for AlertScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
