//! Service layer: download orchestration and health alerting.
//!
//! Services are shared by the CLI and the HTTP server.

pub mod alerts;
mod context;
pub mod download;

pub use alerts::{AlertConfig, AlertEngine, AlertScheduler, HttpWebhookSender, WebhookConfig, WebhookSender};
pub use context::ServiceContext;
pub use download::{DownloadConfig, DownloadEvent, DownloadService, RunOutcome};
