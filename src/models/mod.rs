//! Data models for the scraper task service.

mod alert;
mod request;
mod stats;
mod task;

pub use alert::{Alert, AlertQuery, AlertRule, AlertSeverity, NewAlert, WebhookStatus};
pub use request::{ChapterRef, DownloadRequest, MangaRef, SiteAccess, SubmitResponse, TaskStatusView};
pub use stats::{ProviderMetrics, QueueStats, TaskMetrics};
pub use task::{NewTask, Task, TaskReport, TaskStatus};
