//! Download service configuration and events.

use std::path::PathBuf;
use std::time::Duration;

use crate::models::TaskStatus;

pub const DEFAULT_CONCURRENCY: usize = 6;
pub const MAX_CONCURRENCY: usize = 32;

/// Delays between attempts of a single image fetch.
pub const IMAGE_RETRY_SCHEDULE: [Duration; 3] = [
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_secs(2),
];

/// Configuration for the download service.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Root under which chapter images are written.
    pub raw_dir: PathBuf,
    /// Where uploaded storage-state files live.
    pub state_dir: PathBuf,
    pub max_retries: u32,
    /// Delay before a `retrying` task runs again.
    pub retry_delay: Duration,
    pub image_retry_schedule: Vec<Duration>,
    pub default_concurrency: usize,
    pub idempotent_window_minutes: i64,
    pub stale_after_minutes: i64,
    pub retention_days: i64,
}

impl DownloadConfig {
    pub fn new(raw_dir: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            state_dir: state_dir.into(),
            max_retries: 2,
            retry_delay: Duration::from_secs(15),
            image_retry_schedule: IMAGE_RETRY_SCHEDULE.to_vec(),
            default_concurrency: DEFAULT_CONCURRENCY,
            idempotent_window_minutes: 30,
            stale_after_minutes: 10,
            retention_days: 7,
        }
    }

    /// Effective fan-out for a request, clamped to `[1, MAX_CONCURRENCY]`.
    pub fn concurrency_for(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_concurrency)
            .clamp(1, MAX_CONCURRENCY)
    }
}

/// Events emitted while a task runs.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// The image list was fetched and downloads are starting.
    Started { task_id: String, total: usize },
    ImageSaved {
        task_id: String,
        index: usize,
        path: PathBuf,
        reused: bool,
    },
    ImageFailed {
        task_id: String,
        index: usize,
        url: String,
        error: String,
    },
    /// A run ended in `status`. `Retrying` means another run is scheduled.
    Finished { task_id: String, status: TaskStatus },
}

impl DownloadEvent {
    pub fn task_id(&self) -> &str {
        match self {
            DownloadEvent::Started { task_id, .. }
            | DownloadEvent::ImageSaved { task_id, .. }
            | DownloadEvent::ImageFailed { task_id, .. }
            | DownloadEvent::Finished { task_id, .. } => task_id,
        }
    }
}

/// How one run of a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The task is terminal.
    Finished(TaskStatus),
    /// The task is `retrying` and should run again after the delay.
    RetryAfter(Duration),
}
