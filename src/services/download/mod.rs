//! Chapter download service.
//!
//! Owns the task state machine: submission with fingerprint-based
//! deduplication, one run per attempt (`run_download_task`), the retry loop
//! (`drive_task`), startup recovery and pruning. The task store is the only
//! source of truth; every transition and progress tick is written through
//! it as it happens.

mod fingerprint;
pub mod images;
mod types;

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ErrorCode, ScraperError};
use crate::models::{DownloadRequest, NewTask, SiteAccess, SubmitResponse, Task, TaskReport, TaskStatus, TaskStatusView};
use crate::providers::{Provider, ProviderRegistry};
use crate::repository::{Patch, StoreError, TaskStore, TaskUpdate};
use crate::scrapers::cookies::state_path;
use crate::scrapers::{ChallengeResolver, CookieStore, EngineKind, PageFetcher, PageRequest, ProviderContext};

pub use fingerprint::{normalize_base_url, request_fingerprint};
pub use images::{image_file_name, infer_extension, safe_component, SavedImage};
pub use types::{DownloadConfig, DownloadEvent, RunOutcome, DEFAULT_CONCURRENCY, IMAGE_RETRY_SCHEDULE, MAX_CONCURRENCY};

const STALE_MESSAGE: &str = "task abandoned by a previous process";

/// Service for downloading chapters through provider adapters.
pub struct DownloadService {
    store: Arc<TaskStore>,
    registry: Arc<ProviderRegistry>,
    fetcher: Arc<dyn PageFetcher>,
    challenges: Arc<ChallengeResolver>,
    cookies: Arc<CookieStore>,
    config: DownloadConfig,
    events: Option<mpsc::Sender<DownloadEvent>>,
}

impl DownloadService {
    pub fn new(
        store: Arc<TaskStore>,
        registry: Arc<ProviderRegistry>,
        fetcher: Arc<dyn PageFetcher>,
        challenges: Arc<ChallengeResolver>,
        cookies: Arc<CookieStore>,
        config: DownloadConfig,
    ) -> Self {
        Self {
            store,
            registry,
            fetcher,
            challenges,
            cookies,
            config,
            events: None,
        }
    }

    /// Send progress events to `tx`. Events are dropped when the channel is full.
    pub fn with_events(mut self, tx: mpsc::Sender<DownloadEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn challenges(&self) -> &Arc<ChallengeResolver> {
        &self.challenges
    }

    pub fn cookies(&self) -> &Arc<CookieStore> {
        &self.cookies
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(event) {
                debug!("Dropped download event: {}", e);
            }
        }
    }

    /// Record a task for `request`, or return the active task already
    /// downloading the same chapter. Does not start the download.
    pub fn enqueue(&self, request: &DownloadRequest) -> Result<SubmitResponse, ScraperError> {
        if request.manga.id.trim().is_empty() || request.chapter.id.trim().is_empty() {
            return Err(ScraperError::Request(
                "manga.id and chapter.id are required".to_string(),
            ));
        }
        let provider = self
            .registry
            .resolve(&request.base_url, request.site_hint.as_deref())?;
        let fingerprint = request_fingerprint(
            &request.base_url,
            provider.key(),
            &request.manga.id,
            &request.chapter.id,
        );

        if let Some(existing) = self.store.find_active_by_fingerprint(
            &fingerprint,
            self.config.idempotent_window_minutes,
            &TaskStatus::ACTIVE,
        )? {
            info!(
                "Duplicate submission for {} matches active task {}",
                request.chapter.id, existing.task_id
            );
            return Ok(SubmitResponse {
                task_id: existing.task_id,
                status: "existing".to_string(),
                message: format!("task already {}", existing.status.as_str()),
                error_code: Some(ErrorCode::TaskDuplicate),
            });
        }

        let payload = serde_json::to_value(request).map_err(StoreError::from)?;
        let task_id = Uuid::new_v4().to_string();
        let task = self.store.create_task(
            NewTask::pending(&task_id, payload, provider.key(), self.config.max_retries)
                .with_fingerprint(fingerprint),
        )?;
        info!("Queued task {} ({} via {})", task.task_id, request.chapter.id, provider.key());

        Ok(SubmitResponse {
            task_id: task.task_id,
            status: "pending".to_string(),
            message: task.message,
            error_code: None,
        })
    }

    /// Enqueue and start the download in the background. Returns as soon as
    /// the task is recorded.
    pub fn submit(self: &Arc<Self>, request: &DownloadRequest) -> Result<SubmitResponse, ScraperError> {
        let response = self.enqueue(request)?;
        if response.status == "pending" {
            self.spawn_task(response.task_id.clone());
        }
        Ok(response)
    }

    pub fn spawn_task(self: &Arc<Self>, task_id: String) -> JoinHandle<()> {
        tokio::spawn(self.clone().drive_task(task_id))
    }

    /// Run a task until it is terminal, sleeping between retries.
    pub async fn drive_task(self: Arc<Self>, task_id: String) {
        loop {
            match self.run_download_task(&task_id).await {
                Ok(RunOutcome::RetryAfter(delay)) => {
                    info!("Task {} retrying in {:?}", task_id, delay);
                    tokio::time::sleep(delay).await;
                }
                Ok(RunOutcome::Finished(status)) => {
                    info!("Task {} finished: {}", task_id, status.as_str());
                    break;
                }
                Err(e) => {
                    error!("Task {} aborted: {}", task_id, e);
                    let message = e.to_string();
                    let update = TaskUpdate::status(TaskStatus::Error, &message)
                        .error_code(e.code())
                        .last_error(message.clone())
                        .finished();
                    if let Err(store_err) = self.store.update_task(&task_id, update) {
                        error!("Failed to record abort of {}: {}", task_id, store_err);
                    }
                    break;
                }
            }
        }
    }

    /// One attempt at a task: fetch the image list and download every image.
    ///
    /// Errors are returned only for store failures and unreadable payloads;
    /// download failures are recorded on the task.
    pub async fn run_download_task(&self, task_id: &str) -> Result<RunOutcome, ScraperError> {
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| ScraperError::TaskNotFound(task_id.to_string()))?;
        if task.status.is_terminal() {
            return Ok(RunOutcome::Finished(task.status));
        }
        let request: DownloadRequest = serde_json::from_value(task.request_payload.clone())
            .map_err(|e| ScraperError::Parse(format!("stored request for {}: {}", task_id, e)))?;

        let mut start = TaskUpdate::status(TaskStatus::Running, "fetching chapter")
            .next_retry_at(Patch::<chrono::DateTime<Utc>>::Clear);
        if task.started_at.is_none() {
            start = start.started_at(Utc::now());
        }
        if !self.store.update_task(task_id, start)? {
            return Ok(RunOutcome::Finished(task.status));
        }
        self.store.update_progress(task_id, 0, 0)?;

        let provider = match self
            .registry
            .resolve(&request.base_url, request.site_hint.as_deref())
        {
            Ok(p) => p,
            Err(e) => return self.fail(task_id, e.code(), &e.to_string(), None),
        };
        let ctx = self.build_context(&request, provider.key()).await;
        let chapter_url = request
            .chapter
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| provider.chapter_url(&ctx.base_url, &request.manga.id, &request.chapter.id));

        let (urls, ctx) = match self.fetch_image_list(&provider, &ctx, &chapter_url).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Task {}: image list failed: {}", task_id, e);
                return self.fail(task_id, e.code(), &e.to_string(), None);
            }
        };
        if urls.is_empty() {
            return self.fail(
                task_id,
                ErrorCode::ImageEmpty,
                &format!("no images found on {}", chapter_url),
                None,
            );
        }

        let dir = self
            .config
            .raw_dir
            .join(safe_component(&request.manga.id))
            .join(safe_component(&request.chapter.id));
        tokio::fs::create_dir_all(&dir).await?;

        let total = urls.len();
        self.store.update_progress(task_id, 0, total as u32)?;
        self.store.update_task(
            task_id,
            TaskUpdate::status(TaskStatus::Running, format!("downloading {} images", total)),
        )?;
        self.emit(DownloadEvent::Started {
            task_id: task_id.to_string(),
            total,
        });

        let results = self
            .download_images(task_id, &ctx, &chapter_url, &urls, &dir)
            .await;
        self.settle(task, provider.key(), &dir, total, results)
    }

    async fn fetch_image_list(
        &self,
        provider: &Arc<dyn Provider>,
        ctx: &ProviderContext,
        chapter_url: &str,
    ) -> Result<(Vec<String>, ProviderContext), ScraperError> {
        self.challenges
            .run(ctx, chapter_url, |attempt_ctx| {
                let provider = provider.clone();
                let url = chapter_url.to_string();
                async move { provider.reader_images(&attempt_ctx, &url).await }
            })
            .await
    }

    async fn download_images(
        &self,
        task_id: &str,
        ctx: &ProviderContext,
        chapter_url: &str,
        urls: &[String],
        dir: &std::path::Path,
    ) -> Vec<Result<SavedImage, ScraperError>> {
        let total = urls.len();
        let completed = AtomicUsize::new(0);
        let completed = &completed;

        stream::iter(urls.iter().cloned().enumerate())
            .map(|(i, url): (usize, String)| async move {
                let index = i + 1;
                let image_ctx = self.challenges.apply_cached(ctx, &url).await;
                let request = PageRequest::from_context(&image_ctx, url.as_str()).with_referer(chapter_url);
                let result = images::download_image(
                    self.fetcher.as_ref(),
                    &request,
                    dir,
                    index,
                    &self.config.image_retry_schedule,
                )
                .await;

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Err(e) = self.store.update_progress(task_id, done as u32, total as u32) {
                    warn!("Failed to record progress for {}: {}", task_id, e);
                }
                match &result {
                    Ok(saved) => self.emit(DownloadEvent::ImageSaved {
                        task_id: task_id.to_string(),
                        index,
                        path: saved.path.clone(),
                        reused: saved.reused,
                    }),
                    Err(e) => {
                        warn!("Task {}: image {} failed: {}", task_id, index, e);
                        self.emit(DownloadEvent::ImageFailed {
                            task_id: task_id.to_string(),
                            index,
                            url: url.clone(),
                            error: e.to_string(),
                        });
                    }
                }
                result
            })
            .buffer_unordered(ctx.concurrency.clamp(1, MAX_CONCURRENCY))
            .collect()
            .await
    }

    /// Decide the task's next state from the image results.
    fn settle(
        &self,
        task: Task,
        provider: &str,
        dir: &std::path::Path,
        total: usize,
        results: Vec<Result<SavedImage, ScraperError>>,
    ) -> Result<RunOutcome, ScraperError> {
        let success_count = results.iter().filter(|r| r.is_ok()).count();
        let failures: Vec<&ScraperError> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        let retryable = failures.iter().any(|e| e.is_transient());
        let last_error = failures.last().map(|e| e.to_string());

        let report = TaskReport {
            success_count,
            failed_count: failures.len(),
            total,
            output_dir: dir.display().to_string(),
            provider: provider.to_string(),
            last_error: last_error.clone(),
        };
        let task_id = task.task_id.as_str();

        if success_count == total {
            let update = TaskUpdate::status(TaskStatus::Success, format!("downloaded {} images", total))
                .report(report)
                .error_code(Patch::<ErrorCode>::Clear)
                .last_error(Patch::<String>::Clear)
                .finished();
            self.store.update_task(task_id, update)?;
            self.emit(DownloadEvent::Finished {
                task_id: task_id.to_string(),
                status: TaskStatus::Success,
            });
            return Ok(RunOutcome::Finished(TaskStatus::Success));
        }

        if success_count > 0 {
            let update = TaskUpdate::status(
                TaskStatus::Partial,
                format!("downloaded {} of {} images", success_count, total),
            )
            .report(report)
            .error_code(Patch::<ErrorCode>::Clear)
            .last_error(Patch::from(last_error))
            .finished();
            self.store.update_task(task_id, update)?;
            self.emit(DownloadEvent::Finished {
                task_id: task_id.to_string(),
                status: TaskStatus::Partial,
            });
            return Ok(RunOutcome::Finished(TaskStatus::Partial));
        }

        let message = last_error.unwrap_or_else(|| "all images failed".to_string());
        if retryable && task.retry_count < task.max_retries {
            let delay = self.config.retry_delay;
            let next = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(15));
            let attempt = task.retry_count + 1;
            let update = TaskUpdate::status(
                TaskStatus::Retrying,
                format!("retry {}/{} scheduled", attempt, task.max_retries),
            )
            .report(report)
            .retry_count(attempt)
            .next_retry_at(next)
            .last_error(message);
            self.store.update_task(task_id, update)?;
            self.emit(DownloadEvent::Finished {
                task_id: task_id.to_string(),
                status: TaskStatus::Retrying,
            });
            return Ok(RunOutcome::RetryAfter(delay));
        }

        let code = if retryable {
            ErrorCode::RetryExhausted
        } else {
            ErrorCode::DownloadFailed
        };
        self.fail(task_id, code, &message, Some(report))
    }

    fn fail(
        &self,
        task_id: &str,
        code: ErrorCode,
        message: &str,
        report: Option<TaskReport>,
    ) -> Result<RunOutcome, ScraperError> {
        let mut update = TaskUpdate::status(TaskStatus::Error, message)
            .error_code(code)
            .last_error(message)
            .finished();
        if let Some(report) = report {
            update = update.report(report);
        }
        self.store.update_task(task_id, update)?;
        self.emit(DownloadEvent::Finished {
            task_id: task_id.to_string(),
            status: TaskStatus::Error,
        });
        Ok(RunOutcome::Finished(TaskStatus::Error))
    }

    /// Execution context for a request: stored cookies for the host, then
    /// request cookies on top, plus engine and rate settings.
    pub async fn build_context(&self, request: &DownloadRequest, provider_key: &str) -> ProviderContext {
        let mut ctx = ProviderContext::new(request.base_url.trim());
        ctx.http_mode = request.http_mode.unwrap_or(false);
        ctx.force_engine = request.force_engine.as_deref().and_then(EngineKind::from_str);
        ctx.rate_limit_rps = request.rate_limit_rps.filter(|rps| *rps > 0.0);
        ctx.concurrency = self.config.concurrency_for(request.concurrency);

        let state_file = match request.storage_state_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => PathBuf::from(shellexpand::tilde(path).as_ref()),
            _ => state_path(&self.config.state_dir, provider_key),
        };
        if let Some(host) = ctx.host() {
            if tokio::fs::try_exists(&state_file).await.unwrap_or(false) {
                match self.cookies.cookies_for_host(&state_file, &host).await {
                    Ok(stored) => {
                        debug!("Loaded {} stored cookies for {}", stored.len(), host);
                        ctx = ctx.with_cookies(&stored);
                    }
                    Err(e) => warn!("Ignoring storage state {}: {}", state_file.display(), e),
                }
            }
        }

        let user_agent = request
            .user_agent
            .clone()
            .filter(|ua| !ua.trim().is_empty());
        ctx.with_cookies(&request.cookies).with_user_agent(user_agent)
    }

    /// Run a provider call for `access` with stored cookies applied and
    /// challenge solving on the way. Used for search, catalog and chapter
    /// listings, which are not tasks.
    pub async fn browse<T, F, Fut>(&self, access: &SiteAccess, op: F) -> Result<T, ScraperError>
    where
        F: Fn(Arc<dyn Provider>, ProviderContext) -> Fut,
        Fut: Future<Output = Result<T, ScraperError>>,
    {
        let provider = self
            .registry
            .resolve(&access.base_url, access.site_hint.as_deref())?;
        let ctx = self.build_context(&access.to_request(), provider.key()).await;
        let (value, _) = self
            .challenges
            .run(&ctx, &access.base_url, |c| op(provider.clone(), c))
            .await?;
        Ok(value)
    }

    pub fn status(&self, task_id: &str) -> Result<TaskStatusView, ScraperError> {
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| ScraperError::TaskNotFound(task_id.to_string()))?;
        Ok(TaskStatusView::from(&task))
    }

    /// Fail tasks left active by a previous process.
    pub fn recover_stale(&self) -> Result<usize, ScraperError> {
        let cutoff = Utc::now() - chrono::Duration::minutes(self.config.stale_after_minutes);
        let count = self.store.mark_stale_tasks(
            cutoff,
            STALE_MESSAGE,
            ErrorCode::TaskStale,
            &TaskStatus::ACTIVE,
        )?;
        if count > 0 {
            warn!("Marked {} stale tasks as failed", count);
        }
        Ok(count)
    }

    /// Delete terminal tasks older than the retention window.
    pub fn prune(&self) -> Result<usize, ScraperError> {
        let count = self.store.prune_completed(self.config.retention_days)?;
        if count > 0 {
            info!("Pruned {} finished tasks", count);
        }
        Ok(count)
    }
}
