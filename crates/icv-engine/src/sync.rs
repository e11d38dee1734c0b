//! # Sync Job Engine
//!
//! Drains the sync queue against the datasheet resolver, one background task
//! per run.
//!
//! ## Run Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SyncJobEngine::start                            │
//! │                                                                         │
//! │  start_guard.lock()            in-process single flight                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  active job? ── yes, no replace ──► Conflict (JobAlreadyRunning)        │
//! │       │  └──── yes, replace ──────► cancel + wait (bounded)             │
//! │       ▼                                                                 │
//! │  snapshot queue (PENDING [+ FAILED]) ──► create_if_idle (durable guard) │
//! │       │                                                                 │
//! │       ▼  tokio::spawn                                                   │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │ for item in snapshot:                                             │ │
//! │  │   cancel requested? ──► CANCELLED ("cancelled after k/n items")   │ │
//! │  │   mark PROCESSING                                                 │ │
//! │  │   resolve (bounded, panics caught)                                │ │
//! │  │     Ok  ──► promote_to_catalog      success_count += 1            │ │
//! │  │     Err ──► record_failure ──┬─ FAILED    failed_count += 1       │ │
//! │  │                              └─ ESCALATED fake_count += 1         │ │
//! │  │   processed_items += 1, persist progress + log                    │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMPLETED  (or ERROR if a store write failed; in-flight row requeued)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The job row is the source of truth for "is a job running"; the in-process
//! handle only carries the cancel flag and completion signal for runs this
//! instance owns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use icv_core::validation::validate_sync_limit;
use icv_core::{
    CoreError, PartNumber, QueueItem, Resolution, SyncJob, SyncJobStatus, SyncProgress,
    SyncRequest, SOURCE_DATASHEET_SYNC,
};
use icv_db::{Database, FailureOutcome, NewSyncJob, PromoteOutcome};

use crate::config::SyncSettings;
use crate::error::{EngineError, EngineResult};
use crate::resolver::{DatasheetResolver, ResolveFailure};

/// Poll interval when waiting on a job owned by another engine instance.
const FOREIGN_JOB_POLL: Duration = Duration::from_millis(250);

/// Cancel flag and completion signal of a run owned by this instance.
#[derive(Debug, Clone)]
struct RunHandle {
    job_id: String,
    cancel: Arc<AtomicBool>,
    done: watch::Receiver<bool>,
}

struct EngineInner {
    db: Database,
    resolver: Arc<dyn DatasheetResolver>,
    settings: SyncSettings,
    start_guard: Mutex<()>,
    current: Mutex<Option<RunHandle>>,
}

/// Orchestrates sync runs. Cheap to clone.
#[derive(Clone)]
pub struct SyncJobEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for SyncJobEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncJobEngine")
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl SyncJobEngine {
    /// Creates an engine over `db` using `resolver` for every item.
    pub fn new(db: Database, resolver: Arc<dyn DatasheetResolver>, settings: SyncSettings) -> Self {
        SyncJobEngine {
            inner: Arc::new(EngineInner {
                db,
                resolver,
                settings,
                start_guard: Mutex::new(()),
                current: Mutex::new(None),
            }),
        }
    }

    // =========================================================================
    // Start
    // =========================================================================

    /// Starts a run over a snapshot of the queue.
    ///
    /// ## Returns
    /// * `Ok(job)` - The new PROCESSING job; the run continues in the background
    /// * `Err(Conflict)` - A job is running and `replace` was not requested,
    ///   or the running job did not stop within the replace wait
    pub async fn start(&self, request: SyncRequest) -> EngineResult<SyncJob> {
        validate_sync_limit(request.limit)?;

        let _guard = self.inner.start_guard.lock().await;
        let db = &self.inner.db;

        if let Some(active) = db.sync_jobs().active().await? {
            if !request.replace {
                return Err(CoreError::JobAlreadyRunning(active.id).into());
            }
            info!(job_id = %active.id, "Replacing running sync job");
            self.request_cancel(&active.id).await?;
            tokio::time::timeout(self.inner.settings.replace_wait(), self.wait_until_stopped(&active.id))
                .await
                .map_err(|_| CoreError::JobAlreadyRunning(active.id.clone()))??;
        }

        let requeued = db.sync_queue().requeue_orphaned().await?;
        if requeued > 0 {
            warn!(requeued, "Released queue rows left PROCESSING by an earlier run");
        }

        let mut request = request;
        if request.limit.is_none() {
            request.limit = self.inner.settings.default_limit;
        }

        let items = db.sync_queue().snapshot(&request).await?;
        let new_job = NewSyncJob {
            id: Uuid::new_v4().to_string(),
            total_items: items.len() as i64,
            retry_failed: request.retry_failed,
            item_limit: request.limit,
            message: Some(format!("snapshot of {} queued items", items.len())),
        };

        let Some(job) = db.sync_jobs().create_if_idle(&new_job).await? else {
            // Another engine instance won the race after our check
            let holder = db
                .sync_jobs()
                .active()
                .await?
                .map(|j| j.id)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(CoreError::JobAlreadyRunning(holder).into());
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = watch::channel(false);
        *self.inner.current.lock().await = Some(RunHandle {
            job_id: job.id.clone(),
            cancel: cancel.clone(),
            done: done_rx,
        });

        let run = JobRun {
            db: db.clone(),
            resolver: self.inner.resolver.clone(),
            settings: self.inner.settings.clone(),
            job: job.clone(),
            items,
            cancel,
        };
        tokio::spawn(async move {
            run.execute().await;
            let _ = done_tx.send(true);
        });

        Ok(job)
    }

    // =========================================================================
    // Cancel / Status
    // =========================================================================

    /// Asks the running job to stop before its next item.
    ///
    /// ## Returns
    /// The id of the job that was asked to stop, or `None` when idle.
    pub async fn cancel(&self) -> EngineResult<Option<String>> {
        let Some(active) = self.inner.db.sync_jobs().active().await? else {
            debug!("Cancel requested with no running job");
            return Ok(None);
        };
        self.request_cancel(&active.id).await?;
        Ok(Some(active.id))
    }

    async fn request_cancel(&self, job_id: &str) -> EngineResult<()> {
        if let Some(handle) = self.inner.current.lock().await.as_ref() {
            if handle.job_id == job_id {
                handle.cancel.store(true, Ordering::SeqCst);
            }
        }
        self.inner.db.sync_jobs().request_cancel(job_id).await?;
        info!(job_id = %job_id, "Sync job cancellation requested");
        Ok(())
    }

    /// Progress of the running job, or of the most recent one when idle.
    pub async fn status(&self) -> EngineResult<SyncProgress> {
        let jobs = self.inner.db.sync_jobs();
        let job = match jobs.active().await? {
            Some(job) => Some(job),
            None => jobs.latest().await?,
        };
        Ok(job
            .map(|j| j.progress(Utc::now()))
            .unwrap_or_else(SyncProgress::idle))
    }

    /// Finished jobs, newest first.
    pub async fn history(&self, limit: i64) -> EngineResult<Vec<SyncJob>> {
        Ok(self.inner.db.sync_jobs().history(limit.max(1)).await?)
    }

    /// Looks up one job.
    pub async fn get_job(&self, job_id: &str) -> EngineResult<SyncJob> {
        self.inner
            .db
            .sync_jobs()
            .get(job_id)
            .await?
            .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()).into())
    }

    /// Waits until `job_id` is terminal and returns its final row.
    pub async fn wait_for(&self, job_id: &str) -> EngineResult<SyncJob> {
        self.get_job(job_id).await?;
        self.wait_until_stopped(job_id).await?;
        self.get_job(job_id).await
    }

    async fn wait_until_stopped(&self, job_id: &str) -> EngineResult<()> {
        let own = self
            .inner
            .current
            .lock()
            .await
            .as_ref()
            .filter(|h| h.job_id == job_id)
            .map(|h| h.done.clone());

        if let Some(mut done) = own {
            while !*done.borrow_and_update() {
                if done.changed().await.is_err() {
                    break;
                }
            }
            return Ok(());
        }

        loop {
            match self.inner.db.sync_jobs().get(job_id).await? {
                Some(job) if job.status == SyncJobStatus::Processing => {
                    tokio::time::sleep(FOREIGN_JOB_POLL).await;
                }
                _ => return Ok(()),
            }
        }
    }
}

// =============================================================================
// Job Run
// =============================================================================

/// State of one run, owned by its background task.
struct JobRun {
    db: Database,
    resolver: Arc<dyn DatasheetResolver>,
    settings: SyncSettings,
    job: SyncJob,
    items: Vec<QueueItem>,
    cancel: Arc<AtomicBool>,
}

impl JobRun {
    async fn execute(mut self) {
        info!(job_id = %self.job.id, total_items = self.job.total_items, "Sync run started");

        if let Err(e) = self.process_items().await {
            error!(job_id = %self.job.id, error = %e, "Sync run aborted");
            self.job.status = SyncJobStatus::Error;
            self.job.message = Some(format!(
                "aborted after {}/{} items: {}",
                self.job.processed_items, self.job.total_items, e
            ));
            self.log(format!("run aborted: {}", e));
        }

        self.job.completed_at = Some(Utc::now());
        self.job.current_item = None;
        if let Err(e) = self.db.sync_jobs().finish(&self.job).await {
            error!(job_id = %self.job.id, error = %e, "Failed to record sync job outcome");
        }

        // The item in flight when the run aborted is still PROCESSING
        if self.job.status == SyncJobStatus::Error {
            if let Err(e) = self.db.sync_queue().requeue_orphaned().await {
                error!(job_id = %self.job.id, error = %e, "Failed to requeue interrupted item");
            }
        }
    }

    async fn process_items(&mut self) -> EngineResult<()> {
        let items = std::mem::take(&mut self.items);

        for item in items {
            if self.cancel_requested().await? {
                self.job.status = SyncJobStatus::Cancelled;
                self.job.message = Some(format!(
                    "cancelled after {}/{} items",
                    self.job.processed_items, self.job.total_items
                ));
                self.log("run cancelled".to_string());
                info!(job_id = %self.job.id, processed = self.job.processed_items, "Sync run cancelled");
                return Ok(());
            }

            self.job.current_item = Some(item.part_number.to_string());
            self.persist_progress().await?;

            self.process_item(&item.part_number).await?;

            self.job.processed_items += 1;
            self.persist_progress().await?;
        }

        self.job.status = SyncJobStatus::Completed;
        self.job.message = Some(format!(
            "processed {}/{}: {} catalogued, {} failed, {} escalated",
            self.job.processed_items,
            self.job.total_items,
            self.job.success_count,
            self.job.failed_count,
            self.job.fake_count
        ));
        Ok(())
    }

    /// Writes counters, current item and log; doubles as the heartbeat.
    async fn persist_progress(&self) -> EngineResult<()> {
        if !self.db.sync_jobs().update_progress(&self.job).await? {
            return Err(EngineError::Internal(
                "job row is no longer PROCESSING".to_string(),
            ));
        }
        Ok(())
    }

    async fn cancel_requested(&self) -> EngineResult<bool> {
        if self.cancel.load(Ordering::SeqCst) {
            return Ok(true);
        }
        Ok(self.db.sync_jobs().is_cancel_requested(&self.job.id).await?)
    }

    async fn process_item(&mut self, part_number: &PartNumber) -> EngineResult<()> {
        if !self.db.sync_queue().mark_processing(part_number).await? {
            self.log(format!("{}: no longer queued, skipped", part_number));
            return Ok(());
        }

        match self.resolve(part_number).await {
            Ok(resolution) => self.apply_resolution(part_number, &resolution).await,
            Err(failure) => self.apply_failure(part_number, failure).await,
        }
    }

    /// Calls the resolver on its own task so a panic or a hang becomes an
    /// ordinary per-item failure.
    async fn resolve(&self, part_number: &PartNumber) -> Result<Resolution, ResolveFailure> {
        let resolver = self.resolver.clone();
        let target = part_number.clone();
        let mut task = tokio::spawn(async move { resolver.resolve(&target).await });

        let limit = self.settings.resolve_timeout();
        match tokio::time::timeout(limit, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) if join_error.is_panic() => {
                Err(ResolveFailure::error("resolver panicked"))
            }
            Ok(Err(join_error)) => Err(ResolveFailure::error(join_error.to_string())),
            Err(_) => {
                task.abort();
                Err(ResolveFailure::timeout(format!(
                    "resolver gave no answer within {}s",
                    limit.as_secs()
                )))
            }
        }
    }

    async fn apply_resolution(
        &mut self,
        part_number: &PartNumber,
        resolution: &Resolution,
    ) -> EngineResult<()> {
        let entries = resolution.catalog_entries(part_number, SOURCE_DATASHEET_SYNC);
        if entries.is_empty() {
            let failure = ResolveFailure::not_found("resolution carried no usable variants");
            return self.apply_failure(part_number, failure).await;
        }

        match self
            .db
            .sync_queue()
            .promote_to_catalog(part_number, &entries)
            .await?
        {
            PromoteOutcome::Promoted(rows) => {
                self.job.success_count += 1;
                self.log(format!(
                    "{}: catalogued {} variant(s) via {}",
                    part_number,
                    rows.len(),
                    resolution.provider
                ));
            }
            PromoteOutcome::AlreadyCounterfeit => {
                self.log(format!(
                    "{}: reported counterfeit during the run, not catalogued",
                    part_number
                ));
            }
        }
        Ok(())
    }

    async fn apply_failure(
        &mut self,
        part_number: &PartNumber,
        failure: ResolveFailure,
    ) -> EngineResult<()> {
        let threshold = self.settings.retry_threshold;
        let outcome = self
            .db
            .sync_queue()
            .record_failure(
                part_number,
                &failure.to_string(),
                threshold,
                &failure.providers_checked,
            )
            .await?;

        match outcome {
            FailureOutcome::Failed { retry_count } => {
                self.job.failed_count += 1;
                warn!(part_number = %part_number, retry_count, error = %failure, "Resolution failed");
                self.log(format!(
                    "{}: {} (attempt {}/{})",
                    part_number, failure, retry_count, threshold
                ));
            }
            FailureOutcome::Escalated { retry_count, .. } => {
                self.job.fake_count += 1;
                self.log(format!(
                    "{}: moved to fake registry after {} failed attempts",
                    part_number, retry_count
                ));
            }
            FailureOutcome::Missing => {
                self.log(format!("{}: removed from queue during resolution", part_number));
            }
        }
        Ok(())
    }

    /// Appends a timestamped line, dropping the oldest beyond capacity.
    fn log(&mut self, line: String) {
        debug!(job_id = %self.job.id, "{}", line);
        self.job
            .log
            .push(format!("{} {}", Utc::now().format("%H:%M:%S"), line));
        let capacity = self.settings.log_capacity.max(1);
        if self.job.log.len() > capacity {
            let excess = self.job.log.len() - capacity;
            self.job.log.drain(..excess);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
