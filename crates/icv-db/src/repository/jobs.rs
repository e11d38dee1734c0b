//! # Sync Job Repository
//!
//! Bookkeeping for sync runs. The job row is the durable half of the
//! single-flight guard: a partial unique index admits at most one
//! PROCESSING row, so two engines sharing a database file cannot both start.
//!
//! ## Job Row Lifecycle
//! ```text
//! create_if_idle ──► PROCESSING ──┬── finish(COMPLETED)
//!                        │        ├── finish(CANCELLED)   after request_cancel
//!                  update_progress└── finish(ERROR)       or fail_stale
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use icv_core::{SyncJob, SyncJobStatus};

use crate::error::{DbError, DbResult};

/// Row shape; `log` is a JSON array column.
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    status: SyncJobStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    total_items: i64,
    processed_items: i64,
    success_count: i64,
    failed_count: i64,
    fake_count: i64,
    current_item: Option<String>,
    message: Option<String>,
    log: String,
    retry_failed: bool,
    item_limit: Option<i64>,
    cancel_requested: bool,
}

impl TryFrom<JobRow> for SyncJob {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(SyncJob {
            id: row.id,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
            total_items: row.total_items,
            processed_items: row.processed_items,
            success_count: row.success_count,
            failed_count: row.failed_count,
            fake_count: row.fake_count,
            current_item: row.current_item,
            message: row.message,
            log: serde_json::from_str(&row.log)?,
            retry_failed: row.retry_failed,
            item_limit: row.item_limit,
            cancel_requested: row.cancel_requested,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, status, started_at, completed_at, updated_at, total_items,
           processed_items, success_count, failed_count, fake_count,
           current_item, message, log, retry_failed, item_limit, cancel_requested
    FROM sync_jobs
"#;

/// Parameters for a new job row.
#[derive(Debug, Clone)]
pub struct NewSyncJob {
    pub id: String,
    pub total_items: i64,
    pub retry_failed: bool,
    pub item_limit: Option<i64>,
    pub message: Option<String>,
}

/// Repository for sync job operations.
#[derive(Debug, Clone)]
pub struct SyncJobRepository {
    pool: SqlitePool,
}

impl SyncJobRepository {
    /// Creates a new SyncJobRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncJobRepository { pool }
    }

    /// Inserts a PROCESSING job unless one is already active.
    ///
    /// ## Returns
    /// * `Some(job)` - This caller owns the new run
    /// * `None` - Another PROCESSING job exists
    pub async fn create_if_idle(&self, new_job: &NewSyncJob) -> DbResult<Option<SyncJob>> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO sync_jobs (
                id, status, started_at, updated_at, total_items,
                retry_failed, item_limit, message, log
            )
            SELECT ?1, 'processing', ?2, ?2, ?3, ?4, ?5, ?6, '[]'
            WHERE NOT EXISTS (SELECT 1 FROM sync_jobs WHERE status = 'processing')
            "#,
        )
        .bind(&new_job.id)
        .bind(now)
        .bind(new_job.total_items)
        .bind(new_job.retry_failed)
        .bind(new_job.item_limit)
        .bind(&new_job.message)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => return Ok(None),
            Ok(_) => {}
            Err(e) => {
                let err = DbError::from(e);
                if err.is_unique_violation() {
                    return Ok(None);
                }
                return Err(err);
            }
        }

        info!(job_id = %new_job.id, total_items = new_job.total_items, "Sync job created");
        self.get(&new_job.id).await
    }

    /// Looks up a job by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<SyncJob>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SyncJob::try_from).transpose()
    }

    /// The PROCESSING job, if any.
    pub async fn active(&self) -> DbResult<Option<SyncJob>> {
        let sql = format!("{SELECT_COLUMNS} WHERE status = 'processing'");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SyncJob::try_from).transpose()
    }

    /// The most recently started job in any state.
    pub async fn latest(&self) -> DbResult<Option<SyncJob>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY started_at DESC, rowid DESC LIMIT 1");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SyncJob::try_from).transpose()
    }

    /// Persists counters, current item and log of a running job.
    ///
    /// ## Returns
    /// `false` when the job is no longer PROCESSING (finished elsewhere).
    pub async fn update_progress(&self, job: &SyncJob) -> DbResult<bool> {
        let log = serde_json::to_string(&job.log)?;

        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                processed_items = ?2,
                success_count   = ?3,
                failed_count    = ?4,
                fake_count      = ?5,
                current_item    = ?6,
                message         = ?7,
                log             = ?8,
                updated_at      = ?9
            WHERE id = ?1 AND status = 'processing'
            "#,
        )
        .bind(&job.id)
        .bind(job.processed_items)
        .bind(job.success_count)
        .bind(job.failed_count)
        .bind(job.fake_count)
        .bind(&job.current_item)
        .bind(&job.message)
        .bind(&log)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Moves a PROCESSING job to its terminal state, persisting final
    /// counters and log.
    pub async fn finish(&self, job: &SyncJob) -> DbResult<bool> {
        debug_assert!(job.status.is_terminal());
        let log = serde_json::to_string(&job.log)?;
        let completed_at = job.completed_at.unwrap_or_else(Utc::now);

        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                status          = ?2,
                completed_at    = ?3,
                updated_at      = ?3,
                processed_items = ?4,
                success_count   = ?5,
                failed_count    = ?6,
                fake_count      = ?7,
                current_item    = NULL,
                message         = ?8,
                log             = ?9
            WHERE id = ?1 AND status = 'processing'
            "#,
        )
        .bind(&job.id)
        .bind(job.status)
        .bind(completed_at)
        .bind(job.processed_items)
        .bind(job.success_count)
        .bind(job.failed_count)
        .bind(job.fake_count)
        .bind(&job.message)
        .bind(&log)
        .execute(&self.pool)
        .await?;

        let finished = result.rows_affected() > 0;
        if finished {
            info!(
                job_id = %job.id,
                status = job.status.as_str(),
                processed = job.processed_items,
                success = job.success_count,
                failed = job.failed_count,
                fakes = job.fake_count,
                "Sync job finished"
            );
        }
        Ok(finished)
    }

    /// Sets the cancel flag on a PROCESSING job.
    ///
    /// ## Returns
    /// `false` when the job is unknown or already terminal.
    pub async fn request_cancel(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE sync_jobs SET cancel_requested = 1 WHERE id = ?1 AND status = 'processing'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        let requested = result.rows_affected() > 0;
        if requested {
            debug!(job_id = %id, "Cancellation requested");
        }
        Ok(requested)
    }

    /// Reads the cancel flag.
    pub async fn is_cancel_requested(&self, id: &str) -> DbResult<bool> {
        let flag: Option<bool> =
            sqlx::query_scalar("SELECT cancel_requested FROM sync_jobs WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(flag.unwrap_or(false))
    }

    /// Terminal jobs, newest first.
    pub async fn history(&self, limit: i64) -> DbResult<Vec<SyncJob>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE status <> 'processing' \
             ORDER BY started_at DESC, rowid DESC LIMIT ?1"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(SyncJob::try_from).collect()
    }

    /// Marks PROCESSING jobs whose heartbeat is older than `cutoff` as ERROR.
    ///
    /// ## When This Occurs
    /// - Process died mid-run; the row would otherwise block every new start
    pub async fn fail_stale_in(
        conn: &mut SqliteConnection,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                status       = 'error',
                completed_at = ?2,
                updated_at   = ?2,
                current_item = NULL,
                message      = 'abandoned: no progress since ' || updated_at
            WHERE status = 'processing' AND updated_at < ?1
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Counts job rows.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn new_job(id: &str, total: i64) -> NewSyncJob {
        NewSyncJob {
            id: id.to_string(),
            total_items: total,
            retry_failed: false,
            item_limit: None,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_only_one_processing_job() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let first = db.sync_jobs().create_if_idle(&new_job("job-1", 3)).await.unwrap();
        assert!(first.is_some());

        let second = db.sync_jobs().create_if_idle(&new_job("job-2", 3)).await.unwrap();
        assert!(second.is_none());
        assert_eq!(db.sync_jobs().active().await.unwrap().unwrap().id, "job-1");
    }

    #[tokio::test]
    async fn test_progress_then_finish() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut job = db
            .sync_jobs()
            .create_if_idle(&new_job("job-1", 2))
            .await
            .unwrap()
            .unwrap();

        job.processed_items = 1;
        job.success_count = 1;
        job.current_item = Some("LM555".into());
        job.log.push("LM555: catalogued".into());
        assert!(db.sync_jobs().update_progress(&job).await.unwrap());

        job.processed_items = 2;
        job.failed_count = 1;
        job.status = SyncJobStatus::Completed;
        job.message = Some("done".into());
        assert!(db.sync_jobs().finish(&job).await.unwrap());

        let stored = db.sync_jobs().get("job-1").await.unwrap().unwrap();
        assert_eq!(stored.status, SyncJobStatus::Completed);
        assert_eq!(stored.processed_items, 2);
        assert_eq!(stored.log, vec!["LM555: catalogued"]);
        assert!(stored.completed_at.is_some());
        assert!(stored.current_item.is_none());

        // A finished job accepts no further writes
        assert!(!db.sync_jobs().update_progress(&job).await.unwrap());
        assert!(!db.sync_jobs().finish(&job).await.unwrap());

        // Slot is free again
        assert!(db.sync_jobs().create_if_idle(&new_job("job-2", 0)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cancel_flag() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.sync_jobs().create_if_idle(&new_job("job-1", 5)).await.unwrap();

        assert!(!db.sync_jobs().is_cancel_requested("job-1").await.unwrap());
        assert!(db.sync_jobs().request_cancel("job-1").await.unwrap());
        assert!(db.sync_jobs().is_cancel_requested("job-1").await.unwrap());
        assert!(!db.sync_jobs().request_cancel("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_history_excludes_running_job() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut job = db
            .sync_jobs()
            .create_if_idle(&new_job("job-1", 0))
            .await
            .unwrap()
            .unwrap();
        job.status = SyncJobStatus::Cancelled;
        db.sync_jobs().finish(&job).await.unwrap();
        db.sync_jobs().create_if_idle(&new_job("job-2", 0)).await.unwrap();

        let history = db.sync_jobs().history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "job-1");
        assert_eq!(db.sync_jobs().latest().await.unwrap().unwrap().id, "job-2");
    }
}
