//! # Sync Queue Repository
//!
//! Durable backlog of part numbers that verification could not find in the
//! catalog, plus the two terminal transitions out of it.
//!
//! ## Queue Row Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  upsert_scan ──► PENDING ◄──────────────┐  (re-scan: scan_count += 1)  │
//! │                     │                   │                               │
//! │          mark_processing                │                               │
//! │                     ▼                   │                               │
//! │                 PROCESSING              │                               │
//! │                 │        │              │                               │
//! │   promote_to_catalog    record_failure  │                               │
//! │         │                │              │                               │
//! │         │        retry_count < N ──► FAILED (retry run) ───────┘      │
//! │         │                │                                              │
//! │         │        retry_count ≥ N                                        │
//! │         ▼                ▼                                              │
//! │  ┌──────────────┐  ┌──────────────┐                                     │
//! │  │ INSERT catalog│ │INSERT fake_  │   one transaction each;            │
//! │  │ DELETE queue │  │registry      │   no reader ever sees the part     │
//! │  └──────────────┘  │DELETE queue  │   in both stores or in neither     │
//! │                    └──────────────┘                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use icv_core::{
    CatalogEntry, FakeRegistryEntry, FakeReport, NewCatalogEntry, Page, Paginated, PartNumber,
    QueueItem, QueueStatus, SyncRequest,
};

use crate::error::{DbError, DbResult};
use crate::repository::catalog::CatalogRepository;
use crate::repository::fake_registry::FakeRegistryRepository;
use crate::repository::part_number_pattern;

const SELECT_COLUMNS: &str = r#"
    SELECT part_number, first_seen_at, last_scanned_at, scan_count, status,
           retry_count, error_message, last_attempt_at
    FROM sync_queue
"#;

/// Filters for listing the queue.
#[derive(Debug, Clone, Default)]
pub struct QueueFilter {
    pub statuses: Option<Vec<QueueStatus>>,
    pub search: Option<String>,
}

/// What `record_failure` did with the row.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// Row stays queued as FAILED, eligible for a retry run.
    Failed { retry_count: i64 },
    /// Row reached the threshold and moved to the fake registry.
    Escalated {
        retry_count: i64,
        entry: FakeRegistryEntry,
    },
    /// Row disappeared before the failure was recorded.
    Missing,
}

/// What `promote_to_catalog` did with the row.
#[derive(Debug, Clone, PartialEq)]
pub enum PromoteOutcome {
    /// Catalog rows written, queue row deleted.
    Promoted(Vec<CatalogEntry>),
    /// The part was registered as counterfeit meanwhile; only the queue row
    /// was removed.
    AlreadyCounterfeit,
}

/// Encodes statuses for `status IN (SELECT value FROM json_each(?))`.
fn statuses_json(statuses: &[QueueStatus]) -> DbResult<String> {
    let names: Vec<&str> = statuses.iter().map(QueueStatus::as_str).collect();
    Ok(serde_json::to_string(&names)?)
}

/// Repository for sync queue operations.
#[derive(Debug, Clone)]
pub struct SyncQueueRepository {
    pool: SqlitePool,
}

impl SyncQueueRepository {
    /// Creates a new SyncQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncQueueRepository { pool }
    }

    /// Looks up a queue row.
    pub async fn get(&self, part_number: &PartNumber) -> DbResult<Option<QueueItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, part_number).await
    }

    /// Looks up a queue row on an existing connection or transaction.
    pub async fn get_in(
        conn: &mut SqliteConnection,
        part_number: &PartNumber,
    ) -> DbResult<Option<QueueItem>> {
        let sql = format!("{SELECT_COLUMNS} WHERE part_number = ?1");
        let item = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(part_number)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(item)
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Records an unresolved scan of `part_number`.
    ///
    /// First sighting inserts a PENDING row with `scan_count = 1`; every
    /// later sighting bumps `scan_count` and `last_scanned_at`. Status and
    /// `retry_count` are left alone, so concurrent calls commute.
    pub async fn upsert_scan(&self, part_number: &PartNumber) -> DbResult<QueueItem> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_scan_in(&mut conn, part_number, Utc::now()).await
    }

    /// [`upsert_scan`](Self::upsert_scan) on an existing transaction.
    pub async fn upsert_scan_in(
        conn: &mut SqliteConnection,
        part_number: &PartNumber,
        now: DateTime<Utc>,
    ) -> DbResult<QueueItem> {
        sqlx::query(
            r#"
            INSERT INTO sync_queue (
                part_number, first_seen_at, last_scanned_at, scan_count, status, retry_count
            ) VALUES (?1, ?2, ?2, 1, 'pending', 0)
            ON CONFLICT(part_number) DO UPDATE SET
                scan_count      = sync_queue.scan_count + 1,
                last_scanned_at = excluded.last_scanned_at
            "#,
        )
        .bind(part_number)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let item = Self::get_in(conn, part_number)
            .await?
            .ok_or_else(|| DbError::not_found("QueueItem", part_number.as_str()))?;

        debug!(part_number = %part_number, scan_count = item.scan_count, "Queued for sync");
        Ok(item)
    }

    // =========================================================================
    // Sync Run Operations
    // =========================================================================

    /// Returns the work list for a sync run, oldest first.
    ///
    /// ## Arguments
    /// * `request` - PENDING always, FAILED when `retry_failed`, narrowed by
    ///   `statuses` and capped by `limit`
    pub async fn snapshot(&self, request: &SyncRequest) -> DbResult<Vec<QueueItem>> {
        let statuses = request.eligible_statuses();
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{SELECT_COLUMNS} WHERE status IN (SELECT value FROM json_each(?1)) \
             ORDER BY first_seen_at, part_number LIMIT ?2"
        );
        let items = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(statuses_json(&statuses)?)
            .bind(request.limit.unwrap_or(-1))
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    /// Marks a row PROCESSING before its resolver call.
    ///
    /// ## Returns
    /// `false` when the row no longer exists (promoted as another variant,
    /// reported as fake, or removed by an operator since the snapshot).
    pub async fn mark_processing(&self, part_number: &PartNumber) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue
            SET status = 'processing', last_attempt_at = ?2
            WHERE part_number = ?1
            "#,
        )
        .bind(part_number)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Moves a resolved part into the catalog.
    ///
    /// Every variant is upserted and the queue rows of all catalogued part
    /// numbers are deleted, in one transaction. Variants already in the fake
    /// registry are left out of the catalog.
    pub async fn promote_to_catalog(
        &self,
        part_number: &PartNumber,
        entries: &[NewCatalogEntry],
    ) -> DbResult<PromoteOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        if FakeRegistryRepository::get_in(&mut tx, part_number)
            .await?
            .is_some()
        {
            Self::delete_in(&mut tx, part_number).await?;
            tx.commit().await?;
            warn!(part_number = %part_number, "Resolved part is registered as counterfeit; not catalogued");
            return Ok(PromoteOutcome::AlreadyCounterfeit);
        }

        let mut stored = Vec::with_capacity(entries.len());
        for entry in entries {
            // A part lives in at most one of catalog / fake registry
            if FakeRegistryRepository::get_in(&mut tx, &entry.part_number)
                .await?
                .is_some()
            {
                debug!(variant = %entry.part_number, "Skipping variant registered as counterfeit");
                continue;
            }
            stored.push(CatalogRepository::upsert_in(&mut tx, entry, now).await?);
            Self::delete_in(&mut tx, &entry.part_number).await?;
        }
        Self::delete_in(&mut tx, part_number).await?;

        tx.commit().await?;

        info!(
            part_number = %part_number,
            variants = stored.len(),
            "Promoted to catalog"
        );
        Ok(PromoteOutcome::Promoted(stored))
    }

    /// Records a failed resolution attempt, escalating at `threshold`.
    ///
    /// ## Escalation
    /// ```text
    /// retry_count += 1
    /// retry_count ≥ threshold ? INSERT fake_registry + DELETE queue
    ///                         : status = FAILED
    /// ```
    /// Escalation keys on the attempt count only, never on elapsed time.
    pub async fn record_failure(
        &self,
        part_number: &PartNumber,
        error: &str,
        threshold: i64,
        providers_checked: &[String],
    ) -> DbResult<FailureOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let retry_count: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE sync_queue SET
                retry_count     = retry_count + 1,
                error_message   = ?2,
                status          = 'failed',
                last_attempt_at = ?3
            WHERE part_number = ?1
            RETURNING retry_count
            "#,
        )
        .bind(part_number)
        .bind(error)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(retry_count) = retry_count else {
            tx.rollback().await?;
            return Ok(FailureOutcome::Missing);
        };

        if retry_count < threshold {
            tx.commit().await?;
            debug!(part_number = %part_number, retry_count, "Resolution failed; will retry");
            return Ok(FailureOutcome::Failed { retry_count });
        }

        let report =
            FakeReport::escalation(part_number.clone(), retry_count, providers_checked.to_vec());
        let entry = match FakeRegistryRepository::insert_in(&mut tx, &report, now).await? {
            Some(entry) => entry,
            None => FakeRegistryRepository::get_in(&mut tx, part_number)
                .await?
                .ok_or_else(|| DbError::not_found("FakeRegistryEntry", part_number.as_str()))?,
        };
        Self::delete_in(&mut tx, part_number).await?;

        tx.commit().await?;

        warn!(
            part_number = %part_number,
            retry_count,
            "Escalated to fake registry"
        );
        Ok(FailureOutcome::Escalated { retry_count, entry })
    }

    /// Puts PROCESSING rows back to PENDING when no job is running.
    ///
    /// A run that aborts mid-item leaves its current row PROCESSING, which
    /// no snapshot selects. Rows owned by a live job are left alone.
    pub async fn requeue_orphaned(&self) -> DbResult<u64> {
        let mut conn = self.pool.acquire().await?;
        Self::requeue_orphaned_in(&mut conn).await
    }

    /// Same as [`requeue_orphaned`](Self::requeue_orphaned) on an existing
    /// transaction.
    pub async fn requeue_orphaned_in(conn: &mut SqliteConnection) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue SET status = 'pending'
            WHERE status = 'processing'
              AND NOT EXISTS (SELECT 1 FROM sync_jobs WHERE status = 'processing')
            "#,
        )
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() > 0 {
            info!(requeued = result.rows_affected(), "Requeued orphaned queue rows");
        }
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Removes a queue row.
    pub async fn delete(&self, part_number: &PartNumber) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        if !Self::delete_in(&mut conn, part_number).await? {
            return Err(DbError::not_found("QueueItem", part_number.as_str()));
        }
        Ok(())
    }

    /// Removes a queue row on an existing transaction; returns whether a
    /// row was deleted.
    pub async fn delete_in(
        conn: &mut SqliteConnection,
        part_number: &PartNumber,
    ) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE part_number = ?1")
            .bind(part_number)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Lists queue rows, oldest first.
    pub async fn list(&self, filter: &QueueFilter, page: Page) -> DbResult<Paginated<QueueItem>> {
        let statuses = match &filter.statuses {
            Some(s) => Some(statuses_json(s)?),
            None => None,
        };
        let pattern = part_number_pattern(filter.search.as_deref());
        let where_clause = r#"
            WHERE (?1 IS NULL OR status IN (SELECT value FROM json_each(?1)))
              AND (?2 IS NULL OR part_number LIKE ?2 ESCAPE '\')
        "#;

        let sql = format!(
            "{SELECT_COLUMNS} {where_clause} ORDER BY first_seen_at, part_number LIMIT ?3 OFFSET ?4"
        );
        let items = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(&statuses)
            .bind(&pattern)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM sync_queue {where_clause}"))
                .bind(&statuses)
                .bind(&pattern)
                .fetch_one(&self.pool)
                .await?;

        Ok(Paginated {
            items,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// Counts queue rows.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
