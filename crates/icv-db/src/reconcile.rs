//! # Startup Reconciliation
//!
//! Repairs what an interrupted process can leave behind. Every store
//! transition is a single transaction, so the only debris is:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Debris                                  Repair                         │
//! │  ─────────────────────────────────────   ─────────────────────────────  │
//! │  PROCESSING job with a stale heartbeat   → ERROR ("abandoned ...")      │
//! │  queue row stuck in PROCESSING           → PENDING (attempt not counted)│
//! │  queue row also present in catalog       → queue row deleted            │
//! │  queue row also present in fake registry → queue row deleted            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The last two only arise from rows written by external tools (or the
//! seed binary) straight into the catalog or registry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::DbResult;
use crate::repository::jobs::SyncJobRepository;
use crate::repository::queue::SyncQueueRepository;

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub stale_jobs: u64,
    pub requeued: u64,
    pub removed_catalogued: u64,
    pub removed_fake: u64,
}

impl ReconcileReport {
    /// True when nothing needed repair.
    pub fn is_clean(&self) -> bool {
        *self == ReconcileReport::default()
    }
}

/// Runs one reconciliation pass in a single transaction.
///
/// ## Arguments
/// * `cutoff` - PROCESSING jobs whose `updated_at` is older than this are
///   considered abandoned
pub async fn reconcile(pool: &SqlitePool, cutoff: DateTime<Utc>) -> DbResult<ReconcileReport> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let stale_jobs = SyncJobRepository::fail_stale_in(&mut tx, cutoff, now).await?;

    let removed_catalogued = sqlx::query(
        "DELETE FROM sync_queue WHERE part_number IN (SELECT part_number FROM catalog)",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let removed_fake = sqlx::query(
        "DELETE FROM sync_queue WHERE part_number IN (SELECT part_number FROM fake_registry)",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let requeued = SyncQueueRepository::requeue_orphaned_in(&mut tx).await?;

    tx.commit().await?;

    let report = ReconcileReport {
        stale_jobs,
        requeued,
        removed_catalogued,
        removed_fake,
    };

    if report.is_clean() {
        info!("Reconciliation found nothing to repair");
    } else {
        warn!(?report, "Reconciliation repaired inconsistent state");
    }
    Ok(report)
}

// =============================================================================
// Unit Tests
// =============================================================================
