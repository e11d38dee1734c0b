//! # Control Surface
//!
//! Transport-agnostic entry points for hosts (HTTP handlers, a desktop shell,
//! a CLI). Every operation returns an [`EngineResult`]; hosts that need a
//! serializable error convert it with `ApiError::from`.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ControlSurface                                   │
//! │                                                                         │
//! │  Sync                        Scans                                      │
//! │  ────                        ─────                                      │
//! │  start_sync(request)         verify(input)                              │
//! │  get_sync_status()           submit_bottom_scan(scan_id, pins)          │
//! │  cancel_sync()               manual_override(scan_id, pn, note)         │
//! │  sync_history(limit)         get_scan(scan_id)                          │
//! │  get_sync_job(job_id)        list_scans(filter, page)                   │
//! │                                                                         │
//! │  Stores                                                                 │
//! │  ──────                                                                 │
//! │  report_fake / remove_fake / list_fakes                                 │
//! │  list_queue / remove_from_queue                                         │
//! │  list_catalog / get_catalog_entry / upsert_catalog_entry                │
//! │  stats / health_check / shutdown                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use icv_core::validation::{validate_page, validate_pin_count, validate_reason};
use icv_core::{
    CatalogEntry, CoreError, FakeRegistryEntry, FakeReport, FakeSource, NewCatalogEntry, Page,
    Paginated, PartNumber, QueueItem, Scan, ScanInput, StoreStats, SyncJob, SyncProgress,
    SyncRequest, VerificationOutcome,
};
use icv_db::{
    CatalogFilter, CatalogRepository, Database, DbError, QueueFilter, ScanFilter,
    SyncQueueRepository,
};

use crate::config::{EngineConfig, SyncSettings};
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::resolver::DatasheetResolver;
use crate::sync::SyncJobEngine;
use crate::verifier::ScanVerifier;

/// Both engines plus store administration behind one handle.
#[derive(Debug, Clone)]
pub struct ControlSurface {
    db: Database,
    verifier: ScanVerifier,
    sync: SyncJobEngine,
}

impl ControlSurface {
    /// Opens the database from `config`, reconciles state left by a previous
    /// process, and wires up the engines.
    pub async fn open(
        config: &EngineConfig,
        resolver: Arc<dyn DatasheetResolver>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let db = Database::new(config.database.db_config()).await?;
        let report = db.reconcile(config.sync.stale_after()).await?;
        if report.is_clean() {
            info!("Store consistent at startup");
        } else {
            warn!(
                stale_jobs = report.stale_jobs,
                requeued = report.requeued,
                removed_catalogued = report.removed_catalogued,
                removed_fake = report.removed_fake,
                "Reconciled store at startup"
            );
        }

        Ok(Self::with_database(db, resolver, config.sync.clone()))
    }

    /// Wires the engines over an already-open database.
    pub fn with_database(
        db: Database,
        resolver: Arc<dyn DatasheetResolver>,
        settings: SyncSettings,
    ) -> Self {
        ControlSurface {
            verifier: ScanVerifier::new(db.clone()),
            sync: SyncJobEngine::new(db.clone(), resolver, settings),
            db,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Sync
    // =========================================================================

    pub async fn start_sync(&self, request: SyncRequest) -> EngineResult<SyncJob> {
        self.sync.start(request).await
    }

    pub async fn get_sync_status(&self) -> EngineResult<SyncProgress> {
        self.sync.status().await
    }

    /// Returns the id of the job asked to stop, or `None` when idle.
    pub async fn cancel_sync(&self) -> EngineResult<Option<String>> {
        self.sync.cancel().await
    }

    pub async fn sync_history(&self, limit: i64) -> EngineResult<Vec<SyncJob>> {
        self.sync.history(limit).await
    }

    pub async fn get_sync_job(&self, job_id: &str) -> EngineResult<SyncJob> {
        self.sync.get_job(job_id).await
    }

    /// Blocks until `job_id` reaches a terminal status.
    pub async fn wait_for_sync(&self, job_id: &str) -> EngineResult<SyncJob> {
        self.sync.wait_for(job_id).await
    }

    // =========================================================================
    // Scans
    // =========================================================================

    pub async fn verify(&self, input: ScanInput) -> EngineResult<VerificationOutcome> {
        self.verifier.verify(input).await
    }

    pub async fn submit_bottom_scan(
        &self,
        scan_id: &str,
        detected_pins: i64,
    ) -> EngineResult<VerificationOutcome> {
        self.verifier.submit_bottom_scan(scan_id, detected_pins).await
    }

    pub async fn manual_override(
        &self,
        scan_id: &str,
        new_part_number: &str,
        note: Option<&str>,
    ) -> EngineResult<VerificationOutcome> {
        self.verifier
            .manual_override(scan_id, new_part_number, note)
            .await
    }

    pub async fn get_scan(&self, scan_id: &str) -> EngineResult<Scan> {
        self.verifier.get_scan(scan_id).await
    }

    pub async fn list_scans(&self, filter: &ScanFilter, page: Page) -> EngineResult<Paginated<Scan>> {
        self.verifier.list_scans(filter, page).await
    }

    // =========================================================================
    // Fake Registry
    // =========================================================================

    /// Registers a part number as counterfeit on an operator's report.
    ///
    /// Removes any queue row for the part in the same transaction.
    ///
    /// ## Returns
    /// * `Err(Conflict)` - The part is already registered
    pub async fn report_fake(
        &self,
        part_number: &str,
        reason: &str,
        reported_by: Option<&str>,
    ) -> EngineResult<FakeRegistryEntry> {
        let part_number = PartNumber::parse(part_number)?;
        validate_reason(reason)?;

        let report = FakeReport {
            part_number: part_number.clone(),
            reason: reason.trim().to_string(),
            source: FakeSource::Manual,
            reported_by: reported_by.map(str::to_string),
            scrape_attempts: 0,
            manufacturers_checked: Vec::new(),
        };

        match self.db.fake_registry().register(&report).await {
            Ok(entry) => Ok(entry),
            Err(DbError::UniqueViolation { .. }) => {
                Err(CoreError::AlreadyReported(part_number.into_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove_fake(&self, part_number: &str) -> EngineResult<()> {
        let part_number = PartNumber::parse(part_number)?;
        match self.db.fake_registry().delete(&part_number).await {
            Ok(()) => Ok(()),
            Err(DbError::NotFound { .. }) => {
                Err(CoreError::NotInRegistry(part_number.into_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_fakes(
        &self,
        search: Option<&str>,
        page: Page,
    ) -> EngineResult<Paginated<FakeRegistryEntry>> {
        validate_page(&page)?;
        Ok(self.db.fake_registry().list(search, page).await?)
    }

    // =========================================================================
    // Sync Queue
    // =========================================================================

    pub async fn list_queue(
        &self,
        filter: &QueueFilter,
        page: Page,
    ) -> EngineResult<Paginated<QueueItem>> {
        validate_page(&page)?;
        Ok(self.db.sync_queue().list(filter, page).await?)
    }

    pub async fn remove_from_queue(&self, part_number: &str) -> EngineResult<()> {
        let part_number = PartNumber::parse(part_number)?;
        Ok(self.db.sync_queue().delete(&part_number).await?)
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub async fn list_catalog(
        &self,
        filter: &CatalogFilter,
        page: Page,
    ) -> EngineResult<Paginated<CatalogEntry>> {
        validate_page(&page)?;
        Ok(self.db.catalog().list(filter, page).await?)
    }

    pub async fn get_catalog_entry(&self, part_number: &str) -> EngineResult<CatalogEntry> {
        let part_number = PartNumber::parse(part_number)?;
        self.db
            .catalog()
            .get(&part_number)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "CatalogEntry".to_string(),
                id: part_number.into_string(),
            })
    }

    /// Curates a catalog entry by hand. Clears any queue row for the part.
    pub async fn upsert_catalog_entry(&self, entry: NewCatalogEntry) -> EngineResult<CatalogEntry> {
        if let Some(pins) = entry.pin_count {
            validate_pin_count(pins)?;
        }

        let mut tx = self.db.begin().await?;
        let stored = CatalogRepository::upsert_in(&mut tx, &entry, Utc::now()).await?;
        SyncQueueRepository::delete_in(&mut tx, &entry.part_number).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(part_number = %stored.part_number, source = %stored.source, "Catalog entry saved");
        Ok(stored)
    }

    // =========================================================================
    // Administration
    // =========================================================================

    pub async fn stats(&self) -> EngineResult<StoreStats> {
        Ok(self.db.stats().await?)
    }

    pub async fn health_check(&self) -> bool {
        self.db.health_check().await
    }

    /// Stops a running job and closes the pool.
    pub async fn shutdown(&self) {
        if let Ok(Some(job_id)) = self.sync.cancel().await {
            if let Err(e) = self.sync.wait_for(&job_id).await {
                error!(job_id = %job_id, error = %e, "Sync job did not stop cleanly");
            }
        }
        self.db.close().await;
    }
}

// =============================================================================
// Serializable Error
// =============================================================================

/// Error shape handed to hosts.
///
/// ```json
/// { "code": "CONFLICT", "message": "Sync job 6f1c... is already processing" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub code: ErrorKind,
    pub message: String,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let code = err.kind();
        let message = match code {
            ErrorKind::Persistence | ErrorKind::Internal => {
                // Store details stay in the log
                error!(error = %err, "Operation failed");
                "Operation failed; see server log".to_string()
            }
            _ => err.to_string(),
        };
        ApiError { code, message }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
