//! # Scan Verification Engine
//!
//! Turns one capture into a persisted verdict.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ScanVerifier::verify                             │
//! │                                                                         │
//! │  validate input ── bad ──► ValidationError (nothing written)            │
//! │       │                                                                 │
//! │       ▼  BEGIN                                                          │
//! │  fake registry ─► catalog ─► decide()                                   │
//! │       │                                                                 │
//! │       ├─ queue_for_sync ──► sync_queue upsert (scan_count += 1)         │
//! │       ▼                                                                 │
//! │  INSERT scan  COMMIT                                                    │
//! │                                                                         │
//! │  Follow-ups on an existing scan:                                        │
//! │    PARTIAL ── submit_bottom_scan ──► PASS | FAIL                        │
//! │    any     ── manual_override ─────► full re-run with the new number    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use icv_core::validation::{
    validate_detected_pins, validate_note, validate_page, validate_scan_input, validate_uuid,
};
use icv_core::verification::unreadable;
use icv_core::{
    decide, evaluate_match, CoreError, Observation, Page, Paginated, PartNumber, Scan, ScanInput,
    ScanStatus, VerificationOutcome, Verdict,
};
use icv_db::{
    CatalogRepository, Database, DbError, FakeRegistryRepository, ScanFilter, ScanRepository,
    SyncQueueRepository,
};

use crate::error::EngineResult;

/// Confidence given to operator-entered part numbers and captures without
/// an OCR score.
const FULL_CONFIDENCE: f64 = 1.0;

/// Verifies scans against the catalog and fake registry.
#[derive(Debug, Clone)]
pub struct ScanVerifier {
    db: Database,
}

impl ScanVerifier {
    pub fn new(db: Database) -> Self {
        ScanVerifier { db }
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Verifies one capture and persists the scan.
    ///
    /// ## Returns
    /// * `Ok(outcome)` - Verdict plus the new scan id
    /// * `Err(Validation)` - Malformed input; nothing was written
    pub async fn verify(&self, input: ScanInput) -> EngineResult<VerificationOutcome> {
        validate_scan_input(&input)?;

        let candidate = PartNumber::parse_candidate(input.part_number_candidate.as_deref());
        let observation = Observation {
            detected_pins: input.detected_pins,
            manufacturer: input.manufacturer_detected.clone(),
            confidence: input.ocr_confidence.unwrap_or(FULL_CONFIDENCE),
        };

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let verdict = match &candidate {
            Some(part_number) => run_pipeline(&mut tx, part_number, &observation).await?,
            None => unreadable(),
        };

        let queued = enqueue_if_needed(&mut tx, &verdict).await?;

        let scan = Scan {
            id: Uuid::new_v4().to_string(),
            ocr_text: input.ocr_text,
            ocr_confidence: input.ocr_confidence,
            part_number_detected: input.part_number_candidate,
            part_number_verified: verdict.part_number.clone(),
            status: verdict.status,
            action_required: verdict.action,
            confidence: verdict.confidence,
            detected_pins: input.detected_pins,
            expected_pins: verdict.expected_pins,
            manufacturer_detected: input.manufacturer_detected,
            match_details: verdict.match_details.clone(),
            message: verdict.message.clone(),
            queued_for_sync: queued,
            was_manual_override: false,
            override_note: None,
            scanned_at: now,
            completed_at: verdict.is_final().then_some(now),
        };

        ScanRepository::insert_in(&mut tx, &scan).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            scan_id = %scan.id,
            status = scan.status.as_str(),
            part_number = ?scan.part_number_verified.as_ref().map(PartNumber::as_str),
            "Scan verified"
        );
        Ok(VerificationOutcome::from(&scan))
    }

    // =========================================================================
    // Follow-ups
    // =========================================================================

    /// Completes a PARTIAL scan with the pin count seen from underneath.
    ///
    /// ## Returns
    /// * `Err(NotFound)` - Unknown scan id
    /// * `Err(Conflict)` - Scan is not PARTIAL, or its catalog entry is gone;
    ///   the scan is left untouched
    pub async fn submit_bottom_scan(
        &self,
        scan_id: &str,
        detected_pins: i64,
    ) -> EngineResult<VerificationOutcome> {
        validate_uuid(scan_id)?;
        validate_detected_pins(detected_pins)?;

        let mut tx = self.db.begin().await?;
        let mut scan = load_scan(&mut tx, scan_id).await?;

        if scan.status != ScanStatus::Partial {
            return Err(CoreError::InvalidScanStatus {
                scan_id: scan.id,
                current_status: scan.status.as_str().to_uppercase(),
                expected: "PARTIAL".to_string(),
            }
            .into());
        }

        let Some(part_number) = scan.part_number_verified.clone() else {
            return Err(CoreError::CatalogEntryMissing(scan.id).into());
        };
        let Some(entry) = CatalogRepository::get_in(&mut tx, &part_number).await? else {
            return Err(CoreError::CatalogEntryMissing(part_number.into_string()).into());
        };

        let observation = Observation {
            detected_pins,
            manufacturer: scan.manufacturer_detected.clone(),
            confidence: scan.confidence,
        };
        let verdict = evaluate_match(&part_number, &entry, &observation);

        scan.detected_pins = detected_pins;
        apply_verdict(&mut scan, &verdict);
        ScanRepository::update_in(&mut tx, &scan).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(scan_id = %scan.id, status = scan.status.as_str(), "Bottom scan applied");
        Ok(VerificationOutcome::from(&scan))
    }

    /// Replaces the part number of any scan and re-runs the pipeline.
    ///
    /// The new number may reveal a counterfeit, land in the catalog, or
    /// queue for sync exactly like a fresh capture.
    pub async fn manual_override(
        &self,
        scan_id: &str,
        new_part_number: &str,
        note: Option<&str>,
    ) -> EngineResult<VerificationOutcome> {
        validate_uuid(scan_id)?;
        let part_number = PartNumber::parse(new_part_number)?;
        if let Some(note) = note {
            validate_note(note)?;
        }

        let mut tx = self.db.begin().await?;
        let mut scan = load_scan(&mut tx, scan_id).await?;

        let observation = Observation {
            detected_pins: scan.detected_pins,
            manufacturer: scan.manufacturer_detected.clone(),
            confidence: FULL_CONFIDENCE,
        };
        let verdict = run_pipeline(&mut tx, &part_number, &observation).await?;
        let queued = enqueue_if_needed(&mut tx, &verdict).await?;

        let previous = scan.status;
        apply_verdict(&mut scan, &verdict);
        scan.queued_for_sync = queued;
        scan.was_manual_override = true;
        scan.override_note = note.map(str::to_string).filter(|n| !n.trim().is_empty());
        ScanRepository::update_in(&mut tx, &scan).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            scan_id = %scan.id,
            part_number = %part_number,
            from = previous.as_str(),
            to = scan.status.as_str(),
            "Manual override applied"
        );
        Ok(VerificationOutcome::from(&scan))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Looks up one scan.
    pub async fn get_scan(&self, scan_id: &str) -> EngineResult<Scan> {
        validate_uuid(scan_id)?;
        self.db
            .scans()
            .get(scan_id)
            .await?
            .ok_or_else(|| CoreError::ScanNotFound(scan_id.to_string()).into())
    }

    /// Lists scans, newest first.
    pub async fn list_scans(&self, filter: &ScanFilter, page: Page) -> EngineResult<Paginated<Scan>> {
        validate_page(&page)?;
        Ok(self.db.scans().list(filter, page).await?)
    }
}

// =============================================================================
// Pipeline Helpers
// =============================================================================

/// Steps 2 to 5 against the stores, read inside the caller's transaction.
async fn run_pipeline(
    conn: &mut SqliteConnection,
    part_number: &PartNumber,
    observation: &Observation,
) -> EngineResult<Verdict> {
    let fake = FakeRegistryRepository::get_in(conn, part_number).await?;
    let catalog = match &fake {
        Some(_) => None,
        None => CatalogRepository::get_in(conn, part_number).await?,
    };
    let verdict = decide(part_number, fake.as_ref(), catalog.as_ref(), observation);
    debug!(part_number = %part_number, status = verdict.status.as_str(), "Pipeline decided");
    Ok(verdict)
}

async fn enqueue_if_needed(conn: &mut SqliteConnection, verdict: &Verdict) -> EngineResult<bool> {
    match (&verdict.part_number, verdict.queue_for_sync) {
        (Some(part_number), true) => {
            SyncQueueRepository::upsert_scan_in(conn, part_number, Utc::now()).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

async fn load_scan(conn: &mut SqliteConnection, scan_id: &str) -> EngineResult<Scan> {
    ScanRepository::get_in(conn, scan_id)
        .await?
        .ok_or_else(|| CoreError::ScanNotFound(scan_id.to_string()).into())
}

fn apply_verdict(scan: &mut Scan, verdict: &Verdict) {
    scan.part_number_verified = verdict.part_number.clone();
    scan.status = verdict.status;
    scan.action_required = verdict.action;
    scan.confidence = verdict.confidence;
    scan.expected_pins = verdict.expected_pins;
    scan.match_details = verdict.match_details.clone();
    scan.message = verdict.message.clone();
    scan.completed_at = verdict.is_final().then(Utc::now);
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use icv_core::{ActionRequired, FakeReport, FakeSource, NewCatalogEntry, SOURCE_MANUAL};
    use icv_db::DbConfig;

    fn pn(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    async fn setup() -> (Database, ScanVerifier) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        (db.clone(), ScanVerifier::new(db))
    }

    async fn catalog(db: &Database, part: &str, pins: i64, manufacturer: &str, package: &str) {
        let mut entry = NewCatalogEntry::new(pn(part), SOURCE_MANUAL);
        entry.pin_count = Some(pins);
        entry.manufacturer = Some(manufacturer.to_string());
        entry.package_type = Some(package.to_string());
        db.catalog().upsert(&entry).await.unwrap();
    }

    async fn report_fake(db: &Database, part: &str) {
        db.fake_registry()
            .register(&FakeReport {
                part_number: pn(part),
                reason: "remarked".into(),
                source: FakeSource::Manual,
                reported_by: None,
                scrape_attempts: 0,
                manufacturers_checked: vec![],
            })
            .await
            .unwrap();
    }

    fn input(candidate: Option<&str>, pins: i64, manufacturer: Option<&str>) -> ScanInput {
        ScanInput {
            ocr_text: candidate.map(str::to_string),
            ocr_confidence: Some(0.9),
            detected_pins: pins,
            manufacturer_detected: manufacturer.map(str::to_string),
            part_number_candidate: candidate.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_verify_pass() {
        let (db, verifier) = setup().await;
        catalog(&db, "LM358", 8, "Texas Instruments", "SOIC-8").await;

        let outcome = verifier
            .verify(input(Some("lm358"), 8, Some("TI")))
            .await
            .unwrap();

        assert_eq!(outcome.status, ScanStatus::Pass);
        assert_eq!(outcome.confidence, 0.9);
        let scan = verifier.get_scan(&outcome.scan_id).await.unwrap();
        assert!(scan.completed_at.is_some());
        assert_eq!(scan.part_number_verified, Some(pn("LM358")));
    }

    #[tokio::test]
    async fn test_unreadable_candidate_asks_for_manual_entry() {
        let (db, verifier) = setup().await;
        let outcome = verifier.verify(input(Some("none"), 8, None)).await.unwrap();

        assert_eq!(outcome.status, ScanStatus::Unknown);
        assert_eq!(outcome.action_required, ActionRequired::ManualEntry);
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(db.sync_queue().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counterfeit_wins_and_never_queues() {
        let (db, verifier) = setup().await;
        report_fake(&db, "NE555X").await;

        let outcome = verifier
            .verify(input(Some("NE555X"), 8, Some("Texas Instruments")))
            .await
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::Counterfeit);
        assert!(!outcome.queued_for_sync);
        assert_eq!(db.sync_queue().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_input_writes_nothing() {
        let (db, verifier) = setup().await;
        let err = verifier
            .verify(input(Some("LM358"), -1, None))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(db.scans().count().await.unwrap(), 0);
        assert_eq!(db.sync_queue().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bottom_scan_only_from_partial() {
        let (db, verifier) = setup().await;
        catalog(&db, "TPS62160", 8, "Texas Instruments", "WSON-8").await;
        catalog(&db, "LM358", 8, "Texas Instruments", "SOIC-8").await;

        let partial = verifier
            .verify(input(Some("TPS62160"), 0, None))
            .await
            .unwrap();
        assert_eq!(partial.status, ScanStatus::Partial);
        assert_eq!(partial.action_required, ActionRequired::ScanBottom);
        assert!(verifier
            .get_scan(&partial.scan_id)
            .await
            .unwrap()
            .completed_at
            .is_none());

        let passed = verifier.verify(input(Some("LM358"), 8, None)).await.unwrap();
        let before = verifier.get_scan(&passed.scan_id).await.unwrap();
        let err = verifier
            .submit_bottom_scan(&passed.scan_id, 8)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(verifier.get_scan(&passed.scan_id).await.unwrap(), before);

        let done = verifier.submit_bottom_scan(&partial.scan_id, 8).await.unwrap();
        assert_eq!(done.status, ScanStatus::Pass);
        assert!(verifier
            .get_scan(&partial.scan_id)
            .await
            .unwrap()
            .completed_at
            .is_some());

        let again = verifier
            .submit_bottom_scan(&partial.scan_id, 8)
            .await
            .unwrap_err();
        assert!(again.is_conflict());
    }

    #[tokio::test]
    async fn test_bottom_scan_wrong_pin_count_fails() {
        let (db, verifier) = setup().await;
        catalog(&db, "TPS62160", 8, "Texas Instruments", "WSON-8").await;

        let partial = verifier.verify(input(Some("TPS62160"), 0, None)).await.unwrap();
        let done = verifier.submit_bottom_scan(&partial.scan_id, 6).await.unwrap();
        assert_eq!(done.status, ScanStatus::Fail);
    }

    #[tokio::test]
    async fn test_manual_override_reveals_fake() {
        let (db, verifier) = setup().await;
        report_fake(&db, "LM358FAKE").await;

        let unknown = verifier.verify(input(Some("LM358?"), 8, None)).await.unwrap();
        assert_eq!(unknown.status, ScanStatus::Unknown);

        let outcome = verifier
            .manual_override(&unknown.scan_id, "LM358FAKE", Some("read from reel label"))
            .await
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::Counterfeit);
        assert!(outcome.was_manual_override);
        assert_eq!(outcome.confidence, 1.0);

        let scan = verifier.get_scan(&unknown.scan_id).await.unwrap();
        assert_eq!(scan.override_note.as_deref(), Some("read from reel label"));
    }

    #[tokio::test]
    async fn test_manual_override_to_uncatalogued_part_queues() {
        let (db, verifier) = setup().await;
        catalog(&db, "LM358", 8, "Texas Instruments", "SOIC-8").await;

        let failed = verifier.verify(input(Some("LM358"), 14, None)).await.unwrap();
        assert_eq!(failed.status, ScanStatus::Fail);

        let outcome = verifier
            .manual_override(&failed.scan_id, "LM324", None)
            .await
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::Unknown);
        assert!(outcome.queued_for_sync);
        assert!(db.sync_queue().get(&pn("LM324")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_scan_is_not_found() {
        let (_db, verifier) = setup().await;
        let id = Uuid::new_v4().to_string();
        assert!(verifier.get_scan(&id).await.unwrap_err().is_not_found());
        assert!(verifier
            .manual_override(&id, "LM358", None)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(verifier.get_scan("not-a-uuid").await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_list_scans_by_status() {
        let (db, verifier) = setup().await;
        catalog(&db, "LM358", 8, "Texas Instruments", "SOIC-8").await;
        verifier.verify(input(Some("LM358"), 8, None)).await.unwrap();
        verifier.verify(input(Some("LM358"), 6, None)).await.unwrap();
        verifier.verify(input(Some("XYZ"), 6, None)).await.unwrap();

        let failed = verifier
            .list_scans(
                &ScanFilter {
                    status: Some(ScanStatus::Fail),
                    ..Default::default()
                },
                Page::first(10),
            )
            .await
            .unwrap();
        assert_eq!(failed.total, 1);
        assert_eq!(failed.items[0].detected_pins, 6);
    }
}
