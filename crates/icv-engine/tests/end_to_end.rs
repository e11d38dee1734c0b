//! End-to-end behaviour of the control surface against an in-memory store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use icv_core::{
    FakeSource, IcVariant, PartNumber, QueueStatus, Resolution, ScanInput, ScanStatus,
    SyncJobStatus, SyncRequest,
};
use icv_db::{Database, DbConfig};
use icv_engine::{
    ControlSurface, DatasheetResolver, ErrorKind, ResolveFailure, SyncSettings,
};

// =============================================================================
// Scripted resolvers
// =============================================================================

/// Answers from a fixed table; unknown parts are NOT_FOUND.
struct TableResolver {
    table: HashMap<String, Resolution>,
}

impl TableResolver {
    fn new(entries: &[(&str, &[(&str, i64)])]) -> Self {
        let table = entries
            .iter()
            .map(|(queried, variants)| {
                let resolution = Resolution {
                    manufacturer: "Texas Instruments".into(),
                    variants: variants
                        .iter()
                        .map(|(pn, pins)| IcVariant {
                            part_number: pn.to_string(),
                            pin_count: Some(*pins),
                            package_type: Some(format!("PDIP-{}", pins)),
                            ..Default::default()
                        })
                        .collect(),
                    datasheet_url: Some(format!("https://www.ti.com/lit/ds/{}.pdf", queried)),
                    provider: "table".into(),
                };
                (queried.to_string(), resolution)
            })
            .collect();
        TableResolver { table }
    }
}

#[async_trait]
impl DatasheetResolver for TableResolver {
    async fn resolve(&self, part_number: &PartNumber) -> Result<Resolution, ResolveFailure> {
        self.table
            .get(part_number.as_str())
            .cloned()
            .ok_or_else(|| ResolveFailure::not_found("no datasheet found"))
    }
}

/// Blocks every call until the test releases a permit.
struct GatedResolver {
    arrivals: mpsc::UnboundedSender<String>,
    gate: Arc<Semaphore>,
}

#[async_trait]
impl DatasheetResolver for GatedResolver {
    async fn resolve(&self, part_number: &PartNumber) -> Result<Resolution, ResolveFailure> {
        let _ = self.arrivals.send(part_number.to_string());
        self.gate.acquire().await.unwrap().forget();
        Ok(Resolution {
            manufacturer: "Texas Instruments".into(),
            variants: vec![IcVariant {
                part_number: part_number.to_string(),
                pin_count: Some(8),
                ..Default::default()
            }],
            datasheet_url: None,
            provider: "gated".into(),
        })
    }
}

/// Never answers.
struct SilentResolver;

#[async_trait]
impl DatasheetResolver for SilentResolver {
    async fn resolve(&self, _: &PartNumber) -> Result<Resolution, ResolveFailure> {
        std::future::pending().await
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn surface_with(resolver: Arc<dyn DatasheetResolver>, settings: SyncSettings) -> ControlSurface {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    ControlSurface::with_database(db, resolver, settings)
}

fn gated() -> (Arc<GatedResolver>, mpsc::UnboundedReceiver<String>, Arc<Semaphore>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let gate = Arc::new(Semaphore::new(0));
    let resolver = Arc::new(GatedResolver {
        arrivals: tx,
        gate: gate.clone(),
    });
    (resolver, rx, gate)
}

fn scan(candidate: &str, pins: i64) -> ScanInput {
    ScanInput {
        ocr_text: Some(candidate.to_string()),
        ocr_confidence: Some(0.93),
        detected_pins: pins,
        manufacturer_detected: None,
        part_number_candidate: Some(candidate.to_string()),
    }
}

fn pn(s: &str) -> PartNumber {
    PartNumber::parse(s).unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_lm555_lifecycle() {
    let resolver = TableResolver::new(&[("LM555", &[("LM555CN", 8), ("LM555CM", 8)])]);
    let surface = surface_with(Arc::new(resolver), SyncSettings::default()).await;
    let db = surface.database().clone();

    let first = surface.verify(scan("LM555", 8)).await.unwrap();
    assert_eq!(first.status, ScanStatus::Unknown);
    assert!(first.queued_for_sync);
    let item = db.sync_queue().get(&pn("LM555")).await.unwrap().unwrap();
    assert_eq!(item.scan_count, 1);
    assert_eq!(db.sync_queue().count().await.unwrap(), 1);

    let second = surface.verify(scan("lm555", 8)).await.unwrap();
    assert_eq!(second.status, ScanStatus::Unknown);
    let item = db.sync_queue().get(&pn("LM555")).await.unwrap().unwrap();
    assert_eq!(item.scan_count, 2);

    let job = surface.start_sync(SyncRequest::default()).await.unwrap();
    let done = surface.wait_for_sync(&job.id).await.unwrap();
    assert_eq!(done.status, SyncJobStatus::Completed);
    assert_eq!(done.success_count, 1);

    let entry = surface.get_catalog_entry("LM555").await.unwrap();
    assert_eq!(entry.pin_count, Some(8));
    assert!(surface.get_catalog_entry("LM555CN").await.is_ok());
    assert_eq!(db.sync_queue().count().await.unwrap(), 0);

    let pass = surface.verify(scan("LM555", 8)).await.unwrap();
    assert_eq!(pass.status, ScanStatus::Pass);
    assert!(!pass.queued_for_sync);

    let fail = surface.verify(scan("LM555", 14)).await.unwrap();
    assert_eq!(fail.status, ScanStatus::Fail);
    assert_eq!(fail.match_details.unwrap().pin_count_match, Some(false));
}

#[tokio::test]
async fn test_escalation_after_three_failed_runs() {
    let surface = surface_with(Arc::new(TableResolver::new(&[])), SyncSettings::default()).await;
    let db = surface.database().clone();
    surface.verify(scan("XC7Z020FAKE", 400)).await.unwrap();

    let retry = SyncRequest {
        retry_failed: true,
        ..Default::default()
    };

    for attempt in 1..=2 {
        let job = surface.start_sync(retry.clone()).await.unwrap();
        let done = surface.wait_for_sync(&job.id).await.unwrap();
        assert_eq!(done.failed_count, 1);

        let item = db.sync_queue().get(&pn("XC7Z020FAKE")).await.unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(item.retry_count, attempt);
    }

    // FAILED rows are left alone unless a retry is requested
    let job = surface.start_sync(SyncRequest::default()).await.unwrap();
    assert_eq!(job.total_items, 0);
    surface.wait_for_sync(&job.id).await.unwrap();

    let job = surface.start_sync(retry).await.unwrap();
    let done = surface.wait_for_sync(&job.id).await.unwrap();
    assert_eq!(done.fake_count, 1);
    assert_eq!(done.failed_count, 0);

    assert!(db.sync_queue().get(&pn("XC7Z020FAKE")).await.unwrap().is_none());
    let fake = db.fake_registry().get(&pn("XC7Z020FAKE")).await.unwrap().unwrap();
    assert_eq!(fake.source, FakeSource::AutoEscalation);
    assert_eq!(fake.scrape_attempts, 3);

    let verdict = surface.verify(scan("XC7Z020FAKE", 400)).await.unwrap();
    assert_eq!(verdict.status, ScanStatus::Counterfeit);
    assert!(!verdict.queued_for_sync);
    assert_eq!(db.sync_queue().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_second_start_conflicts_while_running() {
    let (resolver, mut arrivals, gate) = gated();
    let surface = surface_with(resolver, SyncSettings::default()).await;
    surface.verify(scan("LM358", 8)).await.unwrap();

    let job = surface.start_sync(SyncRequest::default()).await.unwrap();
    assert_eq!(arrivals.recv().await.as_deref(), Some("LM358"));

    let err = surface.start_sync(SyncRequest::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(surface.stats().await.unwrap().sync_jobs, 1);

    let status = surface.get_sync_status().await.unwrap();
    assert!(status.is_running);
    assert_eq!(status.job.unwrap().current_item.as_deref(), Some("LM358"));

    gate.add_permits(1);
    let done = surface.wait_for_sync(&job.id).await.unwrap();
    assert_eq!(done.status, SyncJobStatus::Completed);
}

#[tokio::test]
async fn test_cancel_stops_at_item_boundary() {
    let (resolver, mut arrivals, gate) = gated();
    let surface = surface_with(resolver, SyncSettings::default()).await;
    let db = surface.database().clone();
    for part in ["LM358", "LM324", "LM393"] {
        surface.verify(scan(part, 8)).await.unwrap();
    }

    let job = surface.start_sync(SyncRequest::default()).await.unwrap();
    assert_eq!(job.total_items, 3);
    let first = arrivals.recv().await.unwrap();

    assert_eq!(surface.cancel_sync().await.unwrap().as_deref(), Some(job.id.as_str()));
    gate.add_permits(1);

    let done = surface.wait_for_sync(&job.id).await.unwrap();
    assert_eq!(done.status, SyncJobStatus::Cancelled);
    assert_eq!(done.processed_items, 1);
    assert!(done.processed_items <= done.total_items);
    assert!(done.message.unwrap().contains("cancelled after 1/3"));

    // The item in flight was fully applied; the rest are untouched
    assert!(surface.get_catalog_entry(&first).await.is_ok());
    assert!(db.sync_queue().get(&pn(&first)).await.unwrap().is_none());
    let pending = db
        .sync_queue()
        .snapshot(&SyncRequest::default())
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|i| i.status == QueueStatus::Pending));

    let history = surface.sync_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, job.id);
}

#[tokio::test]
async fn test_replace_cancels_running_job() {
    let (resolver, mut arrivals, gate) = gated();
    let surface = surface_with(resolver, SyncSettings::default()).await;
    surface.verify(scan("LM358", 8)).await.unwrap();
    surface.verify(scan("LM324", 14)).await.unwrap();

    let first = surface.start_sync(SyncRequest::default()).await.unwrap();
    arrivals.recv().await.unwrap();

    let replacing = {
        let surface = surface.clone();
        tokio::spawn(async move {
            surface
                .start_sync(SyncRequest {
                    replace: true,
                    ..Default::default()
                })
                .await
        })
    };
    gate.add_permits(10);

    let second = replacing.await.unwrap().unwrap();
    assert_ne!(second.id, first.id);

    let first = surface.get_sync_job(&first.id).await.unwrap();
    assert!(first.status.is_terminal());

    let second = surface.wait_for_sync(&second.id).await.unwrap();
    assert_eq!(second.status, SyncJobStatus::Completed);
    assert_eq!(surface.stats().await.unwrap().queue_pending, 0);
}

#[tokio::test]
async fn test_items_queued_mid_run_wait_for_next_run() {
    let (resolver, mut arrivals, gate) = gated();
    let surface = surface_with(resolver, SyncSettings::default()).await;
    let db = surface.database().clone();
    surface.verify(scan("LM358", 8)).await.unwrap();

    let job = surface.start_sync(SyncRequest::default()).await.unwrap();
    arrivals.recv().await.unwrap();
    surface.verify(scan("NE5532", 8)).await.unwrap();
    gate.add_permits(1);

    let done = surface.wait_for_sync(&job.id).await.unwrap();
    assert_eq!(done.total_items, 1);
    let late = db.sync_queue().get(&pn("NE5532")).await.unwrap().unwrap();
    assert_eq!(late.status, QueueStatus::Pending);
}

#[tokio::test]
async fn test_resolver_timeout_is_a_per_item_failure() {
    let settings = SyncSettings {
        resolve_timeout_secs: 1,
        ..Default::default()
    };
    let surface = surface_with(Arc::new(SilentResolver), settings).await;
    let db = surface.database().clone();
    surface.verify(scan("SLOW1", 8)).await.unwrap();

    let job = surface.start_sync(SyncRequest::default()).await.unwrap();
    let done = tokio::time::timeout(Duration::from_secs(10), surface.wait_for_sync(&job.id))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(done.status, SyncJobStatus::Completed);
    assert_eq!(done.failed_count, 1);
    let item = db.sync_queue().get(&pn("SLOW1")).await.unwrap().unwrap();
    assert!(item.error_message.unwrap().starts_with("TIMEOUT"));
}

#[tokio::test]
async fn test_counterfeit_short_circuit_ignores_matching_attributes() {
    let resolver = TableResolver::new(&[("LM358", &[("LM358", 8)])]);
    let surface = surface_with(Arc::new(resolver), SyncSettings::default()).await;

    let mut entry = icv_core::NewCatalogEntry::new(pn("LM358"), icv_core::SOURCE_MANUAL);
    entry.pin_count = Some(8);
    entry.manufacturer = Some("Texas Instruments".into());
    surface.upsert_catalog_entry(entry).await.unwrap();
    surface
        .report_fake("LM358", "batch 2231 remarked", Some("incoming-qa"))
        .await
        .unwrap();

    let mut input = scan("LM358", 8);
    input.manufacturer_detected = Some("Texas Instruments".into());
    let outcome = surface.verify(input).await.unwrap();

    assert_eq!(outcome.status, ScanStatus::Counterfeit);
    assert!(!outcome.queued_for_sync);
    assert_eq!(surface.stats().await.unwrap().queue_pending, 0);
}
