//! # Domain Types
//!
//! Records shared by the stores and the engines.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  CatalogEntry   │   │FakeRegistryEntry│   │   QueueItem     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  part_number ◄──┼───┼─ part_number ◄──┼───┼─ part_number    │       │
//! │  │  manufacturer   │   │  reason         │   │  scan_count     │       │
//! │  │  pin_count      │   │  source         │   │  retry_count    │       │
//! │  │  package_type   │   │  reported_by    │   │  status         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │    SyncJob      │   │      Scan       │                             │
//! │  │  ─────────────  │   │  ─────────────  │                             │
//! │  │  id (UUID)      │   │  id (UUID)      │                             │
//! │  │  status         │   │  status         │                             │
//! │  │  counters, log  │   │  action_required│                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A part number lives in at most one of catalog / fake registry / queue at
//! a time once a sync run has touched it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::package::is_bottom_terminated_package;
use crate::part_number::PartNumber;
use crate::validation::validate_pin_count;

// =============================================================================
// Status Enums
// =============================================================================

/// Lifecycle of a sync queue row.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    /// Waiting for its first (or next) sync run.
    #[default]
    Pending,
    /// Being resolved by the active sync job.
    Processing,
    /// Last resolution attempt failed; eligible for a retry run.
    Failed,
}

impl QueueStatus {
    /// Lowercase name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Failed => "failed",
        }
    }
}

/// Lifecycle of a sync job. IDLE is the absence of a PROCESSING row.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncJobStatus {
    Processing,
    Completed,
    Cancelled,
    Error,
}

impl SyncJobStatus {
    /// Returns true for COMPLETED, CANCELLED and ERROR.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncJobStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobStatus::Processing => "processing",
            SyncJobStatus::Completed => "completed",
            SyncJobStatus::Cancelled => "cancelled",
            SyncJobStatus::Error => "error",
        }
    }
}

/// Verdict on a single scan.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    /// Every evaluated check matched the catalog.
    Pass,
    /// At least one evaluated check failed.
    Fail,
    /// Bottom-terminated package seen from the top; waiting for the underside.
    Partial,
    /// Part number unreadable or not yet in the catalog.
    Unknown,
    /// Part number is in the fake registry.
    Counterfeit,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pass => "pass",
            ScanStatus::Fail => "fail",
            ScanStatus::Partial => "partial",
            ScanStatus::Unknown => "unknown",
            ScanStatus::Counterfeit => "counterfeit",
        }
    }
}

/// What the operator has to do next.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionRequired {
    #[default]
    None,
    ScanBottom,
    ManualEntry,
}

/// How a part number got into the fake registry.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FakeSource {
    /// Reported by an operator.
    Manual,
    /// Escalated after repeated resolution failures.
    AutoEscalation,
}

// =============================================================================
// Catalog
// =============================================================================

/// Golden record for one genuine part number.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CatalogEntry {
    pub part_number: PartNumber,
    pub manufacturer: Option<String>,
    pub pin_count: Option<i64>,
    pub package_type: Option<String>,
    pub description: Option<String>,
    pub datasheet_url: Option<String>,

    /// Provenance: `datasheet_sync`, `manual`, or a provider name.
    pub source: String,

    /// Explicit bottom-terminated override. When `None`, the package family
    /// list decides.
    pub bottom_terminated: Option<bool>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Returns true when the pins cannot be counted from the top face.
    pub fn is_bottom_terminated(&self) -> bool {
        match self.bottom_terminated {
            Some(flag) => flag,
            None => self
                .package_type
                .as_deref()
                .map(is_bottom_terminated_package)
                .unwrap_or(false),
        }
    }
}

/// Input for a catalog upsert. `None` fields never overwrite stored values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCatalogEntry {
    pub part_number: PartNumber,
    pub manufacturer: Option<String>,
    pub pin_count: Option<i64>,
    pub package_type: Option<String>,
    pub description: Option<String>,
    pub datasheet_url: Option<String>,
    pub source: String,
    pub bottom_terminated: Option<bool>,
}

impl NewCatalogEntry {
    /// Creates an upsert for `part_number` with every optional field unset.
    pub fn new(part_number: PartNumber, source: impl Into<String>) -> Self {
        NewCatalogEntry {
            part_number,
            manufacturer: None,
            pin_count: None,
            package_type: None,
            description: None,
            datasheet_url: None,
            source: source.into(),
            bottom_terminated: None,
        }
    }
}

// =============================================================================
// Datasheet Resolution
// =============================================================================

/// One orderable variant extracted from a datasheet.
///
/// A single PDF usually covers a family (`LM555CN`, `LM555CM`, ...), so one
/// resolution yields many variants.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IcVariant {
    /// Raw ordering code as printed in the datasheet.
    pub part_number: String,
    pub manufacturer: Option<String>,
    pub pin_count: Option<i64>,
    pub package_type: Option<String>,
    pub description: Option<String>,
}

impl IcVariant {
    /// A missing pin count is fine; a present one must be in range.
    pub fn has_valid_pin_count(&self) -> bool {
        self.pin_count.map_or(true, |pins| validate_pin_count(pins).is_ok())
    }
}

/// Successful answer from a datasheet resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Resolution {
    pub manufacturer: String,
    pub variants: Vec<IcVariant>,
    pub datasheet_url: Option<String>,
    /// Name of the provider that answered.
    pub provider: String,
}

impl Resolution {
    /// Converts the variants into catalog upserts.
    ///
    /// Variants whose ordering code does not parse, or whose pin count is
    /// out of range, are dropped. When no variant carries the queried part
    /// number itself, an entry for it is derived from the first usable
    /// variant so the queue row always has a catalog counterpart.
    pub fn catalog_entries(&self, queried: &PartNumber, source: &str) -> Vec<NewCatalogEntry> {
        let usable: Vec<&IcVariant> = self
            .variants
            .iter()
            .filter(|v| v.has_valid_pin_count())
            .collect();
        let mut entries: Vec<NewCatalogEntry> = Vec::with_capacity(usable.len() + 1);

        for &variant in &usable {
            let Ok(part_number) = PartNumber::parse(&variant.part_number) else {
                continue;
            };
            if entries.iter().any(|e| e.part_number == part_number) {
                continue;
            }
            entries.push(self.entry_from_variant(part_number, variant, source));
        }

        let has_queried = entries.iter().any(|e| &e.part_number == queried);

        if !has_queried {
            if let Some(first) = usable.first() {
                entries.push(self.entry_from_variant(queried.clone(), first, source));
            }
        }

        entries
    }

    fn entry_from_variant(
        &self,
        part_number: PartNumber,
        variant: &IcVariant,
        source: &str,
    ) -> NewCatalogEntry {
        NewCatalogEntry {
            part_number,
            manufacturer: variant
                .manufacturer
                .clone()
                .or_else(|| Some(self.manufacturer.clone()).filter(|m| !m.is_empty())),
            pin_count: variant.pin_count,
            package_type: variant.package_type.clone(),
            description: variant.description.clone(),
            datasheet_url: self.datasheet_url.clone(),
            source: source.to_string(),
            bottom_terminated: None,
        }
    }
}

// =============================================================================
// Fake Registry
// =============================================================================

/// A part number declared counterfeit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FakeRegistryEntry {
    pub part_number: PartNumber,
    pub reason: String,
    pub source: FakeSource,
    pub reported_by: Option<String>,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
    /// Resolution attempts made before escalation (0 for manual reports).
    pub scrape_attempts: i64,
    /// Providers / manufacturers consulted before giving up.
    pub manufacturers_checked: Vec<String>,
}

/// Input for registering a fake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FakeReport {
    pub part_number: PartNumber,
    pub reason: String,
    pub source: FakeSource,
    pub reported_by: Option<String>,
    pub scrape_attempts: i64,
    pub manufacturers_checked: Vec<String>,
}

impl FakeReport {
    /// Builds the registry record for a part that exhausted its retries.
    pub fn escalation(
        part_number: PartNumber,
        attempts: i64,
        manufacturers_checked: Vec<String>,
    ) -> Self {
        FakeReport {
            part_number,
            reason: format!("unresolved after {} attempts", attempts),
            source: FakeSource::AutoEscalation,
            reported_by: None,
            scrape_attempts: attempts,
            manufacturers_checked,
        }
    }
}

// =============================================================================
// Sync Queue
// =============================================================================

/// An unresolved part number waiting for a sync run.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QueueItem {
    pub part_number: PartNumber,
    #[ts(as = "String")]
    pub first_seen_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub last_scanned_at: DateTime<Utc>,
    pub scan_count: i64,
    pub status: QueueStatus,
    /// Failed resolution attempts. Never reset by a re-scan.
    pub retry_count: i64,
    pub error_message: Option<String>,
    #[ts(as = "Option<String>")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Sync Job
// =============================================================================

/// Filters for starting a sync run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncRequest {
    /// Include FAILED rows in the snapshot.
    #[serde(default)]
    pub retry_failed: bool,
    /// Restrict the snapshot to these statuses (intersected with the
    /// PENDING / FAILED eligibility rule).
    #[serde(default)]
    pub statuses: Option<Vec<QueueStatus>>,
    /// Cap on snapshot size.
    #[serde(default)]
    pub limit: Option<i64>,
    /// Cancel a running job first instead of failing with a conflict.
    #[serde(default)]
    pub replace: bool,
}

impl SyncRequest {
    /// Statuses eligible for the snapshot, in a stable order.
    pub fn eligible_statuses(&self) -> Vec<QueueStatus> {
        let mut base = vec![QueueStatus::Pending];
        if self.retry_failed {
            base.push(QueueStatus::Failed);
        }
        match &self.statuses {
            Some(filter) => base.into_iter().filter(|s| filter.contains(s)).collect(),
            None => base,
        }
    }
}

/// One bounded run of the resolver over a queue snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncJob {
    pub id: String,
    pub status: SyncJobStatus,
    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Heartbeat, bumped on every progress write.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    pub total_items: i64,
    pub processed_items: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub fake_count: i64,
    pub current_item: Option<String>,
    pub message: Option<String>,
    pub log: Vec<String>,
    pub retry_failed: bool,
    pub item_limit: Option<i64>,
    pub cancel_requested: bool,
}

/// Read-only progress snapshot for `status()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncProgress {
    pub is_running: bool,
    pub job: Option<SyncJob>,
    /// processed / total, 0–100.
    pub percentage: f64,
    pub elapsed_secs: i64,
    pub estimated_remaining_secs: Option<i64>,
    #[ts(as = "Option<String>")]
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl SyncProgress {
    /// Snapshot when no job has ever run.
    pub fn idle() -> Self {
        SyncProgress {
            is_running: false,
            job: None,
            percentage: 0.0,
            elapsed_secs: 0,
            estimated_remaining_secs: None,
            estimated_completion: None,
        }
    }
}

impl SyncJob {
    /// Percentage of the snapshot processed so far.
    ///
    /// An empty snapshot reads as 100% once the job is terminal.
    pub fn percentage(&self) -> f64 {
        if self.total_items <= 0 {
            return if self.status.is_terminal() { 100.0 } else { 0.0 };
        }
        (self.processed_items as f64 / self.total_items as f64 * 100.0).min(100.0)
    }

    /// Builds a progress snapshot as of `now`.
    ///
    /// ## ETA
    /// ```text
    /// per_item  = elapsed / processed
    /// remaining = per_item × (total − processed)
    /// ```
    /// No estimate is given until at least one item has been processed.
    pub fn progress(&self, now: DateTime<Utc>) -> SyncProgress {
        let end = self.completed_at.unwrap_or(now);
        let elapsed = (end - self.started_at).max(Duration::zero());

        let (remaining, completion) = if self.status == SyncJobStatus::Processing
            && self.processed_items > 0
        {
            let left = (self.total_items - self.processed_items).max(0);
            let per_item_ms = elapsed.num_milliseconds() / self.processed_items;
            let remaining = Duration::milliseconds(per_item_ms * left);
            (Some(remaining.num_seconds()), Some(now + remaining))
        } else {
            (None, None)
        };

        SyncProgress {
            is_running: self.status == SyncJobStatus::Processing,
            job: Some(self.clone()),
            percentage: self.percentage(),
            elapsed_secs: elapsed.num_seconds(),
            estimated_remaining_secs: remaining,
            estimated_completion: completion,
        }
    }
}

// =============================================================================
// Scans
// =============================================================================

/// Per-check results of a PASS/FAIL decision.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MatchDetails {
    /// `None` when the check was not evaluated.
    pub pin_count_match: Option<bool>,
    pub manufacturer_match: Option<bool>,
    pub expected_pins: Option<i64>,
    pub detected_pins: i64,
    pub expected_manufacturer: Option<String>,
    pub detected_manufacturer: Option<String>,
    /// Human-readable reason for every failed check.
    pub failures: Vec<String>,
}

/// One inspection event as delivered by the capture pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ScanInput {
    pub ocr_text: Option<String>,
    pub ocr_confidence: Option<f64>,
    #[serde(default)]
    pub detected_pins: i64,
    pub manufacturer_detected: Option<String>,
    /// Raw part-number candidate, or a "none" sentinel.
    pub part_number_candidate: Option<String>,
}

/// A persisted scan and its current verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Scan {
    pub id: String,
    pub ocr_text: Option<String>,
    pub ocr_confidence: Option<f64>,
    /// Candidate as read, before normalization.
    pub part_number_detected: Option<String>,
    /// Normalized part number the verdict was computed for.
    pub part_number_verified: Option<PartNumber>,
    pub status: ScanStatus,
    pub action_required: ActionRequired,
    pub confidence: f64,
    pub detected_pins: i64,
    pub expected_pins: Option<i64>,
    pub manufacturer_detected: Option<String>,
    pub match_details: Option<MatchDetails>,
    pub message: String,
    pub queued_for_sync: bool,
    pub was_manual_override: bool,
    pub override_note: Option<String>,
    #[ts(as = "String")]
    pub scanned_at: DateTime<Utc>,
    /// Set once the verdict is final. PARTIAL scans leave it empty.
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result handed back to the caller of every verification operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VerificationOutcome {
    pub scan_id: String,
    pub status: ScanStatus,
    pub action_required: ActionRequired,
    pub confidence: f64,
    pub part_number: Option<PartNumber>,
    pub detected_pins: i64,
    pub expected_pins: Option<i64>,
    pub match_details: Option<MatchDetails>,
    pub message: String,
    pub queued_for_sync: bool,
    pub was_manual_override: bool,
}

impl From<&Scan> for VerificationOutcome {
    fn from(scan: &Scan) -> Self {
        VerificationOutcome {
            scan_id: scan.id.clone(),
            status: scan.status,
            action_required: scan.action_required,
            confidence: scan.confidence,
            part_number: scan.part_number_verified.clone(),
            detected_pins: scan.detected_pins,
            expected_pins: scan.expected_pins,
            match_details: scan.match_details.clone(),
            message: scan.message.clone(),
            queued_for_sync: scan.queued_for_sync,
            was_manual_override: scan.was_manual_override,
        }
    }
}

// =============================================================================
// Listing
// =============================================================================

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Page { limit, offset }
    }

    /// First page of `limit` rows.
    pub fn first(limit: i64) -> Self {
        Page { limit, offset: 0 }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::first(50)
    }
}

/// One page of results plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Row counts across the stores.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StoreStats {
    pub catalog_entries: i64,
    pub fake_entries: i64,
    pub queue_pending: i64,
    pub queue_processing: i64,
    pub queue_failed: i64,
    pub scans: i64,
    pub sync_jobs: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
