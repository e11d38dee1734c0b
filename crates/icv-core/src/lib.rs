//! # icv-core: Pure Verification Logic for IC Inspection
//!
//! This crate holds the decision rules for IC scan verification as pure
//! functions with zero I/O dependencies. Storage lives in `icv-db`,
//! orchestration (sync jobs, scan engine) lives in `icv-engine`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     IC Verification Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    icv-engine (orchestration)                   │   │
//! │  │    ScanVerifier ──► SyncJobEngine ──► DatasheetResolver        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ icv-core (THIS CRATE) ★                         │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │part_number│  │  verify   │  │manufacturer│ │   │
//! │  │   │  Scan     │  │ normalize │  │  decide() │  │  aliases  │  │   │
//! │  │   │  SyncJob  │  │ parse     │  │  Verdict  │  │  package  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    icv-db (Database Layer)                      │   │
//! │  │     catalog, fake_registry, sync_queue, sync_jobs, scans        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (CatalogEntry, QueueItem, SyncJob, Scan, ...)
//! - [`part_number`] - The normalized join key used by every store
//! - [`manufacturer`] - Closed alias table of manufacturer renames
//! - [`package`] - Bottom-terminated package families
//! - [`verification`] - The ordered verification pipeline
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use icv_core::PartNumber;
//!
//! let pn = PartNumber::parse("  lm555cn ").unwrap();
//! assert_eq!(pn.as_str(), "LM555CN");
//!
//! // "none" from the OCR collaborator means no candidate at all
//! assert!(PartNumber::parse_candidate(Some("NONE")).is_none());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod manufacturer;
pub mod package;
pub mod part_number;
pub mod types;
pub mod validation;
pub mod verification;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use part_number::PartNumber;
pub use types::*;
pub use verification::{decide, evaluate_match, Observation, Verdict};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number of failed resolution attempts after which a queued part number is
/// escalated to the fake registry.
///
/// Engines read the threshold from configuration; this is the default.
pub const DEFAULT_RETRY_THRESHOLD: i64 = 3;

/// Maximum length of a normalized part number.
pub const MAX_PART_NUMBER_LEN: usize = 64;

/// Upper bound on a pin count reported by the vision collaborator.
pub const MAX_DETECTED_PINS: i64 = 2048;

/// Maximum length of raw OCR text stored with a scan.
pub const MAX_OCR_TEXT_LEN: usize = 4096;

/// Maximum number of log lines retained on a sync job row.
pub const DEFAULT_JOB_LOG_CAPACITY: usize = 500;

/// Provenance recorded on catalog rows created by a sync run.
pub const SOURCE_DATASHEET_SYNC: &str = "datasheet_sync";

/// Provenance recorded on catalog rows created by hand.
pub const SOURCE_MANUAL: &str = "manual";
