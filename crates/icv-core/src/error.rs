//! # Error Types
//!
//! Domain-specific error types for icv-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  icv-core errors (this file)                                           │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  icv-db errors (separate crate)                                        │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  icv-engine errors                                                     │
//! │  └── EngineError      - What callers see, tagged with an ErrorKind     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain rule violations.
///
/// Each variant is an *expected* outcome the caller can act on; genuine
/// faults (I/O, corruption) never appear here.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Scan id is unknown.
    #[error("Scan not found: {0}")]
    ScanNotFound(String),

    /// Sync job id is unknown.
    #[error("Sync job not found: {0}")]
    JobNotFound(String),

    /// Scan is not in a state that allows the requested follow-up.
    ///
    /// ## When This Occurs
    /// - Bottom scan submitted for a scan that is not PARTIAL
    ///
    /// ## User Workflow
    /// ```text
    /// verify(LM555, pins=8)  ──► PASS
    ///      │
    ///      ▼
    /// submit_bottom_scan(scan_id, 8)
    ///      │
    ///      ▼
    /// InvalidScanStatus { scan_id, current_status: "pass" }
    /// ```
    #[error("Scan {scan_id} is {current_status}, expected {expected}")]
    InvalidScanStatus {
        scan_id: String,
        current_status: String,
        expected: String,
    },

    /// A PARTIAL scan lost its catalog entry before the bottom capture arrived.
    #[error("Catalog entry for {0} no longer exists")]
    CatalogEntryMissing(String),

    /// Part number is already in the fake registry.
    #[error("Part number {0} is already registered as counterfeit")]
    AlreadyReported(String),

    /// Part number is not in the fake registry.
    #[error("Part number {0} is not in the fake registry")]
    NotInRegistry(String),

    /// A sync job is already running.
    #[error("Sync job {0} is already processing")]
    JobAlreadyRunning(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns true when the error reports a state conflict rather than bad
    /// input or a missing record.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidScanStatus { .. }
                | CoreError::CatalogEntryMissing(_)
                | CoreError::AlreadyReported(_)
                | CoreError::JobAlreadyRunning(_)
        )
    }

    /// Returns true when the error reports an unknown identifier.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::ScanNotFound(_) | CoreError::JobNotFound(_) | CoreError::NotInRegistry(_)
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any store is touched, so a validation failure never has
/// side effects.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, illegal characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidScanStatus {
            scan_id: "abc".to_string(),
            current_status: "pass".to_string(),
            expected: "partial".to_string(),
        };
        assert_eq!(err.to_string(), "Scan abc is pass, expected partial");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "part_number".to_string(),
        };
        assert_eq!(err.to_string(), "part_number is required");

        let err = ValidationError::OutOfRange {
            field: "detected_pins".to_string(),
            min: 0,
            max: 2048,
        };
        assert_eq!(err.to_string(), "detected_pins must be between 0 and 2048");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "reason".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }

    #[test]
    fn test_categorization() {
        assert!(CoreError::AlreadyReported("NE555".into()).is_conflict());
        assert!(CoreError::ScanNotFound("x".into()).is_not_found());
        assert!(!CoreError::ScanNotFound("x".into()).is_conflict());
    }
}
