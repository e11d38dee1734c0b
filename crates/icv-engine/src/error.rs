//! # Engine Error Types
//!
//! What callers of the engines and the control surface see.
//!
//! ## Error Kinds
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Validation    │  │    NotFound     │  │       Conflict          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  bad pins,      │  │  unknown scan,  │  │  job already running    │ │
//! │  │  bad part no.,  │  │  unknown job,   │  │  bottom scan on a       │ │
//! │  │  bad page       │  │  unknown row    │  │  non-PARTIAL scan       │ │
//! │  │                 │  │                 │  │  double fake report     │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Persistence    │  │ Configuration   │  │       Internal          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  store write or │  │  bad TOML, bad  │  │  task join failure,     │ │
//! │  │  read failed    │  │  env override   │  │  shutdown               │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resolver failures are not here: they are per-item outcomes recorded on
//! the queue row and feed the escalation policy.

use serde::Serialize;
use thiserror::Error;

use icv_core::{CoreError, ValidationError};
use icv_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Coarse category callers can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Persistence,
    Configuration,
    Internal,
}

/// Engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Domain rule violation or bad input.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Store row missing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint hit on a store write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store read or write failed.
    #[error("Persistence failure: {0}")]
    Persistence(DbError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Core(CoreError::Validation(_)) => ErrorKind::Validation,
            EngineError::Core(e) if e.is_not_found() => ErrorKind::NotFound,
            EngineError::Core(e) if e.is_conflict() => ErrorKind::Conflict,
            EngineError::Core(_) => ErrorKind::Internal,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Persistence(_) => ErrorKind::Persistence,
            EngineError::InvalidConfig(_)
            | EngineError::ConfigLoadFailed(_)
            | EngineError::ConfigSaveFailed(_) => ErrorKind::Configuration,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

/// ## Error Mapping
/// ```text
/// DbError::NotFound         → EngineError::NotFound     (NotFound)
/// DbError::UniqueViolation  → EngineError::Conflict     (Conflict)
/// Other                     → EngineError::Persistence  (Persistence)
/// ```
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::UniqueViolation { .. } => EngineError::Conflict(err.to_string()),
            other => EngineError::Persistence(other),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::Internal(format!("task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let err: EngineError = ValidationError::Required {
            field: "part_number".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: EngineError = CoreError::ScanNotFound("abc".into()).into();
        assert!(err.is_not_found());

        let err: EngineError = CoreError::JobAlreadyRunning("job-1".into()).into();
        assert!(err.is_conflict());

        let err: EngineError = DbError::duplicate("part_number", "LM555").into();
        assert!(err.is_conflict());

        let err: EngineError = DbError::not_found("CatalogEntry", "LM555").into();
        assert!(err.is_not_found());

        let err: EngineError = DbError::QueryFailed("disk I/O error".into()).into();
        assert_eq!(err.kind(), ErrorKind::Persistence);

        assert_eq!(
            EngineError::InvalidConfig("x".into()).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_display_keeps_domain_message() {
        let err: EngineError = CoreError::InvalidScanStatus {
            scan_id: "s-1".into(),
            current_status: "PASS".into(),
            expected: "PARTIAL".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Scan s-1 is PASS, expected PARTIAL");
    }
}
