//! # Validation Module
//!
//! Input validation for scan events and administrative requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Transport (out of scope)                                     │
//! │  └── Deserialization, request shape                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engine entry points                                          │
//! │  └── THIS MODULE: ranges, lengths, formats                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── UNIQUE(part_number) per store                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A ValidationError is raised before any store is touched.

use crate::error::ValidationError;
use crate::types::{Page, ScanInput};
use crate::{MAX_DETECTED_PINS, MAX_OCR_TEXT_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Largest page a list operation will return.
pub const MAX_PAGE_SIZE: i64 = 500;

// =============================================================================
// Scan Input
// =============================================================================

/// Validates a pin count from the vision collaborator.
pub fn validate_detected_pins(pins: i64) -> ValidationResult<()> {
    if !(0..=MAX_DETECTED_PINS).contains(&pins) {
        return Err(ValidationError::OutOfRange {
            field: "detected_pins".to_string(),
            min: 0,
            max: MAX_DETECTED_PINS,
        });
    }
    Ok(())
}

/// Validates an OCR confidence score (0.0 – 1.0).
pub fn validate_confidence(confidence: f64) -> ValidationResult<()> {
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(ValidationError::OutOfRange {
            field: "ocr_confidence".to_string(),
            min: 0,
            max: 1,
        });
    }
    Ok(())
}

/// Validates raw OCR text length.
pub fn validate_ocr_text(text: &str) -> ValidationResult<()> {
    if text.chars().count() > MAX_OCR_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field: "ocr_text".to_string(),
            max: MAX_OCR_TEXT_LEN,
        });
    }
    Ok(())
}

/// Validates a full scan event.
///
/// The part-number candidate is deliberately *not* validated here: an
/// unusable candidate is a legitimate UNKNOWN verdict, not a bad request.
pub fn validate_scan_input(input: &ScanInput) -> ValidationResult<()> {
    validate_detected_pins(input.detected_pins)?;

    if let Some(confidence) = input.ocr_confidence {
        validate_confidence(confidence)?;
    }

    if let Some(text) = &input.ocr_text {
        validate_ocr_text(text)?;
    }

    if let Some(manufacturer) = &input.manufacturer_detected {
        validate_short_text("manufacturer_detected", manufacturer, 200)?;
    }

    Ok(())
}

// =============================================================================
// Administrative Input
// =============================================================================

/// Validates a fake-registry reason.
///
/// ## Example
/// ```rust
/// use icv_core::validation::validate_reason;
///
/// assert!(validate_reason("remarked die, wrong logo").is_ok());
/// assert!(validate_reason("  ").is_err());
/// ```
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }
    validate_short_text("reason", reason, 500)
}

/// Validates an operator note attached to a manual override.
pub fn validate_note(note: &str) -> ValidationResult<()> {
    validate_short_text("note", note, 1000)
}

fn validate_short_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

/// Validates a non-negative pin count on a catalog entry.
pub fn validate_pin_count(pins: i64) -> ValidationResult<()> {
    if !(1..=MAX_DETECTED_PINS).contains(&pins) {
        return Err(ValidationError::OutOfRange {
            field: "pin_count".to_string(),
            min: 1,
            max: MAX_DETECTED_PINS,
        });
    }
    Ok(())
}

/// Validates pagination parameters.
pub fn validate_page(page: &Page) -> ValidationResult<()> {
    if !(1..=MAX_PAGE_SIZE).contains(&page.limit) {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: MAX_PAGE_SIZE,
        });
    }
    if page.offset < 0 {
        return Err(ValidationError::OutOfRange {
            field: "offset".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a sync snapshot cap.
pub fn validate_sync_limit(limit: Option<i64>) -> ValidationResult<()> {
    match limit {
        Some(n) if n < 1 => Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: i64::MAX,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// ID Validators
// =============================================================================

/// Validates a UUID string.
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_detected_pins() {
        assert!(validate_detected_pins(0).is_ok());
        assert!(validate_detected_pins(8).is_ok());
        assert!(validate_detected_pins(-1).is_err());
        assert!(validate_detected_pins(5000).is_err());
    }

    #[test]
    fn test_validate_confidence() {
        assert!(validate_confidence(0.0).is_ok());
        assert!(validate_confidence(0.93).is_ok());
        assert!(validate_confidence(1.2).is_err());
        assert!(validate_confidence(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_scan_input_ignores_bad_candidate() {
        let input = ScanInput {
            part_number_candidate: Some("???".into()),
            detected_pins: 8,
            ..Default::default()
        };
        assert!(validate_scan_input(&input).is_ok());

        let input = ScanInput {
            detected_pins: -4,
            ..Default::default()
        };
        assert!(validate_scan_input(&input).is_err());
    }

    #[test]
    fn test_validate_page() {
        assert!(validate_page(&Page::first(50)).is_ok());
        assert!(validate_page(&Page::first(0)).is_err());
        assert!(validate_page(&Page::new(10, -1)).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("not-a-uuid").is_err());
    }
}
