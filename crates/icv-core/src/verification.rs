//! # Verification Pipeline
//!
//! Deterministic decision rules for a single scan. The engine performs the
//! lookups and persistence; everything here is pure.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Ordered Verification Steps                          │
//! │                                                                         │
//! │  1. normalize candidate ── unusable ──────────► UNKNOWN (conf 0)       │
//! │          │                                       action MANUAL_ENTRY    │
//! │          ▼                                                              │
//! │  2. fake registry ──────── hit ───────────────► COUNTERFEIT             │
//! │          │                                       (never overridden)     │
//! │          ▼                                                              │
//! │  3. catalog ────────────── miss ──────────────► UNKNOWN + queue upsert  │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  4. bottom-terminated && pins == 0 ───────────► PARTIAL / SCAN_BOTTOM  │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  5. pin_count_match ∧ manufacturer_match ─────► PASS | FAIL            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::manufacturer::manufacturers_match;
use crate::part_number::PartNumber;
use crate::types::{ActionRequired, CatalogEntry, FakeRegistryEntry, MatchDetails, ScanStatus};

/// What the capture pipeline observed about the physical part.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    pub detected_pins: i64,
    pub manufacturer: Option<String>,
    /// Confidence carried onto the verdict (OCR confidence, or 1.0 for
    /// operator-entered part numbers).
    pub confidence: f64,
}

impl Observation {
    /// Detected manufacturer, ignoring blank strings.
    fn manufacturer(&self) -> Option<&str> {
        self.manufacturer
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

/// Result of running the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: ScanStatus,
    pub action: ActionRequired,
    pub confidence: f64,
    pub part_number: Option<PartNumber>,
    pub expected_pins: Option<i64>,
    pub match_details: Option<MatchDetails>,
    pub message: String,
    /// The engine must upsert `part_number` into the sync queue.
    pub queue_for_sync: bool,
}

impl Verdict {
    /// Returns true unless the verdict still waits for a bottom capture.
    pub fn is_final(&self) -> bool {
        self.status != ScanStatus::Partial
    }
}

/// Step 1 failure: no usable part number.
pub fn unreadable() -> Verdict {
    Verdict {
        status: ScanStatus::Unknown,
        action: ActionRequired::ManualEntry,
        confidence: 0.0,
        part_number: None,
        expected_pins: None,
        match_details: None,
        message: "Part number could not be read; enter it manually".to_string(),
        queue_for_sync: false,
    }
}

/// Runs steps 2–5 for a normalized part number.
///
/// ## Arguments
/// * `part_number` - Normalized candidate (step 1 already passed)
/// * `fake` - Fake registry row for the part, if any
/// * `catalog` - Catalog row for the part, if any
/// * `observation` - Pins / manufacturer / confidence from the capture
pub fn decide(
    part_number: &PartNumber,
    fake: Option<&FakeRegistryEntry>,
    catalog: Option<&CatalogEntry>,
    observation: &Observation,
) -> Verdict {
    if let Some(fake) = fake {
        return Verdict {
            status: ScanStatus::Counterfeit,
            action: ActionRequired::None,
            confidence: observation.confidence,
            part_number: Some(part_number.clone()),
            expected_pins: None,
            match_details: None,
            message: format!(
                "{} is registered as counterfeit: {}",
                part_number, fake.reason
            ),
            queue_for_sync: false,
        };
    }

    let Some(entry) = catalog else {
        return Verdict {
            status: ScanStatus::Unknown,
            action: ActionRequired::None,
            confidence: observation.confidence,
            part_number: Some(part_number.clone()),
            expected_pins: None,
            match_details: None,
            message: format!(
                "{} is not in the catalog; queued for datasheet sync",
                part_number
            ),
            queue_for_sync: true,
        };
    };

    if entry.is_bottom_terminated() && observation.detected_pins == 0 {
        return Verdict {
            status: ScanStatus::Partial,
            action: ActionRequired::ScanBottom,
            confidence: observation.confidence,
            part_number: Some(part_number.clone()),
            expected_pins: entry.pin_count,
            match_details: None,
            message: format!(
                "{} has a bottom-terminated package ({}); scan the underside to count pins",
                part_number,
                entry.package_type.as_deref().unwrap_or("unknown package")
            ),
            queue_for_sync: false,
        };
    }

    evaluate_match(part_number, entry, observation)
}

/// Step 5: compares the observation against a catalog entry.
///
/// PASS iff every evaluated check is true. A check is skipped when either
/// side lacks the value; if no check could be evaluated at all the verdict
/// is FAIL, since nothing was verified.
pub fn evaluate_match(
    part_number: &PartNumber,
    entry: &CatalogEntry,
    observation: &Observation,
) -> Verdict {
    let mut details = MatchDetails {
        expected_pins: entry.pin_count,
        detected_pins: observation.detected_pins,
        expected_manufacturer: entry.manufacturer.clone(),
        detected_manufacturer: observation.manufacturer().map(str::to_string),
        ..Default::default()
    };

    if let Some(expected) = entry.pin_count {
        let matched = expected == observation.detected_pins;
        details.pin_count_match = Some(matched);
        if !matched {
            details.failures.push(format!(
                "pin count mismatch: expected {}, detected {}",
                expected, observation.detected_pins
            ));
        }
    }

    if let (Some(expected), Some(detected)) =
        (entry.manufacturer.as_deref(), observation.manufacturer())
    {
        let matched = manufacturers_match(expected, detected);
        details.manufacturer_match = Some(matched);
        if !matched {
            details.failures.push(format!(
                "manufacturer mismatch: expected {}, detected {}",
                expected, detected
            ));
        }
    }

    if details.pin_count_match.is_none() && details.manufacturer_match.is_none() {
        details
            .failures
            .push("catalog entry has no verifiable attributes".to_string());
    }

    let passed = details.failures.is_empty();
    let message = if passed {
        format!("{} matches the catalog", part_number)
    } else {
        format!("{} failed verification: {}", part_number, details.failures.join("; "))
    };

    Verdict {
        status: if passed { ScanStatus::Pass } else { ScanStatus::Fail },
        action: ActionRequired::None,
        confidence: observation.confidence,
        part_number: Some(part_number.clone()),
        expected_pins: entry.pin_count,
        match_details: Some(details),
        message,
        queue_for_sync: false,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FakeSource;
    use chrono::Utc;

    fn pn(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    fn entry(part: &str, pins: Option<i64>, manufacturer: Option<&str>, package: &str) -> CatalogEntry {
        let now = Utc::now();
        CatalogEntry {
            part_number: pn(part),
            manufacturer: manufacturer.map(str::to_string),
            pin_count: pins,
            package_type: Some(package.to_string()),
            description: None,
            datasheet_url: None,
            source: "manual".into(),
            bottom_terminated: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn fake(part: &str) -> FakeRegistryEntry {
        FakeRegistryEntry {
            part_number: pn(part),
            reason: "remarked die".into(),
            source: FakeSource::Manual,
            reported_by: Some("qa".into()),
            added_at: Utc::now(),
            scrape_attempts: 0,
            manufacturers_checked: vec![],
        }
    }

    fn seen(pins: i64, manufacturer: Option<&str>) -> Observation {
        Observation {
            detected_pins: pins,
            manufacturer: manufacturer.map(str::to_string),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_unreadable_has_zero_confidence() {
        let v = unreadable();
        assert_eq!(v.status, ScanStatus::Unknown);
        assert_eq!(v.action, ActionRequired::ManualEntry);
        assert_eq!(v.confidence, 0.0);
        assert!(!v.queue_for_sync);
    }

    #[test]
    fn test_counterfeit_short_circuits_matching_part() {
        let part = pn("NE555P");
        let cat = entry("NE555P", Some(8), Some("TI"), "PDIP-8");
        let v = decide(&part, Some(&fake("NE555P")), Some(&cat), &seen(8, Some("TI")));

        assert_eq!(v.status, ScanStatus::Counterfeit);
        assert_eq!(v.action, ActionRequired::None);
        assert!(v.message.contains("remarked die"));
        assert!(!v.queue_for_sync);
    }

    #[test]
    fn test_catalog_miss_requests_queue() {
        let v = decide(&pn("LM555"), None, None, &seen(8, None));
        assert_eq!(v.status, ScanStatus::Unknown);
        assert!(v.queue_for_sync);
        assert_eq!(v.confidence, 0.9);
    }

    #[test]
    fn test_bottom_terminated_without_pins_is_partial() {
        let cat = entry("TPS62130", Some(16), Some("TI"), "VQFN-16");
        let v = decide(&pn("TPS62130"), None, Some(&cat), &seen(0, Some("TI")));
        assert_eq!(v.status, ScanStatus::Partial);
        assert_eq!(v.action, ActionRequired::ScanBottom);
        assert!(!v.is_final());

        // Once the underside is captured the normal checks apply
        let v = decide(&pn("TPS62130"), None, Some(&cat), &seen(16, Some("TI")));
        assert_eq!(v.status, ScanStatus::Pass);
    }

    #[test]
    fn test_pin_mismatch_fails_with_details() {
        let cat = entry("LM555", Some(8), None, "PDIP-8");
        let v = decide(&pn("LM555"), None, Some(&cat), &seen(14, None));

        assert_eq!(v.status, ScanStatus::Fail);
        let details = v.match_details.unwrap();
        assert_eq!(details.pin_count_match, Some(false));
        assert_eq!(details.manufacturer_match, None);
        assert_eq!(details.failures.len(), 1);
        assert!(details.failures[0].contains("expected 8, detected 14"));
    }

    #[test]
    fn test_manufacturer_alias_passes() {
        let cat = entry("LM358N", Some(8), Some("Texas Instruments"), "PDIP-8");
        let v = decide(&pn("LM358N"), None, Some(&cat), &seen(8, Some("National")));
        assert_eq!(v.status, ScanStatus::Pass);
        assert_eq!(v.match_details.unwrap().manufacturer_match, Some(true));
    }

    #[test]
    fn test_manufacturer_mismatch_fails() {
        let cat = entry("LM358N", Some(8), Some("Texas Instruments"), "PDIP-8");
        let v = decide(&pn("LM358N"), None, Some(&cat), &seen(8, Some("Microchip")));
        assert_eq!(v.status, ScanStatus::Fail);
        let details = v.match_details.unwrap();
        assert_eq!(details.pin_count_match, Some(true));
        assert_eq!(details.manufacturer_match, Some(false));
    }

    #[test]
    fn test_blank_manufacturer_is_not_evaluated() {
        let cat = entry("LM358N", Some(8), Some("Texas Instruments"), "PDIP-8");
        let v = decide(&pn("LM358N"), None, Some(&cat), &seen(8, Some("   ")));
        assert_eq!(v.status, ScanStatus::Pass);
        assert_eq!(v.match_details.unwrap().manufacturer_match, None);
    }

    #[test]
    fn test_nothing_to_verify_fails() {
        let cat = entry("MYSTERY1", None, None, "SOIC-8");
        let v = decide(&pn("MYSTERY1"), None, Some(&cat), &seen(8, Some("TI")));
        assert_eq!(v.status, ScanStatus::Fail);
    }
}
