//! # Part Numbers
//!
//! The normalized part number is the join key across every store: catalog,
//! fake registry, sync queue, and scans all match on it exactly.
//!
//! ## Normalization
//! ```text
//! "  lm555cn\n"  ──trim──►  "lm555cn"  ──upper──►  "LM555CN"
//!
//! normalize(normalize(x)) == normalize(x)
//! ```
//!
//! Parsing additionally rejects values the OCR collaborator produces when it
//! has nothing to offer (the "none" sentinels), over-long strings, and
//! characters that never appear in a manufacturer's ordering code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::validation::ValidationResult;
use crate::MAX_PART_NUMBER_LEN;

/// Strings the OCR collaborator returns when no part number was read.
const NONE_SENTINELS: &[&str] = &["NONE", "N/A", "-"];

/// Punctuation allowed inside an ordering code besides ASCII alphanumerics.
const ALLOWED_PUNCTUATION: &[char] = &['-', '_', '/', '.', '+', '#'];

/// Trims and upper-cases a raw part number. Idempotent.
pub fn normalize_part_number(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// A normalized IC part number.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(try_from = "String", into = "String")]
#[ts(export)]
pub struct PartNumber(String);

impl PartNumber {
    /// Parses and normalizes a part number.
    ///
    /// ## Rules
    /// - Must not be empty after trimming
    /// - Must not be a "none" sentinel
    /// - At most 64 characters
    /// - ASCII letters, digits and `- _ / . + #` only
    ///
    /// ## Example
    /// ```rust
    /// use icv_core::PartNumber;
    ///
    /// assert_eq!(PartNumber::parse("ne555p").unwrap().as_str(), "NE555P");
    /// assert!(PartNumber::parse("   ").is_err());
    /// assert!(PartNumber::parse("LM 555").is_err());
    /// ```
    pub fn parse(raw: &str) -> ValidationResult<Self> {
        let normalized = normalize_part_number(raw);

        if normalized.is_empty() || NONE_SENTINELS.contains(&normalized.as_str()) {
            return Err(ValidationError::Required {
                field: "part_number".to_string(),
            });
        }

        if normalized.chars().count() > MAX_PART_NUMBER_LEN {
            return Err(ValidationError::TooLong {
                field: "part_number".to_string(),
                max: MAX_PART_NUMBER_LEN,
            });
        }

        if let Some(bad) = normalized
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !ALLOWED_PUNCTUATION.contains(c))
        {
            return Err(ValidationError::InvalidFormat {
                field: "part_number".to_string(),
                reason: format!("unexpected character '{}'", bad),
            });
        }

        Ok(PartNumber(normalized))
    }

    /// Parses an optional OCR candidate, treating anything unusable as absent.
    pub fn parse_candidate(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|r| Self::parse(r).ok())
    }

    /// Returns the normalized string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the part number, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PartNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PartNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PartNumber {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PartNumber> for String {
    fn from(pn: PartNumber) -> Self {
        pn.0
    }
}

impl AsRef<str> for PartNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PartNumber {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PartNumber {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_is_idempotent() {
        let once = normalize_part_number("  stm32f103c8t6 ");
        let twice = normalize_part_number(&once);
        assert_eq!(once, "STM32F103C8T6");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_accepts_ordering_codes() {
        assert_eq!(PartNumber::parse("lm555").unwrap(), "LM555");
        assert!(PartNumber::parse("SN74HC595N/NOPB").is_ok());
        assert!(PartNumber::parse("MAX232CPE+").is_ok());
        assert!(PartNumber::parse("AT28C256-15PU").is_ok());
        assert!(PartNumber::parse("LT1028#PBF").is_ok());
        // Only the listed sentinels mean "nothing read"
        assert_eq!(PartNumber::parse("na").unwrap(), "NA");
    }

    #[test]
    fn test_parse_rejects_unusable_candidates() {
        assert!(PartNumber::parse("").is_err());
        assert!(PartNumber::parse("none").is_err());
        assert!(PartNumber::parse("N/A").is_err());
        assert!(PartNumber::parse(" - ").is_err());
        assert!(PartNumber::parse("LM 555").is_err());
        assert!(PartNumber::parse("LM555,CN").is_err());
        assert!(PartNumber::parse(&"A".repeat(65)).is_err());
        assert!(PartNumber::parse_candidate(None).is_none());
        assert!(PartNumber::parse_candidate(Some("  ")).is_none());
    }

    #[test]
    fn test_total_order() {
        let mut parts = vec![
            PartNumber::parse("NE555").unwrap(),
            PartNumber::parse("lm555").unwrap(),
            PartNumber::parse("ATMEGA328P").unwrap(),
        ];
        parts.sort();
        let names: Vec<&str> = parts.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["ATMEGA328P", "LM555", "NE555"]);
    }

    #[test]
    fn test_serde_normalizes_on_deserialize() {
        let pn: PartNumber = serde_json::from_str("\" lm358n \"").unwrap();
        assert_eq!(pn.as_str(), "LM358N");
        assert_eq!(serde_json::to_string(&pn).unwrap(), "\"LM358N\"");
        assert!(serde_json::from_str::<PartNumber>("\"\"").is_err());
    }
}
