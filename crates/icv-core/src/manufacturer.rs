//! # Manufacturer Aliases
//!
//! Semiconductor vendors merge and rename constantly; the logo printed on a
//! 2009 date code may belong to a company that has since been acquired. This
//! module folds known renames onto one canonical name so that a detected
//! "National" logo still matches a catalog entry from Texas Instruments.
//!
//! The table is closed. Names it does not know are compared by their
//! normalized spelling only.

/// Canonical manufacturer name → known aliases (already lowercase, no
/// punctuation, corporate suffixes stripped).
const ALIASES: &[(&str, &[&str])] = &[
    (
        "texas instruments",
        &["ti", "texas instruments", "national", "national semiconductor", "burr brown", "burrbrown", "unitrode"],
    ),
    (
        "analog devices",
        &["adi", "analog devices", "linear", "linear technology", "ltc", "maxim", "maxim integrated", "hittite"],
    ),
    (
        "microchip",
        &["microchip", "atmel", "micrel", "microsemi", "sst", "silicon storage"],
    ),
    ("infineon", &["infineon", "cypress", "international rectifier", "ir"]),
    ("nxp", &["nxp", "freescale", "philips", "motorola"]),
    ("onsemi", &["onsemi", "on", "on semi", "on semiconductor", "fairchild"]),
    ("stmicroelectronics", &["st", "stm", "stmicro", "stmicroelectronics", "sgs thomson"]),
    ("renesas", &["renesas", "intersil", "idt", "integrated device", "dialog"]),
    ("broadcom", &["broadcom", "avago", "lsi", "agilent"]),
    ("nexperia", &["nexperia"]),
    ("diodes", &["diodes", "zetex", "pericom"]),
    ("vishay", &["vishay", "siliconix"]),
    ("rohm", &["rohm", "lapis"]),
    ("toshiba", &["toshiba"]),
    ("nordic", &["nordic", "nordic semiconductor"]),
    ("espressif", &["espressif"]),
];

/// Words that carry no identity in a manufacturer name.
const NOISE_WORDS: &[&str] = &[
    "inc", "incorporated", "corp", "corporation", "co", "company", "ltd", "limited", "llc",
    "gmbh", "ag", "sa", "nv", "bv", "plc", "semiconductor", "semiconductors", "technology",
    "technologies", "the",
];

/// Lowercases, drops punctuation, and strips corporate suffixes.
fn normalize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();

    let words: Vec<&str> = cleaned.split_whitespace().collect();

    // Keep a lone noise word ("ON Semiconductor" → "on", but "Semiconductor" alone stays).
    let kept: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !NOISE_WORDS.contains(w))
        .collect();

    if kept.is_empty() {
        words.join(" ")
    } else {
        kept.join(" ")
    }
}

/// Returns the canonical name for a manufacturer, or its normalized spelling
/// when the alias table does not know it.
///
/// ## Example
/// ```rust
/// use icv_core::manufacturer::canonical_manufacturer;
///
/// assert_eq!(canonical_manufacturer("Burr-Brown Corp."), "texas instruments");
/// assert_eq!(canonical_manufacturer("Acme Chips Inc"), "acme chips");
/// ```
pub fn canonical_manufacturer(name: &str) -> String {
    let normalized = normalize(name);
    let compact: String = normalized.chars().filter(|c| !c.is_whitespace()).collect();

    for (canonical, aliases) in ALIASES {
        let hit = aliases.iter().any(|alias| {
            *alias == normalized || alias.replace(' ', "") == compact
        });
        if hit {
            return (*canonical).to_string();
        }
    }

    normalized
}

/// Returns true when both names refer to the same manufacturer.
///
/// Empty names never match.
pub fn manufacturers_match(expected: &str, detected: &str) -> bool {
    let expected = canonical_manufacturer(expected);
    let detected = canonical_manufacturer(detected);
    !expected.is_empty() && expected == detected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquired_brands_fold_to_parent() {
        assert!(manufacturers_match("Texas Instruments", "National Semiconductor"));
        assert!(manufacturers_match("Analog Devices Inc.", "Linear Technology"));
        assert!(manufacturers_match("Microchip Technology", "ATMEL"));
        assert!(manufacturers_match("onsemi", "Fairchild Semiconductor"));
        assert!(manufacturers_match("NXP", "Freescale"));
        assert!(manufacturers_match("STMicroelectronics", "ST"));
    }

    #[test]
    fn test_distinct_vendors_do_not_match() {
        assert!(!manufacturers_match("Texas Instruments", "Analog Devices"));
        assert!(!manufacturers_match("Microchip", "Infineon"));
        assert!(!manufacturers_match("", ""));
    }

    #[test]
    fn test_unknown_vendors_compare_by_spelling() {
        assert!(manufacturers_match("Acme Chips, Inc.", "ACME CHIPS"));
        assert!(!manufacturers_match("Acme Chips", "Acme Silicon"));
    }

    #[test]
    fn test_suffix_only_name_is_kept() {
        assert_eq!(normalize("Semiconductor"), "semiconductor");
        assert_eq!(normalize("ON Semiconductor"), "on");
    }
}
