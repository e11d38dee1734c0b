//! # Package Families
//!
//! Some packages hide their terminals underneath the body. A top-down
//! capture of a QFN shows zero pins even when the part is genuine, so the
//! verifier asks for a second capture of the underside instead of failing.
//!
//! ```text
//!   Leaded (SOIC, DIP, QFP)          Bottom-terminated (QFN, BGA, ...)
//!   ┌──────────────┐                 ┌──────────────┐
//!  ─┤              ├─                │              │
//!  ─┤   visible    ├─                │  no visible  │
//!  ─┤    pins      ├─                │    pins      │
//!   └──────────────┘                 └──────────────┘
//! ```

/// Package family markers whose terminals sit under the body.
///
/// Matched as substrings of the upper-cased package name, so `VQFN-16`,
/// `WQFN` and `TQFN` all hit `QFN`.
pub const BOTTOM_TERMINATED_FAMILIES: &[&str] = &[
    "QFN", "DFN", "BGA", "LGA", "WLCSP", "CSP", "SON", "MLF", "MLP", "LLP", "PQFN",
];

/// Returns true when the package type names a bottom-terminated family.
///
/// ## Example
/// ```rust
/// use icv_core::package::is_bottom_terminated_package;
///
/// assert!(is_bottom_terminated_package("VQFN-16"));
/// assert!(!is_bottom_terminated_package("SOIC-8"));
/// ```
pub fn is_bottom_terminated_package(package_type: &str) -> bool {
    let upper = package_type.to_uppercase();
    BOTTOM_TERMINATED_FAMILIES
        .iter()
        .any(|family| upper.contains(family))
}
