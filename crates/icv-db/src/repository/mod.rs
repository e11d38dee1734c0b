//! # Repository Module
//!
//! Store implementations for the verification system.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stores and Their Writers                             │
//! │                                                                         │
//! │  ScanVerifier ──────┬──► ScanRepository        (insert / follow-ups)   │
//! │                     └──► SyncQueueRepository   (upsert_scan)           │
//! │                                                                         │
//! │  SyncJobEngine ─────┬──► SyncJobRepository     (progress, finish)      │
//! │                     ├──► SyncQueueRepository   (mark / promote / fail) │
//! │                     ├──► CatalogRepository     (via promote)           │
//! │                     └──► FakeRegistryRepository(via escalation)        │
//! │                                                                         │
//! │  Each repository has pool-level methods plus `*_in(conn, ..)`          │
//! │  functions that run on a caller's transaction.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Golden records
//! - [`FakeRegistryRepository`](fake_registry::FakeRegistryRepository) - Counterfeit part numbers
//! - [`SyncQueueRepository`](queue::SyncQueueRepository) - Unresolved backlog and its transitions
//! - [`SyncJobRepository`](jobs::SyncJobRepository) - Sync run bookkeeping
//! - [`ScanRepository`](scans::ScanRepository) - Scan records

pub mod catalog;
pub mod fake_registry;
pub mod jobs;
pub mod queue;
pub mod scans;

/// Turns a free-text search into a `LIKE` pattern on normalized part numbers.
pub(crate) fn part_number_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.replace('%', "").replace('_', "\\_")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_number_pattern() {
        assert_eq!(part_number_pattern(Some(" lm5 ")).as_deref(), Some("%LM5%"));
        assert_eq!(part_number_pattern(Some("  ")), None);
        assert_eq!(part_number_pattern(None), None);
    }
}
