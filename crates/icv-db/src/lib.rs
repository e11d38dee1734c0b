//! # icv-db: Database Layer for IC Verification
//!
//! SQLite storage for the catalog, the fake registry, the sync queue, sync
//! jobs and scan records, accessed asynchronously through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     IC Verification Data Flow                           │
//! │                                                                         │
//! │  ControlSurface (verify, start_sync, report_fake, ...)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     icv-db (THIS CRATE)                         │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ Catalog        │   │ 001 catalog  │  │   │
//! │  │   │ SqlitePool    │◄───│ FakeRegistry   │   │ 002 queue    │  │   │
//! │  │   │ reconcile()   │    │ SyncQueue      │   │ 003 scans    │  │   │
//! │  │   │ stats()       │    │ SyncJob, Scan  │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   SQLite file (WAL) or a private in-memory database in tests    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per store
//! - [`reconcile`] - Crash repair run at startup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use icv_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/icv.db")).await?;
//!
//! let entry = db.catalog().get(&part_number).await?;
//! db.sync_queue().upsert_scan(&part_number).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod reconcile;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use reconcile::ReconcileReport;

// Repository re-exports for convenience
pub use repository::catalog::{CatalogFilter, CatalogRepository};
pub use repository::fake_registry::FakeRegistryRepository;
pub use repository::jobs::{NewSyncJob, SyncJobRepository};
pub use repository::queue::{FailureOutcome, PromoteOutcome, QueueFilter, SyncQueueRepository};
pub use repository::scans::{ScanFilter, ScanRepository};
