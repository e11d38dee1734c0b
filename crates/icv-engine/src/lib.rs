//! # icv-engine: Scan Verification and Datasheet Sync
//!
//! Runs the verification pipeline for incoming scans and drains the sync
//! queue against a datasheet resolver in the background.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           icv-engine                                    │
//! │                                                                         │
//! │   capture pipeline              operator / scheduler                    │
//! │         │                               │                               │
//! │         ▼                               ▼                               │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      ControlSurface                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │         │                               │                               │
//! │         ▼                               ▼                               │
//! │  ┌───────────────┐              ┌───────────────┐   ┌───────────────┐  │
//! │  │ ScanVerifier  │              │ SyncJobEngine │──►│ Datasheet     │  │
//! │  │               │  unknown PN  │               │   │ Resolver      │  │
//! │  │ verdict per   │─────────────►│ one job at a  │   │ (ProviderChain│  │
//! │  │ scan          │  sync queue  │ time          │   │  or custom)   │  │
//! │  └───────────────┘              └───────────────┘   └───────────────┘  │
//! │         │                               │                               │
//! │         └───────────────┬───────────────┘                               │
//! │                         ▼                                               │
//! │                      icv-db                                             │
//! │       catalog · fake registry · sync queue · jobs · scans               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`control`] - `ControlSurface`, the host-facing operations
//! - [`verifier`] - `ScanVerifier`
//! - [`sync`] - `SyncJobEngine`
//! - [`resolver`] - Resolver contract and `ProviderChain`
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Engine error types
//! - [`telemetry`] - Tracing subscriber setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use icv_engine::{ControlSurface, EngineConfig, ProviderChain};
//!
//! icv_engine::telemetry::init_tracing();
//! let config = EngineConfig::load(None)?;
//! let resolver = ProviderChain::new(config.sync.provider_timeout())
//!     .with_provider(Arc::new(MyDistributorApi::new()));
//!
//! let surface = ControlSurface::open(&config, Arc::new(resolver)).await?;
//! let outcome = surface.verify(scan_input).await?;
//! let job = surface.start_sync(Default::default()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod control;
pub mod error;
pub mod resolver;
pub mod sync;
pub mod telemetry;
pub mod verifier;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DatabaseSettings, EngineConfig, SyncSettings};
pub use control::{ApiError, ControlSurface};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use resolver::{
    DatasheetProvider, DatasheetResolver, ProviderChain, ResolveErrorKind, ResolveFailure,
};
pub use sync::SyncJobEngine;
pub use verifier::ScanVerifier;
