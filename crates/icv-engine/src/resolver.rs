//! # Datasheet Resolver
//!
//! Contract between the sync engine and whatever finds and parses vendor
//! datasheets, plus a provider chain that tries several sources in order.
//!
//! ## Provider Chain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ProviderChain::resolve(LM555)                      │
//! │                                                                         │
//! │   provider 1 ──► NOT_FOUND ─┐                                           │
//! │                             ▼                                           │
//! │   provider 2 ──► TIMEOUT ───┐   (each call bounded by provider_timeout) │
//! │                             ▼                                           │
//! │   provider 3 ──► Resolution { variants: [LM555CN, LM555CM] } ──► Ok     │
//! │                                                                         │
//! │   All providers failed?                                                 │
//! │   └─► Err(ResolveFailure { kind: most severe seen,                      │
//! │                            providers_checked: [1, 2, 3] })              │
//! │                                                                         │
//! │   Severity: ERROR > TIMEOUT > NOT_FOUND                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use icv_core::{PartNumber, Resolution};

// =============================================================================
// Failure
// =============================================================================

/// Why a resolution attempt failed. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolveErrorKind {
    /// No provider knows the part.
    NotFound,
    /// A provider did not answer in time.
    Timeout,
    /// A provider failed (network, parse, panic).
    Error,
}

impl fmt::Display for ResolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveErrorKind::NotFound => write!(f, "NOT_FOUND"),
            ResolveErrorKind::Timeout => write!(f, "TIMEOUT"),
            ResolveErrorKind::Error => write!(f, "ERROR"),
        }
    }
}

/// A failed resolution attempt. Recorded on the queue row; never fatal to a
/// sync run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ResolveFailure {
    pub kind: ResolveErrorKind,
    pub message: String,
    /// Sources consulted before giving up.
    pub providers_checked: Vec<String>,
}

impl ResolveFailure {
    pub fn new(kind: ResolveErrorKind, message: impl Into<String>) -> Self {
        ResolveFailure {
            kind,
            message: message.into(),
            providers_checked: Vec::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ResolveErrorKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ResolveErrorKind::Timeout, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResolveErrorKind::Error, message)
    }
}

// =============================================================================
// Contracts
// =============================================================================

/// Resolves a part number to catalog data.
///
/// Implementations must be safe to call from the sync engine's background
/// task; the engine bounds every call with its own timeout.
#[async_trait]
pub trait DatasheetResolver: Send + Sync {
    async fn resolve(&self, part_number: &PartNumber) -> Result<Resolution, ResolveFailure>;
}

/// One datasheet source (a distributor API, a vendor site, a local archive).
#[async_trait]
pub trait DatasheetProvider: Send + Sync {
    /// Name recorded in `providers_checked` and on catalog provenance.
    fn name(&self) -> &str;

    async fn lookup(&self, part_number: &PartNumber) -> Result<Resolution, ResolveFailure>;
}

// =============================================================================
// Provider Chain
// =============================================================================

/// Tries providers in order; first success wins.
#[derive(Clone)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn DatasheetProvider>>,
    provider_timeout: Duration,
}

impl fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("ProviderChain")
            .field("providers", &names)
            .field("provider_timeout", &self.provider_timeout)
            .finish()
    }
}

impl ProviderChain {
    /// Creates an empty chain with a per-provider timeout.
    pub fn new(provider_timeout: Duration) -> Self {
        ProviderChain {
            providers: Vec::new(),
            provider_timeout,
        }
    }

    /// Appends a provider.
    pub fn with_provider(mut self, provider: Arc<dyn DatasheetProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl DatasheetResolver for ProviderChain {
    async fn resolve(&self, part_number: &PartNumber) -> Result<Resolution, ResolveFailure> {
        if self.providers.is_empty() {
            return Err(ResolveFailure::error("no datasheet providers configured"));
        }

        let mut checked = Vec::with_capacity(self.providers.len());
        let mut worst = ResolveErrorKind::NotFound;
        let mut messages = Vec::new();

        for provider in &self.providers {
            let name = provider.name().to_string();
            checked.push(name.clone());

            let outcome =
                match tokio::time::timeout(self.provider_timeout, provider.lookup(part_number))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ResolveFailure::timeout(format!(
                        "no answer within {}s",
                        self.provider_timeout.as_secs()
                    ))),
                };

            match outcome {
                Ok(resolution) if resolution.variants.is_empty() => {
                    debug!(provider = %name, part_number = %part_number, "Provider returned no variants");
                    messages.push(format!("{}: no variants", name));
                }
                Ok(mut resolution) => {
                    if resolution.provider.is_empty() {
                        resolution.provider = name;
                    }
                    debug!(
                        provider = %resolution.provider,
                        part_number = %part_number,
                        variants = resolution.variants.len(),
                        "Datasheet resolved"
                    );
                    return Ok(resolution);
                }
                Err(failure) => {
                    if failure.kind != ResolveErrorKind::NotFound {
                        warn!(provider = %name, part_number = %part_number, error = %failure, "Provider failed");
                    }
                    worst = worst.max(failure.kind);
                    messages.push(format!("{}: {}", name, failure.message));
                }
            }
        }

        Err(ResolveFailure {
            kind: worst,
            message: messages.join("; "),
            providers_checked: checked,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use icv_core::IcVariant;

    enum Script {
        Found(i64),
        Empty,
        Fail(ResolveErrorKind),
        Hang,
    }

    struct ScriptedProvider {
        name: &'static str,
        script: Script,
    }

    #[async_trait]
    impl DatasheetProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn lookup(&self, part_number: &PartNumber) -> Result<Resolution, ResolveFailure> {
            match self.script {
                Script::Found(pins) => Ok(Resolution {
                    manufacturer: "Texas Instruments".into(),
                    variants: vec![IcVariant {
                        part_number: part_number.to_string(),
                        pin_count: Some(pins),
                        ..Default::default()
                    }],
                    datasheet_url: None,
                    provider: String::new(),
                }),
                Script::Empty => Ok(Resolution {
                    manufacturer: String::new(),
                    variants: vec![],
                    datasheet_url: None,
                    provider: String::new(),
                }),
                Script::Fail(kind) => Err(ResolveFailure::new(kind, "scripted")),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ResolveFailure::error("unreachable"))
                }
            }
        }
    }

    fn provider(name: &'static str, script: Script) -> Arc<dyn DatasheetProvider> {
        Arc::new(ScriptedProvider { name, script })
    }

    fn pn(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_falls_through_to_first_success() {
        let chain = ProviderChain::new(Duration::from_secs(5))
            .with_provider(provider("octopart", Script::Fail(ResolveErrorKind::NotFound)))
            .with_provider(provider("ti.com", Script::Found(8)))
            .with_provider(provider("never-called", Script::Fail(ResolveErrorKind::Error)));

        let resolution = chain.resolve(&pn("LM555")).await.unwrap();
        assert_eq!(resolution.provider, "ti.com");
        assert_eq!(resolution.variants[0].pin_count, Some(8));
    }

    #[tokio::test]
    async fn test_zero_variants_is_not_found() {
        let chain = ProviderChain::new(Duration::from_secs(5))
            .with_provider(provider("octopart", Script::Empty));

        let failure = chain.resolve(&pn("LM555")).await.unwrap_err();
        assert_eq!(failure.kind, ResolveErrorKind::NotFound);
        assert_eq!(failure.providers_checked, vec!["octopart"]);
    }

    #[tokio::test]
    async fn test_most_severe_kind_wins() {
        let chain = ProviderChain::new(Duration::from_secs(5))
            .with_provider(provider("a", Script::Fail(ResolveErrorKind::Error)))
            .with_provider(provider("b", Script::Fail(ResolveErrorKind::NotFound)));

        let failure = chain.resolve(&pn("XYZ")).await.unwrap_err();
        assert_eq!(failure.kind, ResolveErrorKind::Error);
        assert_eq!(failure.providers_checked, vec!["a", "b"]);
        assert!(failure.message.contains("a: scripted"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_provider_times_out() {
        let chain = ProviderChain::new(Duration::from_secs(2))
            .with_provider(provider("slow", Script::Hang))
            .with_provider(provider("missing", Script::Fail(ResolveErrorKind::NotFound)));

        let failure = chain.resolve(&pn("LM555")).await.unwrap_err();
        assert_eq!(failure.kind, ResolveErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_empty_chain_is_an_error() {
        let chain = ProviderChain::new(Duration::from_secs(1));
        assert!(chain.is_empty());
        let failure = chain.resolve(&pn("LM555")).await.unwrap_err();
        assert_eq!(failure.kind, ResolveErrorKind::Error);
    }

    #[test]
    fn test_severity_order() {
        assert!(ResolveErrorKind::Error > ResolveErrorKind::Timeout);
        assert!(ResolveErrorKind::Timeout > ResolveErrorKind::NotFound);
        assert_eq!(
            ResolveFailure::timeout("no answer").to_string(),
            "TIMEOUT: no answer"
        );
    }
}
