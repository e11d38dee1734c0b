//! # Engine Configuration
//!
//! Configuration management for the verification and sync engines.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ICV_DB_PATH=/var/lib/icv/icv.db                                    │
//! │     ICV_RETRY_THRESHOLD=3                                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/verifier/engine.toml (Linux)                             │
//! │     ~/Library/Application Support/com.icv.verifier/engine.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     retry_threshold = 3, provider timeout 15 s                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # engine.toml
//! [database]
//! path = "/var/lib/icv/icv.db"
//! max_connections = 5
//!
//! [sync]
//! retry_threshold = 3
//! provider_timeout_secs = 15
//! resolve_timeout_secs = 60
//! replace_wait_secs = 30
//! stale_job_secs = 900
//! log_capacity = 500
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use icv_core::{DEFAULT_JOB_LOG_CAPACITY, DEFAULT_RETRY_THRESHOLD};
use icv_db::DbConfig;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Database Settings
// =============================================================================

/// Where the stores live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path. `:memory:` gives a private in-memory database.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "icv", "verifier")
        .map(|dirs| dirs.data_dir().join("icv.db"))
        .unwrap_or_else(|| PathBuf::from("icv.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    /// Builds the pool configuration.
    pub fn db_config(&self) -> DbConfig {
        if self.path.as_os_str() == ":memory:" {
            return DbConfig::in_memory();
        }
        DbConfig::new(&self.path).max_connections(self.max_connections)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync job behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Failed resolution attempts before a part is escalated to the fake
    /// registry.
    #[serde(default = "default_retry_threshold")]
    pub retry_threshold: i64,

    /// Bound on a single provider call inside the provider chain (seconds).
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Bound on one whole `resolve()` call made by the sync engine (seconds).
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_secs: u64,

    /// How long a replacing `start()` waits for the running job to stop
    /// (seconds).
    #[serde(default = "default_replace_wait")]
    pub replace_wait_secs: u64,

    /// A PROCESSING job without progress for this long is considered
    /// abandoned at startup (seconds).
    #[serde(default = "default_stale_job")]
    pub stale_job_secs: u64,

    /// Log lines kept on a job row; oldest lines are dropped first.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Snapshot cap applied when a start request gives none.
    #[serde(default)]
    pub default_limit: Option<i64>,
}

fn default_retry_threshold() -> i64 {
    DEFAULT_RETRY_THRESHOLD
}
fn default_provider_timeout() -> u64 {
    15
}
fn default_resolve_timeout() -> u64 {
    60
}
fn default_replace_wait() -> u64 {
    30
}
fn default_stale_job() -> u64 {
    900
}
fn default_log_capacity() -> usize {
    DEFAULT_JOB_LOG_CAPACITY
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            retry_threshold: default_retry_threshold(),
            provider_timeout_secs: default_provider_timeout(),
            resolve_timeout_secs: default_resolve_timeout(),
            replace_wait_secs: default_replace_wait(),
            stale_job_secs: default_stale_job(),
            log_capacity: default_log_capacity(),
            default_limit: None,
        }
    }
}

impl SyncSettings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn replace_wait(&self) -> Duration {
        Duration::from_secs(self.replace_wait_secs)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_job_secs as i64)
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.sync.retry_threshold < 1 {
            return Err(EngineError::InvalidConfig(
                "retry_threshold must be at least 1".into(),
            ));
        }

        if self.sync.provider_timeout_secs == 0 || self.sync.resolve_timeout_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "resolver timeouts must be greater than 0".into(),
            ));
        }

        if self.sync.log_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "log_capacity must be greater than 0".into(),
            ));
        }

        if matches!(self.sync.default_limit, Some(n) if n < 1) {
            return Err(EngineError::InvalidConfig(
                "default_limit must be at least 1".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) -> EngineResult<()> {
        if let Ok(path) = std::env::var("ICV_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(n) = env_number("ICV_RETRY_THRESHOLD")? {
            self.sync.retry_threshold = n;
        }

        if let Some(n) = env_number("ICV_PROVIDER_TIMEOUT_SECS")? {
            self.sync.provider_timeout_secs = n;
        }

        if let Some(n) = env_number("ICV_RESOLVE_TIMEOUT_SECS")? {
            self.sync.resolve_timeout_secs = n;
        }

        if let Some(n) = env_number("ICV_LOG_CAPACITY")? {
            self.sync.log_capacity = n;
        }

        Ok(())
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "icv", "verifier")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }
}

/// Reads a numeric environment override; a present but unparsable value is
/// a configuration error rather than silently ignored.
fn env_number<T: std::str::FromStr>(name: &str) -> EngineResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            EngineError::InvalidConfig(format!("{} must be a number, got '{}'", name, raw))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.sync.retry_threshold, 3);
        assert_eq!(config.sync.log_capacity, DEFAULT_JOB_LOG_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.sync.retry_threshold = 0;
        assert!(config.validate().is_err());

        config.sync.retry_threshold = 5;
        config.sync.provider_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.sync.provider_timeout_secs = 10;
        config.sync.default_limit = Some(0);
        assert!(config.validate().is_err());

        config.sync.default_limit = Some(25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [sync]
            retry_threshold = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.retry_threshold, 5);
        assert_eq!(config.sync.provider_timeout_secs, 15);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_memory_path_maps_to_in_memory_pool() {
        let settings = DatabaseSettings {
            path: PathBuf::from(":memory:"),
            max_connections: 5,
        };
        assert!(settings.db_config().is_in_memory());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[sync]"));
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.sync.retry_threshold, config.sync.retry_threshold);
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!("icv-engine-{}.toml", uuid::Uuid::new_v4()));
        let mut config = EngineConfig::default();
        config.sync.retry_threshold = 4;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: EngineConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.sync.retry_threshold, 4);

        let _ = std::fs::remove_file(&path);
    }
}
