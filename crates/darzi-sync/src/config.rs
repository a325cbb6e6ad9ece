//! # Sync Configuration
//!
//! Configuration management for the offline engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     DARZI_REMOTE_URL=https://api.darzi.pk                              │
//! │     DARZI_DB_PATH=/data/darzi.db                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/darzi/darzi.toml (Linux)                                 │
//! │     ~/Library/Application Support/pk.darzi.darzi/darzi.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     5 attempts, 30s auto-sync, 5m cache TTL                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # darzi.toml
//! [sync]
//! max_attempts = 5
//! auto_sync_enabled = true
//! auto_sync_interval_secs = 30
//! initial_backoff_secs = 30
//! max_backoff_secs = 600
//!
//! [cache]
//! list_ttl_secs = 300
//! record_ttl_secs = 300
//!
//! [remote]
//! base_url = "http://localhost:8000/api"
//! timeout_secs = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sync Settings
// =============================================================================

/// Queue drain and scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Replay attempts before an action is surfaced as permanently failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// Whether to drain the queue automatically in the background.
    #[serde(default = "default_true")]
    pub auto_sync_enabled: bool,

    /// Interval between automatic drain passes (seconds).
    #[serde(default = "default_auto_sync_interval")]
    pub auto_sync_interval_secs: u64,

    /// Backoff after the first failed pass (seconds). Doubles per
    /// consecutive failure, resets on a clean pass.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    /// Backoff ceiling (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Poll the backend for reachability every N seconds.
    /// Unset when the embedding platform pushes connectivity signals
    /// through `ConnectivityMonitor::set_online` instead.
    #[serde(default)]
    pub connectivity_probe_secs: Option<u64>,
}

fn default_max_attempts() -> i64 {
    darzi_core::DEFAULT_MAX_ATTEMPTS
}
fn default_true() -> bool {
    true
}
fn default_auto_sync_interval() -> u64 {
    30
}
fn default_initial_backoff() -> u64 {
    30
}
fn default_max_backoff() -> u64 {
    600
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            max_attempts: default_max_attempts(),
            auto_sync_enabled: true,
            auto_sync_interval_secs: default_auto_sync_interval(),
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            connectivity_probe_secs: None,
        }
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// TTL settings for cached reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// TTL for cached list responses (seconds).
    #[serde(default = "default_list_ttl")]
    pub list_ttl_secs: u64,

    /// TTL for cached detail records (seconds).
    #[serde(default = "default_record_ttl")]
    pub record_ttl_secs: u64,
}

fn default_list_ttl() -> u64 {
    300
}
fn default_record_ttl() -> u64 {
    300
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            list_ttl_secs: default_list_ttl(),
            record_ttl_secs: default_record_ttl(),
        }
    }
}

impl CacheSettings {
    /// TTL for list entries as a Duration.
    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs)
    }

    /// TTL for record entries as a Duration.
    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }
}

// =============================================================================
// Remote Settings
// =============================================================================

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the billing API (no trailing slash).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}
fn default_remote_timeout() -> u64 {
    10
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: default_base_url(),
            timeout_secs: default_remote_timeout(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Local storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Path to the SQLite database file.
    /// Defaults to the platform data directory when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete configuration for the offline engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Queue drain and scheduling settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Cache TTL settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Remote API settings.
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Local storage settings.
    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (darzi.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.max_attempts <= 0 {
            return Err(SyncError::InvalidConfig(
                "max_attempts must be greater than 0".into(),
            ));
        }

        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            return Err(SyncError::InvalidConfig(format!(
                "remote base_url must start with http:// or https://, got: {}",
                self.remote.base_url
            )));
        }

        if self.sync.initial_backoff_secs > self.sync.max_backoff_secs {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_secs must not exceed max_backoff_secs".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DARZI_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.base_url = url;
        }

        if let Ok(path) = std::env::var("DARZI_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Ok(attempts) = std::env::var("DARZI_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<i64>() {
                self.sync.max_attempts = n;
            }
        }

        if let Ok(enabled) = std::env::var("DARZI_AUTO_SYNC") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "on" => self.sync.auto_sync_enabled = true,
                "0" | "false" | "off" => self.sync.auto_sync_enabled = false,
                other => warn!(value = %other, "Unknown DARZI_AUTO_SYNC value"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("pk", "darzi", "darzi")
            .map(|dirs| dirs.config_dir().join("darzi.toml"))
    }

    /// Returns the database path, falling back to the platform data dir.
    pub fn database_path(&self) -> SyncResult<PathBuf> {
        if let Some(ref path) = self.storage.database_path {
            return Ok(path.clone());
        }

        directories::ProjectDirs::from("pk", "darzi", "darzi")
            .map(|dirs| dirs.data_dir().join("darzi.db"))
            .ok_or_else(|| SyncError::InvalidConfig("No data directory available".into()))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Interval between automatic drain passes.
    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.auto_sync_interval_secs)
    }

    /// Per-request remote timeout.
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }
}
