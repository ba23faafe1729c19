//! # Sync Configuration
//!
//! Configuration for the sync engine and remote client.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BIOLINK_REMOTE_URL=https://ingest.example.com/api/v1               │
//! │     BIOLINK_AUTH_TOKEN=...                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/biolink/sync.toml (Linux)                                │
//! │     ~/Library/Application Support/com.biolink.core/sync.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [remote]
//! base_url = "https://ingest.example.com/api/v1"
//! auth_token = "secret"
//! request_timeout_secs = 15
//!
//! [engine]
//! max_queue_items = 10000
//! batch_size = 25
//! max_attempts = 5
//! sync_interval_secs = 30
//! grace_secs = 60
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Remote Settings
// =============================================================================

/// Remote ingestion endpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the remote system; kind-specific paths are appended
    /// (`/measurements`, `/calibrations`, ...). Required for syncing.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    15
}

impl RemoteSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Engine Settings
// =============================================================================

/// Sync engine behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Queue ceiling; enqueue rejects with QueueFull beyond it.
    #[serde(default = "default_max_queue_items")]
    pub max_queue_items: u64,

    /// Items per batch within a sync pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Attempt ceiling; items reaching it stay failed for operator action.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Interval between timer-driven sync passes (seconds).
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Grace window before a synced item is deleted (seconds), allowing
    /// late duplicate-suppression checks.
    #[serde(default = "default_grace")]
    pub grace_secs: u64,
}

fn default_max_queue_items() -> u64 {
    10_000
}
fn default_batch_size() -> u32 {
    25
}
fn default_max_attempts() -> u32 {
    5
}
fn default_sync_interval() -> u64 {
    30
}
fn default_grace() -> u64 {
    60
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            max_queue_items: default_max_queue_items(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            sync_interval_secs: default_sync_interval(),
            grace_secs: default_grace(),
        }
    }
}

impl EngineSettings {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote endpoint settings.
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Engine behavior settings.
    #[serde(default)]
    pub engine: EngineSettings,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
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

    /// Loads config or returns defaults if loading fails.
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

    /// Validates the configuration. Called at startup; configuration
    /// problems are the one class of error allowed to abort there.
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(ref base_url) = self.remote.base_url {
            url::Url::parse(base_url).map_err(|e| {
                SyncError::InvalidConfig(format!("invalid remote base_url '{base_url}': {e}"))
            })?;
        }

        if self.engine.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }
        if self.engine.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "max_attempts must be greater than 0".into(),
            ));
        }
        if self.engine.max_queue_items == 0 {
            return Err(SyncError::InvalidConfig(
                "max_queue_items must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("BIOLINK_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.base_url = Some(url);
        }

        if let Ok(token) = std::env::var("BIOLINK_AUTH_TOKEN") {
            self.remote.auth_token = Some(token);
        }

        if let Ok(interval) = std::env::var("BIOLINK_SYNC_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse() {
                self.engine.sync_interval_secs = secs;
            }
        }

        if let Ok(max) = std::env::var("BIOLINK_MAX_QUEUE_ITEMS") {
            if let Ok(n) = max.parse() {
                self.engine.max_queue_items = n;
            }
        }

        if let Ok(max) = std::env::var("BIOLINK_MAX_ATTEMPTS") {
            if let Ok(n) = max.parse() {
                self.engine.max_attempts = n;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "biolink", "core")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.engine.max_queue_items, 10_000);
        assert_eq!(config.engine.max_attempts, 5);
        assert_eq!(config.engine.sync_interval_secs, 30);
        assert_eq!(config.engine.grace_secs, 60);
        assert!(config.remote.base_url.is_none());
    }

    #[test]
    fn test_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        config.remote.base_url = Some("https://ingest.example.com/api/v1".into());
        assert!(config.validate().is_ok());

        config.remote.base_url = Some("not a url".into());
        assert!(config.validate().is_err());

        config.remote.base_url = None;
        config.engine.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = SyncConfig::default();
        config.remote.base_url = Some("https://ingest.example.com".into());

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[remote]"));
        assert!(toml_str.contains("[engine]"));

        let parsed: SyncConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.remote.base_url, config.remote.base_url);
        assert_eq!(parsed.engine.batch_size, config.engine.batch_size);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: SyncConfig = toml::from_str(
            r#"
            [remote]
            base_url = "https://ingest.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.engine.max_attempts, 5);
        assert_eq!(parsed.remote.request_timeout_secs, 15);
    }
}
