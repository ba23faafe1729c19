//! # Sync Error Types
//!
//! Errors for sync engine operations.
//!
//! Per-item delivery outcomes are NOT errors - they are classified into
//! [`PushOutcome`](crate::client::PushOutcome) values and recorded on the
//! item. The error type here covers admission rejections, store failures,
//! and configuration problems.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync engine errors.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Admission Errors
    // =========================================================================
    /// The durable queue is at its configured ceiling.
    ///
    /// Protects against unbounded growth during extended offline periods;
    /// the caller must back off or shed load.
    #[error("Sync queue is full ({max} items)")]
    QueueFull { max: u64 },

    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// Resolution targeted an item that does not exist.
    #[error("Sync item not found: {id}")]
    ItemNotFound { id: String },

    /// Resolution targeted an item that is not in conflict.
    #[error("Sync item {id} is not in conflict (status: {status})")]
    NotConflicted { id: String, status: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration (programmer/deployment error, fails startup).
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Passthrough Errors
    // =========================================================================
    /// Durable store failure.
    #[error(transparent)]
    Store(#[from] biolink_store::StoreError),

    /// Domain invariant violation.
    #[error(transparent)]
    Core(#[from] biolink_core::CoreError),

    /// Payload (de)serialization failure.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal channel failure.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::QueueFull { max: 10_000 };
        assert!(err.to_string().contains("10000"));

        let err = SyncError::NotConflicted {
            id: "item-1".into(),
            status: "pending".into(),
        };
        assert!(err.to_string().contains("item-1"));
        assert!(err.to_string().contains("pending"));
    }
}
