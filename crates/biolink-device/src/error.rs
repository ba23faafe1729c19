//! # Device Error Types
//!
//! Errors for device connectivity operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Device Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Admission     │  │   Transport     │  │     Per-Device          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  LimitExceeded  │  │  ConnectFailed  │  │  DeviceNotFound         │ │
//! │  │  ScanInProgress │  │  LinkClosed     │  │  NoActiveConnection     │ │
//! │  │                 │  │  Handshake      │  │  CommandTimeout         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Admission errors reject synchronously at the call site. Per-device    │
//! │  errors are folded into that device's CommandResult; they never abort  │
//! │  a batch.                                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::transport::TransportKind;

/// Result type alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Device connectivity errors.
#[derive(Debug, Error)]
pub enum DeviceError {
    // =========================================================================
    // Admission Errors
    // =========================================================================
    /// The radio transport's hard session ceiling is reached.
    ///
    /// The ceiling reflects real radio-stack limits; callers wanting more
    /// simultaneous devices should move some to a local-network transport.
    #[error(
        "Radio connection limit reached ({limit} active sessions); \
         connect additional devices over a local-network transport"
    )]
    ConnectionLimitExceeded { limit: usize },

    /// A scan is already running on this transport.
    #[error("A scan is already in progress on the {transport} transport")]
    ScanInProgress { transport: TransportKind },

    /// No driver registered for the requested transport.
    #[error("No driver registered for the {transport} transport")]
    TransportUnavailable { transport: TransportKind },

    // =========================================================================
    // Per-Device Errors (folded into CommandResult, never thrown from a batch)
    // =========================================================================
    /// Device id is not in the registry.
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    /// Device is known but has no active transport session.
    #[error("No active connection to device {device_id}")]
    NoActiveConnection { device_id: String },

    /// Device did not respond within the command timeout.
    #[error("Command timed out after {timeout_secs}s for device {device_id}")]
    CommandTimeout {
        device_id: String,
        timeout_secs: u64,
    },

    /// Device replied with an error envelope.
    #[error("Device {device_id} reported an error: {message}")]
    DeviceReported { device_id: String, message: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Session establishment failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The underlying session was lost mid-operation.
    #[error("Transport session closed")]
    LinkClosed,

    /// The post-connect info exchange failed.
    #[error("Device info handshake failed: {0}")]
    HandshakeFailed(String),

    /// A wire envelope could not be parsed.
    #[error("Invalid wire message: {0}")]
    InvalidMessage(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Envelope (de)serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal channel failure.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Domain invariant violation from biolink-core.
    #[error(transparent)]
    Core(#[from] biolink_core::CoreError),
}

impl DeviceError {
    /// Returns true for admission-control rejections: the caller must back
    /// off or pick another transport, retrying as-is cannot succeed.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            DeviceError::ConnectionLimitExceeded { .. }
                | DeviceError::ScanInProgress { .. }
                | DeviceError::TransportUnavailable { .. }
        )
    }

    /// Returns true when the failure is transient and a later retry may
    /// succeed. Commands are not auto-retried by this layer; this guides
    /// callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeviceError::CommandTimeout { .. }
                | DeviceError::ConnectionFailed(_)
                | DeviceError::LinkClosed
        )
    }
}
