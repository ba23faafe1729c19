//! # Domain Error Types
//!
//! Errors for invariant violations in the pure domain layer. Anything that
//! touches I/O has its own error type in the owning crate (`StoreError`,
//! `DeviceError`, `SyncError`); conversions into those live at the crate
//! boundaries.

use thiserror::Error;

/// Result type alias for domain operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Domain-level errors.
///
/// These represent violated invariants on the data itself, independent of
/// any transport or storage backend.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A device identifier failed validation.
    #[error("Invalid device id: {0}")]
    InvalidDeviceId(String),

    /// A command request has no target devices.
    #[error("Command request has no target devices")]
    EmptyTargets,

    /// A sync payload exceeds the configured maximum size.
    #[error("Payload too large: {actual} bytes (max {max})")]
    PayloadTooLarge { actual: usize, max: usize },

    /// A conflict resolution is malformed.
    ///
    /// The one structural rule: `merged_payload` is required if and only if
    /// the strategy is `Merge`.
    #[error("Invalid conflict resolution: {0}")]
    InvalidResolution(String),

    /// A persisted enum tag could not be parsed back into its type.
    #[error("Unknown {field} value: '{value}'")]
    UnknownVariant { field: &'static str, value: String },
}
