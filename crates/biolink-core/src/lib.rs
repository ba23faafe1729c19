//! # biolink-core: Pure Domain Types for BioLink
//!
//! This crate is the **foundation** of BioLink. It defines the domain model
//! shared by every other layer, with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        BioLink Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────┐  ┌─────────────────────────────────┐  │
//! │  │       biolink-device        │  │         biolink-sync            │  │
//! │  │  Registry • Coordinator     │  │  Engine • Conflicts • Remote    │  │
//! │  │  Dispatcher • Monitor       │  │  client                         │  │
//! │  └──────────────┬──────────────┘  └───────────────┬─────────────────┘  │
//! │                 │                                 │                     │
//! │                 │          ┌──────────────────────┤                     │
//! │                 │          │   biolink-store      │                     │
//! │                 │          │   SQLite sync queue  │                     │
//! │                 │          └──────────┬───────────┘                     │
//! │                 │                     │                                 │
//! │  ┌──────────────▼─────────────────────▼──────────────────────────────┐ │
//! │  │                ★ biolink-core (THIS CRATE) ★                      │ │
//! │  │                                                                   │ │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐     │ │
//! │  │   │  device   │  │  command  │  │   sync    │  │ validation│     │ │
//! │  │   │DeviceRecord│ │CommandKind│  │ SyncItem  │  │   rules   │     │ │
//! │  │   │DeviceGroup│  │CommandReq │  │ Conflict  │  │  checks   │     │ │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘     │ │
//! │  │                                                                   │ │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS             │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`device`] - Device records, groups, statuses, network mode
//! - [`command`] - Typed command kinds, requests, and results
//! - [`sync`] - Sync items, statuses, priorities, conflict resolutions
//! - [`error`] - Domain error types
//! - [`validation`] - Invariant checks shared by the upper layers
//!
//! ## Design Principles
//!
//! 1. **Plain Data**: types carry state and invariant checks; the owning
//!    layers drive all transitions
//! 2. **No I/O**: Database, network, and transport access are FORBIDDEN here
//! 3. **Typed Commands**: Command parameters are a tagged union, not loose
//!    maps, so malformed commands fail at compile time
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod command;
pub mod device;
pub mod error;
pub mod sync;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use biolink_core::DeviceRecord` instead of
// `use biolink_core::device::DeviceRecord`

pub use command::{
    CalibrationParams, CommandKind, CommandPriority, CommandRequest, CommandResult, ConfigParams,
    FirmwareParams, MeasurementMode, MeasurementParams,
};
pub use device::{
    ConnectionType, DeviceCapability, DeviceCounts, DeviceGroup, DeviceRecord, DeviceStatus,
    DiscoveredDevice, NetworkMode,
};
pub use error::{CoreError, CoreResult};
pub use sync::{
    ConflictResolution, ConflictStrategy, SyncItem, SyncItemKind, SyncPriority, SyncReport,
    SyncStatus,
};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum size of a sync item payload in bytes.
///
/// Continuous-mode measurement batches are chunked by producers well below
/// this; the limit exists so a single runaway payload cannot dominate the
/// durable queue or a sync batch.
pub const MAX_SYNC_PAYLOAD_BYTES: usize = 256 * 1024;

/// Maximum accepted length of a device identifier.
pub const MAX_DEVICE_ID_LEN: usize = 128;
