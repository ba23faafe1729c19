//! # Transport Layer
//!
//! The seam between this crate and the physical transport stacks.
//!
//! ## Driver Seam
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Transport Abstraction                              │
//! │                                                                         │
//! │  ConnectionCoordinator                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  TransportDriver (trait)        DeviceLink (trait)              │   │
//! │  │  • kind()                       • request(req, timeout)         │   │
//! │  │  • scan(timeout)                • closed()  ← resolves on loss  │   │
//! │  │  • connect(id, address)         • close()                       │   │
//! │  └──────┬──────────────────┬───────────────────┬───────────────────┘   │
//! │         │                  │                   │                        │
//! │         ▼                  ▼                   ▼                        │
//! │  ┌────────────┐   ┌──────────────┐   ┌──────────────────┐              │
//! │  │ LanDriver  │   │  SimDriver   │   │ external drivers │              │
//! │  │ TCP + UDP  │   │  in-memory   │   │ (radio stack,    │              │
//! │  │ discovery  │   │  devices     │   │  wired, ...)     │              │
//! │  └────────────┘   └──────────────┘   └──────────────────┘              │
//! │                                                                         │
//! │  The physical radio stack is an external collaborator: it plugs in     │
//! │  here and is not implemented by this crate.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use biolink_core::{ConnectionType, DiscoveredDevice};

use crate::error::DeviceResult;
use crate::wire::{WireRequest, WireResponse};

pub mod lan;
pub mod sim;

// =============================================================================
// Transport Kind
// =============================================================================

/// Transports a session can run over. Unlike [`ConnectionType`] this never
/// includes `Disconnected` — a transport is always a concrete channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Short-range radio (session-count ceiling applies).
    Radio,
    /// Local-area network.
    Lan,
    /// Device-hosted access point.
    AccessPoint,
    /// Wired connection.
    Wired,
}

impl TransportKind {
    /// The connection type recorded for sessions on this transport.
    pub fn connection_type(&self) -> ConnectionType {
        match self {
            TransportKind::Radio => ConnectionType::Radio,
            TransportKind::Lan => ConnectionType::Lan,
            TransportKind::AccessPoint => ConnectionType::AccessPoint,
            TransportKind::Wired => ConnectionType::Wired,
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Radio => write!(f, "radio"),
            TransportKind::Lan => write!(f, "lan"),
            TransportKind::AccessPoint => write!(f, "access_point"),
            TransportKind::Wired => write!(f, "wired"),
        }
    }
}

// =============================================================================
// Device Link
// =============================================================================

/// One live session to one device.
///
/// Links are cheap to share (`Arc`) and internally synchronized; the
/// dispatcher issues concurrent requests over the same link and correlates
/// responses by request id.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Sends a request and awaits the matching response or the timeout.
    ///
    /// A timeout leaves the link usable; the late response, if it ever
    /// arrives, is dropped by the correlation layer.
    async fn request(&self, request: WireRequest, timeout: Duration) -> DeviceResult<WireResponse>;

    /// Resolves when the session is lost or closed, however that happens.
    /// The coordinator's watcher task awaits this to drive reconnects.
    async fn closed(&self);

    /// Tears the session down. Idempotent.
    async fn close(&self);

    /// Transport this link runs over.
    fn transport(&self) -> TransportKind;

    /// Remote address, for socket transports.
    fn remote_address(&self) -> Option<String>;
}

// =============================================================================
// Transport Driver
// =============================================================================

/// A per-transport driver: discovery plus session establishment.
///
/// This is the external-collaborator boundary. The LAN driver in this crate
/// is a complete implementation; radio and wired stacks implement this trait
/// out-of-crate and register with the coordinator.
#[async_trait]
pub trait TransportDriver: Send + Sync {
    /// The transport this driver serves.
    fn kind(&self) -> TransportKind;

    /// Scans for reachable devices until the timeout elapses.
    async fn scan(&self, timeout: Duration) -> DeviceResult<Vec<DiscoveredDevice>>;

    /// Opens a session to a device.
    ///
    /// `address` is required for socket transports when the device was not
    /// previously discovered; radio drivers resolve by id.
    async fn connect(
        &self,
        device_id: &str,
        address: Option<&str>,
    ) -> DeviceResult<Arc<dyn DeviceLink>>;
}
