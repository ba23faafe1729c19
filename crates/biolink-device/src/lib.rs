//! # biolink-device: Device Connectivity Layer
//!
//! Discovers, connects to, commands, and monitors a fleet of measurement
//! devices over heterogeneous transports.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Device Layer Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                ConnectionCoordinator (Orchestrator)              │  │
//! │  │                                                                  │  │
//! │  │  • scan → connect → GET_INFO handshake → monitor → reconnect     │  │
//! │  │  • Radio admission ceiling enforced atomically                   │  │
//! │  │  • One scan per transport at a time                              │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ DeviceRegistry │  │CommandDispatch │  │  HealthMonitor         │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Single source  │  │ Fan-out with   │  │ Liveness sweep +       │    │
//! │  │ of truth for   │  │ isolated       │  │ low-resource flags +   │    │
//! │  │ device state   │  │ failures       │  │ status probes          │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Transports     │  │ NetworkMonitor │  │  DeviceEventBus        │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Driver trait + │  │ cloud → local  │  │ Typed broadcast        │    │
//! │  │ LAN + sim      │  │ → direct →     │  │ events                 │    │
//! │  │ drivers        │  │ offline        │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  EVENTS:                                                               │
//! │  • DeviceDiscovered / DeviceConnected / DeviceDisconnected             │
//! │  • DeviceOffline / DeviceLowBattery (once per transition)              │
//! │  • ReconnectScheduled / ReconnectAbandoned                             │
//! │  • NetworkModeChanged                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`registry`] - In-memory device table (single source of truth)
//! - [`coordinator`] - Session lifecycle and admission control
//! - [`dispatcher`] - Command fan-out with isolated failure domains
//! - [`monitor`] - Heartbeat/liveness sweep
//! - [`transport`] - Driver seam, LAN driver, simulated driver
//! - [`wire`] - Request/response envelopes and the info handshake
//! - [`netmode`] - Network reachability probing
//! - [`events`] - Typed event bus
//! - [`export`] - Device table reporting surface
//!
//! ## Usage
//!
//! ```rust,ignore
//! use biolink_device::{
//!     ConnectionCoordinator, CoordinatorConfig, DeviceEventBus, DeviceRegistry,
//!     transport::lan::LanDriver, transport::TransportKind,
//! };
//!
//! let registry = DeviceRegistry::new();
//! let events = DeviceEventBus::new();
//! let coordinator = ConnectionCoordinator::new(
//!     registry.clone(), events.clone(), CoordinatorConfig::default());
//! coordinator.register_driver(Arc::new(LanDriver::new(TransportKind::Lan)));
//!
//! let found = coordinator.scan(TransportKind::Lan, Duration::from_secs(5)).await?;
//! let record = coordinator
//!     .connect(&found[0].id, TransportKind::Lan, Some("10.0.0.9:4711".into()))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod export;
pub mod monitor;
pub mod netmode;
pub mod registry;
pub mod transport;
pub mod wire;

// =============================================================================
// Re-exports
// =============================================================================

pub use coordinator::{ConnectionCoordinator, CoordinatorConfig};
pub use dispatcher::CommandDispatcher;
pub use error::{DeviceError, DeviceResult};
pub use events::{DeviceEvent, DeviceEventBus};
pub use export::{device_export_rows, devices_to_delimited, DeviceExportRow};
pub use monitor::{HealthMonitor, HealthMonitorHandle, MonitorConfig};
pub use netmode::{NetworkMonitor, NetworkMonitorHandle, NetworkProbeConfig, NetworkProber};
pub use registry::DeviceRegistry;
pub use transport::{DeviceLink, TransportDriver, TransportKind};
pub use wire::{DeviceInfo, WireRequest, WireResponse};
