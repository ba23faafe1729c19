//! # Device Domain Types
//!
//! Types describing measurement devices and their live state.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Device Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  DeviceRecord   │   │  DeviceGroup    │   │ DiscoveredDevice│       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id / serial    │   │  name           │   │  id             │       │
//! │  │  status         │   │  device_ids     │   │  transport      │       │
//! │  │  connection     │   │  (bulk address- │   │  signal_quality │       │
//! │  │  capabilities   │   │   ing only)     │   │  is_paired      │       │
//! │  │  counters       │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ ConnectionType  │   │  DeviceStatus   │   │  NetworkMode    │       │
//! │  │  Radio          │   │  Online         │   │  Cloud          │       │
//! │  │  Lan            │   │  Offline        │   │  LocalServer    │       │
//! │  │  AccessPoint    │   │  Measuring      │   │  Direct         │       │
//! │  │  Wired          │   │  Calibrating    │   │  Offline        │       │
//! │  │  Disconnected   │   │  LowResource    │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//! `DeviceRecord`s are owned exclusively by the device registry. The
//! connection coordinator and health monitor mutate them through the
//! registry's atomic-replacement API; nothing else writes them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// =============================================================================
// Connection Type
// =============================================================================

/// The transport a device session runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// Short-range radio (hard session-count ceiling applies).
    Radio,
    /// Local-area network socket.
    Lan,
    /// Device-hosted access point (socket at a fixed well-known address).
    AccessPoint,
    /// Wired connection.
    Wired,
    /// No active session.
    Disconnected,
}

impl ConnectionType {
    /// Returns true when an active session exists on this transport.
    pub fn is_connected(&self) -> bool {
        !matches!(self, ConnectionType::Disconnected)
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionType::Radio => write!(f, "radio"),
            ConnectionType::Lan => write!(f, "lan"),
            ConnectionType::AccessPoint => write!(f, "access_point"),
            ConnectionType::Wired => write!(f, "wired"),
            ConnectionType::Disconnected => write!(f, "disconnected"),
        }
    }
}

impl std::str::FromStr for ConnectionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "radio" => Ok(ConnectionType::Radio),
            "lan" => Ok(ConnectionType::Lan),
            "access_point" => Ok(ConnectionType::AccessPoint),
            "wired" => Ok(ConnectionType::Wired),
            "disconnected" => Ok(ConnectionType::Disconnected),
            other => Err(CoreError::UnknownVariant {
                field: "connection_type",
                value: other.to_string(),
            }),
        }
    }
}

// =============================================================================
// Device Status
// =============================================================================

/// Operational state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Session established and responsive.
    Online,
    /// No session, or silent past the liveness threshold.
    Offline,
    /// Session establishment in progress.
    Connecting,
    /// Actively taking a measurement.
    Measuring,
    /// Calibration cycle in progress.
    Calibrating,
    /// Device reported an error condition.
    Error,
    /// Resource level (battery) below the low threshold.
    LowResource,
}

impl DeviceStatus {
    /// Statuses counted as "online" in registry totals: any state that
    /// implies a live session.
    pub fn counts_as_online(&self) -> bool {
        matches!(
            self,
            DeviceStatus::Online
                | DeviceStatus::Measuring
                | DeviceStatus::Calibrating
                | DeviceStatus::LowResource
        )
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Online => write!(f, "online"),
            DeviceStatus::Offline => write!(f, "offline"),
            DeviceStatus::Connecting => write!(f, "connecting"),
            DeviceStatus::Measuring => write!(f, "measuring"),
            DeviceStatus::Calibrating => write!(f, "calibrating"),
            DeviceStatus::Error => write!(f, "error"),
            DeviceStatus::LowResource => write!(f, "low_resource"),
        }
    }
}

// =============================================================================
// Device Capability
// =============================================================================

/// Capability tags reported by a device during the info handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCapability {
    /// Glucose measurement channel.
    Glucose,
    /// Lactate measurement channel.
    Lactate,
    /// Continuous (streaming) measurement mode.
    Continuous,
    /// Accepts over-the-air firmware updates.
    FirmwareUpdate,
}

// =============================================================================
// Device Record
// =============================================================================

/// Everything known about one device right now.
///
/// Single source of truth lives in the device registry; updates are atomic
/// whole-record replacements so concurrent readers never observe a record
/// mid-write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Unique identifier (stable across transports).
    pub id: String,

    /// Manufacturer serial number.
    pub serial: String,

    /// Human-readable display name.
    pub name: String,

    /// Hardware model.
    pub model: String,

    /// Firmware version string.
    pub firmware_version: String,

    /// Transport the active session runs over.
    pub connection_type: ConnectionType,

    /// Signal quality 0-100 (0 when disconnected).
    pub signal_quality: u8,

    /// Network address for socket transports.
    pub address: Option<String>,

    /// Operational state.
    pub status: DeviceStatus,

    /// Capability tags from the info handshake.
    pub capabilities: Vec<DeviceCapability>,

    /// Total measurements observed from this device.
    pub measurement_count: u64,

    /// Total error responses observed from this device.
    pub error_count: u64,

    /// Device-reported uptime in seconds.
    pub uptime_secs: u64,

    /// Battery level 0-100, if the device reports one.
    pub battery_percent: Option<u8>,

    /// Last time anything was heard from the device.
    pub last_seen: DateTime<Utc>,

    /// Last time a measurement arrived.
    pub last_measurement: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    /// Creates a record for a device that has not completed a handshake yet.
    pub fn placeholder(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        let id = id.into();
        DeviceRecord {
            serial: String::new(),
            name: id.clone(),
            id,
            model: String::new(),
            firmware_version: String::new(),
            connection_type: ConnectionType::Disconnected,
            signal_quality: 0,
            address: None,
            status: DeviceStatus::Connecting,
            capabilities: Vec::new(),
            measurement_count: 0,
            error_count: 0,
            uptime_secs: 0,
            battery_percent: None,
            last_seen: now,
            last_measurement: None,
        }
    }

    /// Returns true when an active session exists.
    pub fn is_connected(&self) -> bool {
        self.connection_type.is_connected() && self.status.counts_as_online()
    }

    /// Records activity from the device.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen = now;
    }

    /// Records an observed measurement.
    pub fn record_measurement(&mut self, now: DateTime<Utc>) {
        self.measurement_count += 1;
        self.last_measurement = Some(now);
        self.last_seen = now;
    }

    /// Records an error response from the device.
    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    /// Returns true when the reported battery level is at or below the
    /// given threshold.
    pub fn battery_below(&self, threshold: u8) -> bool {
        matches!(self.battery_percent, Some(level) if level <= threshold)
    }

    /// Returns true if the device has a given capability.
    pub fn has_capability(&self, cap: DeviceCapability) -> bool {
        self.capabilities.contains(&cap)
    }
}

// =============================================================================
// Device Counts
// =============================================================================

/// Registry-level totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCounts {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
}

// =============================================================================
// Device Group
// =============================================================================

/// A named set of device ids used purely for addressing bulk commands.
///
/// Groups have no lifecycle of their own beyond create/add/remove/delete;
/// membership says nothing about device state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceGroup {
    /// Group name (unique key).
    pub name: String,

    /// Member device ids. Sorted set for deterministic iteration.
    pub device_ids: BTreeSet<String>,
}

impl DeviceGroup {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        DeviceGroup {
            name: name.into(),
            device_ids: BTreeSet::new(),
        }
    }

    /// Adds a device; returns false if it was already a member.
    pub fn add(&mut self, device_id: impl Into<String>) -> bool {
        self.device_ids.insert(device_id.into())
    }

    /// Removes a device; returns false if it was not a member.
    pub fn remove(&mut self, device_id: &str) -> bool {
        self.device_ids.remove(device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.device_ids.contains(device_id)
    }

    pub fn len(&self) -> usize {
        self.device_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.device_ids.is_empty()
    }
}

// =============================================================================
// Discovered Device
// =============================================================================

/// A device seen during a scan but not (yet) connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    /// Device identifier as announced on the transport.
    pub id: String,

    /// Announced display name.
    pub name: String,

    /// Transport the device was seen on.
    pub transport_type: ConnectionType,

    /// Signal quality 0-100 at scan time.
    pub signal_quality: u8,

    /// Whether the device is already paired/known to this transport.
    pub is_paired: bool,
}

// =============================================================================
// Network Mode
// =============================================================================

/// Reachability of the remote system, probed in preference order.
///
/// Device operations are unaffected by the mode — devices are addressed
/// directly over their transports — but the sync engine only drains the
/// queue when a remote path exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    /// Cloud endpoint reachable.
    Cloud,
    /// Configured local server reachable.
    LocalServer,
    /// No server reachable but a usable local interface exists
    /// (direct/peer operation).
    Direct,
    /// No connectivity at all.
    Offline,
}

impl NetworkMode {
    /// Returns true when the sync engine can attempt remote sends.
    pub fn is_online(&self) -> bool {
        matches!(self, NetworkMode::Cloud | NetworkMode::LocalServer)
    }
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkMode::Cloud => write!(f, "cloud"),
            NetworkMode::LocalServer => write!(f, "local_server"),
            NetworkMode::Direct => write!(f, "direct"),
            NetworkMode::Offline => write!(f, "offline"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_type_roundtrip() {
        for ct in [
            ConnectionType::Radio,
            ConnectionType::Lan,
            ConnectionType::AccessPoint,
            ConnectionType::Wired,
            ConnectionType::Disconnected,
        ] {
            let parsed: ConnectionType = ct.to_string().parse().unwrap();
            assert_eq!(parsed, ct);
        }
        assert!("bluetooth".parse::<ConnectionType>().is_err());
    }

    #[test]
    fn test_status_counts_as_online() {
        assert!(DeviceStatus::Online.counts_as_online());
        assert!(DeviceStatus::Measuring.counts_as_online());
        assert!(DeviceStatus::LowResource.counts_as_online());
        assert!(!DeviceStatus::Offline.counts_as_online());
        assert!(!DeviceStatus::Connecting.counts_as_online());
    }

    #[test]
    fn test_record_measurement_updates_counters() {
        let now = Utc::now();
        let mut record = DeviceRecord::placeholder("dev-1", now);
        assert_eq!(record.measurement_count, 0);

        record.record_measurement(now);
        assert_eq!(record.measurement_count, 1);
        assert_eq!(record.last_measurement, Some(now));
    }

    #[test]
    fn test_battery_below() {
        let now = Utc::now();
        let mut record = DeviceRecord::placeholder("dev-1", now);
        assert!(!record.battery_below(20)); // unknown level is not low

        record.battery_percent = Some(15);
        assert!(record.battery_below(20));

        record.battery_percent = Some(80);
        assert!(!record.battery_below(20));
    }

    #[test]
    fn test_group_membership() {
        let mut group = DeviceGroup::new("ward-3");
        assert!(group.add("dev-a"));
        assert!(!group.add("dev-a")); // duplicate
        assert!(group.contains("dev-a"));
        assert!(group.remove("dev-a"));
        assert!(group.is_empty());
    }

    #[test]
    fn test_network_mode_online() {
        assert!(NetworkMode::Cloud.is_online());
        assert!(NetworkMode::LocalServer.is_online());
        assert!(!NetworkMode::Direct.is_online());
        assert!(!NetworkMode::Offline.is_online());
    }
}
