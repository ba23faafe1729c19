//! # Command Types
//!
//! Typed command kinds, requests, and per-device results.
//!
//! ## Design: Tagged Union over Parameter Bags
//! Commands carry strongly typed parameter structs instead of loose
//! key/value maps, so a malformed command is a compile error rather than a
//! device-response error. The wire layer flattens these into the JSON
//! envelope the devices speak.
//!
//! ## Command Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Command Fan-out                                   │
//! │                                                                         │
//! │  CommandRequest { kind, targets: [A, B, C], priority, timeout }        │
//! │       │                                                                 │
//! │       ├──────────────► device A ──► CommandResult { ok, data }         │
//! │       ├──────────────► device B ──► CommandResult { err: Timeout }     │
//! │       └──────────────► device C ──► CommandResult { ok, data }         │
//! │                                                                         │
//! │  One result per target, failures inline. A slow or failed device       │
//! │  never aborts or delays the other targets' results.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Commands are transient value objects; they are never persisted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Command Priority
// =============================================================================

/// Priority of a command request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for CommandPriority {
    fn default() -> Self {
        CommandPriority::Normal
    }
}

// =============================================================================
// Command Parameters
// =============================================================================

/// Measurement mode for `StartMeasurement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementMode {
    /// One-shot measurement.
    Single,
    /// Streaming measurements until stopped.
    Continuous,
}

/// Parameters for `StartMeasurement`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementParams {
    pub mode: MeasurementMode,

    /// Optional bound on a continuous run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
}

impl Default for MeasurementParams {
    fn default() -> Self {
        MeasurementParams {
            mode: MeasurementMode::Single,
            duration_secs: None,
        }
    }
}

/// Parameters for `Calibrate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationParams {
    /// Known concentration of the reference solution.
    pub reference_value: f64,

    /// Lot number of the reference solution, when tracked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<String>,
}

/// Parameters for `SetConfig`. All fields optional; only present fields are
/// applied by the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_interval_secs: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_brightness: Option<u8>,

    /// Measurement unit identifier, e.g. "mg_dl" or "mmol_l".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Parameters for `FirmwareUpdate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareParams {
    /// Target firmware version.
    pub version: String,

    /// Where the device should fetch the image from.
    pub image_url: String,

    /// Optional integrity checksum the device verifies before flashing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

// =============================================================================
// Command Kind
// =============================================================================

/// All commands a device understands, with their typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum CommandKind {
    StartMeasurement(MeasurementParams),
    StopMeasurement,
    Calibrate(CalibrationParams),
    GetStatus,
    SetConfig(ConfigParams),
    Restart,
    FirmwareUpdate(FirmwareParams),
    Sleep,
    Wake,
}

impl CommandKind {
    /// Wire envelope type string for this command.
    pub fn wire_type(&self) -> &'static str {
        match self {
            CommandKind::StartMeasurement(_) => "START_MEASUREMENT",
            CommandKind::StopMeasurement => "STOP_MEASUREMENT",
            CommandKind::Calibrate(_) => "CALIBRATE",
            CommandKind::GetStatus => "GET_STATUS",
            CommandKind::SetConfig(_) => "SET_CONFIG",
            CommandKind::Restart => "RESTART",
            CommandKind::FirmwareUpdate(_) => "FIRMWARE_UPDATE",
            CommandKind::Sleep => "SLEEP",
            CommandKind::Wake => "WAKE",
        }
    }

    /// Serialized parameters for the wire envelope, if the kind has any.
    pub fn wire_params(&self) -> Option<serde_json::Value> {
        match self {
            CommandKind::StartMeasurement(p) => serde_json::to_value(p).ok(),
            CommandKind::Calibrate(p) => serde_json::to_value(p).ok(),
            CommandKind::SetConfig(p) => serde_json::to_value(p).ok(),
            CommandKind::FirmwareUpdate(p) => serde_json::to_value(p).ok(),
            _ => None,
        }
    }

    /// Default priority for this kind.
    ///
    /// Stop and calibrate default to High: stopping a runaway measurement
    /// and keeping calibration windows must not queue behind routine status
    /// polls.
    pub fn default_priority(&self) -> CommandPriority {
        match self {
            CommandKind::StopMeasurement | CommandKind::Calibrate(_) => CommandPriority::High,
            _ => CommandPriority::Normal,
        }
    }
}

// =============================================================================
// Command Request
// =============================================================================

/// Default per-device command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// A command addressed to one or more devices.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Request id, carried as `requestId` in every wire envelope spawned
    /// from this request.
    pub id: String,

    /// What to do.
    pub kind: CommandKind,

    /// Target device ids.
    pub targets: Vec<String>,

    /// Scheduling priority.
    pub priority: CommandPriority,

    /// Per-device response timeout.
    pub timeout: Duration,
}

impl CommandRequest {
    /// Creates a request with the kind's default priority and timeout.
    pub fn new(kind: CommandKind, targets: Vec<String>) -> Self {
        let priority = kind.default_priority();
        CommandRequest {
            id: Uuid::new_v4().to_string(),
            kind,
            targets,
            priority,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_priority(mut self, priority: CommandPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// =============================================================================
// Command Result
// =============================================================================

/// Per-device outcome of a command.
///
/// Returned as data, never thrown: a batch call yields one of these for
/// every requested target. Callers key results by `device_id`, not by
/// position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Target device.
    pub device_id: String,

    /// Whether the device acknowledged the command.
    pub success: bool,

    /// Response data on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error description on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the outcome was recorded.
    pub completed_at: DateTime<Utc>,

    /// Observed round-trip latency in milliseconds.
    pub latency_ms: u64,
}

impl CommandResult {
    /// A successful outcome.
    pub fn ok(device_id: impl Into<String>, data: Option<serde_json::Value>, latency_ms: u64) -> Self {
        CommandResult {
            device_id: device_id.into(),
            success: true,
            data,
            error: None,
            completed_at: Utc::now(),
            latency_ms,
        }
    }

    /// A failed outcome.
    pub fn failed(device_id: impl Into<String>, error: impl Into<String>, latency_ms: u64) -> Self {
        CommandResult {
            device_id: device_id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            completed_at: Utc::now(),
            latency_ms,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
