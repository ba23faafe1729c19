//! # Device Wire Protocol
//!
//! The request/response message envelopes spoken over every transport
//! session, independent of the transport carrying them.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Device Wire Protocol                               │
//! │                                                                         │
//! │  INFO HANDSHAKE (immediately after connect)                            │
//! │  ──────────────────────────────────────────                            │
//! │  host   ───► { type: "GET_INFO", requestId }                           │
//! │  device ◄─── { type: "DEVICE_INFO", data: {...}, requestId }           │
//! │                                                                         │
//! │  COMMANDS                                                              │
//! │  ────────                                                              │
//! │  host   ───► { type: "START_MEASUREMENT", params, requestId }          │
//! │  device ◄─── { type: "START_MEASUREMENT_RESPONSE", data, requestId }   │
//! │                                                                         │
//! │  ERRORS                                                                │
//! │  ──────                                                                │
//! │  device ◄─── { type: "ERROR", data: { message }, requestId }           │
//! │                                                                         │
//! │  Responses are correlated to requests by requestId; transports may     │
//! │  interleave them freely.                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use biolink_core::{
    CommandKind, ConnectionType, DeviceCapability, DeviceRecord, DeviceStatus,
};

use crate::error::{DeviceError, DeviceResult};

// =============================================================================
// Constants
// =============================================================================

/// Wire type of the info request sent immediately after connection.
pub const GET_INFO: &str = "GET_INFO";

/// Wire type of the info response.
pub const DEVICE_INFO: &str = "DEVICE_INFO";

/// Wire type used by devices to report a command failure.
pub const ERROR_TYPE: &str = "ERROR";

// =============================================================================
// Request Envelope
// =============================================================================

/// A request envelope sent to a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    /// Command type string, e.g. "GET_STATUS".
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Command parameters, when the command has any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,

    /// Correlation id echoed back in the response.
    pub request_id: String,
}

impl WireRequest {
    /// Creates a request with a fresh correlation id.
    pub fn new(msg_type: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        WireRequest {
            msg_type: msg_type.into(),
            params,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Builds the envelope for a typed command.
    pub fn from_command(kind: &CommandKind) -> Self {
        WireRequest::new(kind.wire_type(), kind.wire_params())
    }

    /// Builds the post-connect info request.
    pub fn get_info() -> Self {
        WireRequest::new(GET_INFO, None)
    }

    /// The response type expected for this request.
    pub fn expected_response_type(&self) -> String {
        if self.msg_type == GET_INFO {
            DEVICE_INFO.to_string()
        } else {
            format!("{}_RESPONSE", self.msg_type)
        }
    }

    /// Serializes to a single JSON line (no embedded newlines).
    pub fn to_json(&self) -> DeviceResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// =============================================================================
// Response Envelope
// =============================================================================

/// A response envelope received from a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    /// Response type string, e.g. "GET_STATUS_RESPONSE".
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Response payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Correlation id copied from the request.
    pub request_id: String,
}

impl WireResponse {
    pub fn new(
        msg_type: impl Into<String>,
        data: Option<serde_json::Value>,
        request_id: impl Into<String>,
    ) -> Self {
        WireResponse {
            msg_type: msg_type.into(),
            data,
            request_id: request_id.into(),
        }
    }

    /// Builds the success response for a request.
    pub fn for_request(request: &WireRequest, data: Option<serde_json::Value>) -> Self {
        WireResponse::new(request.expected_response_type(), data, &request.request_id)
    }

    /// Builds an error response for a request.
    pub fn error_for(request: &WireRequest, message: impl Into<String>) -> Self {
        WireResponse::new(
            ERROR_TYPE,
            Some(serde_json::json!({ "message": message.into() })),
            &request.request_id,
        )
    }

    /// Returns true when the device reported a failure.
    pub fn is_error(&self) -> bool {
        self.msg_type == ERROR_TYPE
    }

    /// Error message carried by an ERROR envelope.
    pub fn error_message(&self) -> Option<String> {
        if !self.is_error() {
            return None;
        }
        self.data
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(|m| m.as_str())
            .map(|s| s.to_string())
            .or_else(|| Some("unspecified device error".to_string()))
    }

    pub fn to_json(&self) -> DeviceResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> DeviceResult<Self> {
        serde_json::from_str(json).map_err(|e| DeviceError::InvalidMessage(e.to_string()))
    }
}

// =============================================================================
// Device Info Payload
// =============================================================================

/// Payload of the `DEVICE_INFO` handshake response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub serial: String,
    pub name: String,
    pub model: String,
    pub firmware_version: String,

    #[serde(default)]
    pub capabilities: Vec<DeviceCapability>,

    #[serde(default)]
    pub battery_percent: Option<u8>,

    #[serde(default)]
    pub uptime_secs: u64,

    #[serde(default)]
    pub signal_quality: u8,
}

impl DeviceInfo {
    /// Parses the payload out of a `DEVICE_INFO` response.
    pub fn from_response(response: &WireResponse) -> DeviceResult<Self> {
        if response.msg_type != DEVICE_INFO {
            return Err(DeviceError::HandshakeFailed(format!(
                "expected {DEVICE_INFO}, got {}",
                response.msg_type
            )));
        }
        let data = response
            .data
            .as_ref()
            .ok_or_else(|| DeviceError::HandshakeFailed("empty DEVICE_INFO payload".into()))?;
        serde_json::from_value(data.clone())
            .map_err(|e| DeviceError::HandshakeFailed(e.to_string()))
    }

    /// Builds the registry record for a freshly connected device.
    pub fn into_record(
        self,
        connection_type: ConnectionType,
        address: Option<String>,
        now: DateTime<Utc>,
    ) -> DeviceRecord {
        DeviceRecord {
            id: self.id,
            serial: self.serial,
            name: self.name,
            model: self.model,
            firmware_version: self.firmware_version,
            connection_type,
            signal_quality: self.signal_quality,
            address,
            status: DeviceStatus::Online,
            capabilities: self.capabilities,
            measurement_count: 0,
            error_count: 0,
            uptime_secs: self.uptime_secs,
            battery_percent: self.battery_percent,
            last_seen: now,
            last_measurement: None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use biolink_core::MeasurementParams;

    #[test]
    fn test_request_envelope_shape() {
        let request = WireRequest::from_command(&CommandKind::StartMeasurement(
            MeasurementParams::default(),
        ));
        let json = request.to_json().unwrap();

        assert!(json.contains("\"type\":\"START_MEASUREMENT\""));
        assert!(json.contains("\"requestId\""));
        assert!(json.contains("\"params\""));
    }

    #[test]
    fn test_parameterless_request_omits_params() {
        let request = WireRequest::from_command(&CommandKind::GetStatus);
        let json = request.to_json().unwrap();
        assert!(!json.contains("\"params\""));
    }

    #[test]
    fn test_expected_response_types() {
        let request = WireRequest::from_command(&CommandKind::GetStatus);
        assert_eq!(request.expected_response_type(), "GET_STATUS_RESPONSE");

        let info = WireRequest::get_info();
        assert_eq!(info.expected_response_type(), DEVICE_INFO);
    }

    #[test]
    fn test_error_envelope() {
        let request = WireRequest::from_command(&CommandKind::Restart);
        let response = WireResponse::error_for(&request, "battery too low");

        assert!(response.is_error());
        assert_eq!(response.error_message().unwrap(), "battery too low");
        assert_eq!(response.request_id, request.request_id);
    }

    #[test]
    fn test_device_info_roundtrip() {
        let info = DeviceInfo {
            id: "dev-1".into(),
            serial: "SN-042".into(),
            name: "Analyzer 1".into(),
            model: "BL-200".into(),
            firmware_version: "2.4.1".into(),
            capabilities: vec![DeviceCapability::Glucose, DeviceCapability::Continuous],
            battery_percent: Some(88),
            uptime_secs: 3600,
            signal_quality: 72,
        };

        let request = WireRequest::get_info();
        let response = WireResponse::for_request(
            &request,
            Some(serde_json::to_value(&info).unwrap()),
        );
        assert_eq!(response.msg_type, DEVICE_INFO);

        let parsed = DeviceInfo::from_response(&response).unwrap();
        assert_eq!(parsed.id, "dev-1");

        let record = parsed.into_record(ConnectionType::Lan, Some("10.0.0.9:4711".into()), Utc::now());
        assert_eq!(record.status, DeviceStatus::Online);
        assert_eq!(record.connection_type, ConnectionType::Lan);
        assert_eq!(record.battery_percent, Some(88));
    }

    #[test]
    fn test_info_from_wrong_response_fails() {
        let response = WireResponse::new("GET_STATUS_RESPONSE", None, "r-1");
        assert!(DeviceInfo::from_response(&response).is_err());
    }
}
