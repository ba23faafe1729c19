//! # Validation Rules
//!
//! Invariant checks shared by the device and sync layers. Kept here so the
//! rules are pure, identical everywhere, and testable without I/O.

use crate::command::CommandRequest;
use crate::error::{CoreError, CoreResult};
use crate::{MAX_DEVICE_ID_LEN, MAX_SYNC_PAYLOAD_BYTES};

/// Validates a device identifier.
///
/// Ids travel in wire envelopes, registry keys, and sync metadata; they must
/// be non-empty, bounded, and free of control characters.
pub fn validate_device_id(id: &str) -> CoreResult<()> {
    if id.is_empty() {
        return Err(CoreError::InvalidDeviceId("empty".into()));
    }
    if id.len() > MAX_DEVICE_ID_LEN {
        return Err(CoreError::InvalidDeviceId(format!(
            "longer than {} bytes",
            MAX_DEVICE_ID_LEN
        )));
    }
    if id.chars().any(|c| c.is_control()) {
        return Err(CoreError::InvalidDeviceId(
            "contains control characters".into(),
        ));
    }
    Ok(())
}

/// Validates a command request before fan-out.
pub fn validate_command_request(request: &CommandRequest) -> CoreResult<()> {
    if request.targets.is_empty() {
        return Err(CoreError::EmptyTargets);
    }
    for target in &request.targets {
        validate_device_id(target)?;
    }
    Ok(())
}

/// Validates a sync payload's serialized size.
pub fn validate_payload(payload: &serde_json::Value) -> CoreResult<()> {
    // to_string never fails for a Value built from valid JSON
    let actual = payload.to_string().len();
    if actual > MAX_SYNC_PAYLOAD_BYTES {
        return Err(CoreError::PayloadTooLarge {
            actual,
            max: MAX_SYNC_PAYLOAD_BYTES,
        });
    }
    Ok(())
}
