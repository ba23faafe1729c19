//! # Command Dispatcher
//!
//! Executes single or bulk commands against one or more devices with
//! per-device timeouts and isolated failure domains.
//!
//! ## Fan-out Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Command Fan-out                                     │
//! │                                                                         │
//! │  send_command(request)                                                  │
//! │       │                                                                 │
//! │       ├── spawn ──► device A task ──► result A (after 12 ms)           │
//! │       ├── spawn ──► device B task ──► result B (timeout at 10 s)       │
//! │       └── spawn ──► device C task ──► result C (after 30 ms)           │
//! │                                                                         │
//! │  Every target gets its own task: B's timeout neither aborts nor        │
//! │  delays A's and C's results. DeviceNotFound / NoActiveConnection /     │
//! │  CommandTimeout are folded into that device's CommandResult - the      │
//! │  batch call itself only fails on a malformed request.                  │
//! │                                                                         │
//! │  Results complete in any order; callers key by device_id.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use biolink_core::{
    validation, CalibrationParams, CommandKind, CommandPriority, CommandRequest, CommandResult,
    DeviceGroup, DeviceStatus, MeasurementParams,
};

use crate::coordinator::ConnectionCoordinator;
use crate::error::{DeviceError, DeviceResult};
use crate::registry::DeviceRegistry;
use crate::wire::WireRequest;

/// Dispatches commands over active sessions.
#[derive(Clone)]
pub struct CommandDispatcher {
    coordinator: Arc<ConnectionCoordinator>,
    registry: DeviceRegistry,
}

impl CommandDispatcher {
    pub fn new(coordinator: Arc<ConnectionCoordinator>, registry: DeviceRegistry) -> Self {
        CommandDispatcher {
            coordinator,
            registry,
        }
    }

    // =========================================================================
    // Core Fan-out
    // =========================================================================

    /// Sends a command to every target and returns one result per target.
    ///
    /// The only error this returns is a malformed request (empty target
    /// set, invalid ids); everything that goes wrong per device is reported
    /// inline in that device's result.
    pub async fn send_command(&self, request: CommandRequest) -> DeviceResult<Vec<CommandResult>> {
        validation::validate_command_request(&request)?;

        debug!(
            request_id = %request.id,
            kind = request.kind.wire_type(),
            targets = request.targets.len(),
            priority = ?request.priority,
            "Dispatching command"
        );

        let mut tasks = JoinSet::new();
        for device_id in request.targets.clone() {
            let dispatcher = self.clone();
            let kind = request.kind.clone();
            let timeout = request.timeout;
            tasks.spawn(async move {
                dispatcher
                    .send_to_device(device_id, kind, timeout)
                    .await
            });
        }

        let mut results = Vec::with_capacity(request.targets.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                // A panicked task still owes its device a result; this only
                // fires on a bug in the per-device path.
                Err(e) => {
                    warn!(?e, "Command task failed to join");
                }
            }
        }

        Ok(results)
    }

    /// The per-device unit of work: resolve the session, send, await the
    /// response or the timeout, record the outcome.
    async fn send_to_device(
        &self,
        device_id: String,
        kind: CommandKind,
        timeout: std::time::Duration,
    ) -> CommandResult {
        let started = Instant::now();
        let elapsed_ms = |started: Instant| started.elapsed().as_millis() as u64;

        if self.registry.get(&device_id).await.is_none() {
            let err = DeviceError::DeviceNotFound {
                device_id: device_id.clone(),
            };
            return CommandResult::failed(device_id, err.to_string(), elapsed_ms(started));
        }

        let Some(link) = self.coordinator.link_for(&device_id).await else {
            let err = DeviceError::NoActiveConnection {
                device_id: device_id.clone(),
            };
            return CommandResult::failed(device_id, err.to_string(), elapsed_ms(started));
        };

        let wire_request = WireRequest::from_command(&kind);
        match link.request(wire_request, timeout).await {
            Ok(response) if response.is_error() => {
                let message = response
                    .error_message()
                    .unwrap_or_else(|| "unspecified device error".into());
                self.registry
                    .update(&device_id, |r| r.record_error())
                    .await;
                CommandResult::failed(device_id, message, elapsed_ms(started))
            }
            Ok(response) => {
                self.note_command_success(&device_id, &kind).await;
                CommandResult::ok(device_id, response.data, elapsed_ms(started))
            }
            Err(e) => {
                debug!(device_id, ?e, "Command failed");
                CommandResult::failed(device_id, e.to_string(), elapsed_ms(started))
            }
        }
    }

    /// Registry bookkeeping after an acknowledged command.
    async fn note_command_success(&self, device_id: &str, kind: &CommandKind) {
        let now = chrono::Utc::now();
        self.registry
            .update(device_id, |r| {
                r.touch(now);
                match kind {
                    CommandKind::StartMeasurement(_) => r.status = DeviceStatus::Measuring,
                    CommandKind::StopMeasurement => r.status = DeviceStatus::Online,
                    CommandKind::Calibrate(_) => r.status = DeviceStatus::Calibrating,
                    _ => {}
                }
            })
            .await;
    }

    // =========================================================================
    // Bulk Helpers
    // =========================================================================

    /// All registry device ids, for registry-wide bulk commands. Devices
    /// without a session still get a result (NoActiveConnection inline).
    async fn all_target_ids(&self) -> Vec<String> {
        self.registry.all().await.into_iter().map(|r| r.id).collect()
    }

    /// Calibrates every registered device.
    pub async fn calibrate_all(
        &self,
        params: CalibrationParams,
    ) -> DeviceResult<Vec<CommandResult>> {
        let targets = self.all_target_ids().await;
        self.send_command(CommandRequest::new(CommandKind::Calibrate(params), targets))
            .await
    }

    /// Starts a measurement on every registered device.
    pub async fn start_measurement_all(
        &self,
        params: MeasurementParams,
    ) -> DeviceResult<Vec<CommandResult>> {
        let targets = self.all_target_ids().await;
        self.send_command(CommandRequest::new(
            CommandKind::StartMeasurement(params),
            targets,
        ))
        .await
    }

    /// Stops measurements on every registered device.
    pub async fn stop_measurement_all(&self) -> DeviceResult<Vec<CommandResult>> {
        let targets = self.all_target_ids().await;
        self.send_command(CommandRequest::new(CommandKind::StopMeasurement, targets))
            .await
    }

    /// Polls status from every registered device.
    pub async fn get_status_all(&self) -> DeviceResult<Vec<CommandResult>> {
        let targets = self.all_target_ids().await;
        self.send_command(CommandRequest::new(CommandKind::GetStatus, targets))
            .await
    }

    /// Sends a command to a device group with the kind's default priority.
    pub async fn send_to_group(
        &self,
        group: &DeviceGroup,
        kind: CommandKind,
    ) -> DeviceResult<Vec<CommandResult>> {
        let targets: Vec<String> = group.device_ids.iter().cloned().collect();
        self.send_command(CommandRequest::new(kind, targets)).await
    }

    /// Sends a command to a device group with an explicit priority.
    pub async fn send_to_group_with_priority(
        &self,
        group: &DeviceGroup,
        kind: CommandKind,
        priority: CommandPriority,
    ) -> DeviceResult<Vec<CommandResult>> {
        let targets: Vec<String> = group.device_ids.iter().cloned().collect();
        self.send_command(CommandRequest::new(kind, targets).with_priority(priority))
            .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::events::DeviceEventBus;
    use crate::transport::sim::{SimDeviceConfig, SimDriver};
    use crate::transport::TransportKind;
    use std::collections::HashMap;
    use std::time::Duration;

    async fn fixture() -> (CommandDispatcher, Arc<SimDriver>, Arc<ConnectionCoordinator>) {
        let registry = DeviceRegistry::new();
        let driver = Arc::new(SimDriver::new(TransportKind::Radio));
        let coordinator = ConnectionCoordinator::new(
            registry.clone(),
            DeviceEventBus::new(),
            CoordinatorConfig::default(),
        );
        coordinator.register_driver(driver.clone());
        (
            CommandDispatcher::new(coordinator.clone(), registry),
            driver,
            coordinator,
        )
    }

    #[tokio::test]
    async fn test_fanout_isolates_failures() {
        let (dispatcher, driver, coordinator) = fixture().await;

        driver.add_device(SimDeviceConfig::new("fast", "fast"));
        driver.add_device(SimDeviceConfig::new("dead", "dead").silent());
        driver.add_device(SimDeviceConfig::new("ok", "ok"));

        for id in ["fast", "dead", "ok"] {
            coordinator.connect(id, TransportKind::Radio, None).await.unwrap();
        }

        let request = CommandRequest::new(
            CommandKind::GetStatus,
            vec!["fast".into(), "dead".into(), "ok".into()],
        )
        .with_timeout(Duration::from_millis(100));

        let started = Instant::now();
        let results = dispatcher.send_command(request).await.unwrap();

        // Full result set, keyed by device id.
        assert_eq!(results.len(), 3);
        let by_id: HashMap<&str, &CommandResult> =
            results.iter().map(|r| (r.device_id.as_str(), r)).collect();

        assert!(by_id["fast"].success);
        assert!(by_id["ok"].success);
        assert!(!by_id["dead"].success);
        assert!(by_id["dead"].error.as_ref().unwrap().contains("timed out"));

        // The dead device's timeout bounded the batch; it did not serialize
        // behind the healthy devices or multiply.
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_not_found_and_no_connection_inline() {
        let (dispatcher, driver, coordinator) = fixture().await;

        driver.add_device(SimDeviceConfig::new("connected", "connected"));
        coordinator
            .connect("connected", TransportKind::Radio, None)
            .await
            .unwrap();
        // Known but disconnected
        coordinator.disconnect("connected").await.unwrap();

        let results = dispatcher
            .send_command(CommandRequest::new(
                CommandKind::GetStatus,
                vec!["connected".into(), "ghost".into()],
            ))
            .await
            .unwrap();

        let by_id: HashMap<&str, &CommandResult> =
            results.iter().map(|r| (r.device_id.as_str(), r)).collect();

        assert!(!by_id["connected"].success);
        assert!(by_id["connected"]
            .error
            .as_ref()
            .unwrap()
            .contains("No active connection"));

        assert!(!by_id["ghost"].success);
        assert!(by_id["ghost"].error.as_ref().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_empty_targets_rejected() {
        let (dispatcher, _, _) = fixture().await;
        let err = dispatcher
            .send_command(CommandRequest::new(CommandKind::GetStatus, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Core(biolink_core::CoreError::EmptyTargets)
        ));
    }

    #[tokio::test]
    async fn test_device_error_envelope_reported() {
        let (dispatcher, driver, coordinator) = fixture().await;
        driver.add_device(SimDeviceConfig::new("cranky", "cranky").failing());
        coordinator
            .connect("cranky", TransportKind::Radio, None)
            .await
            .unwrap();

        let results = dispatcher
            .send_command(CommandRequest::new(
                CommandKind::Restart,
                vec!["cranky".into()],
            ))
            .await
            .unwrap();

        assert!(!results[0].success);
        assert!(results[0]
            .error
            .as_ref()
            .unwrap()
            .contains("simulated device fault"));

        // Error counter ticked.
        assert_eq!(
            dispatcher.registry.get("cranky").await.unwrap().error_count,
            1
        );
    }

    #[tokio::test]
    async fn test_bulk_helpers_cover_registry() {
        let (dispatcher, driver, coordinator) = fixture().await;
        driver.add_device(SimDeviceConfig::new("a", "a"));
        driver.add_device(SimDeviceConfig::new("b", "b"));
        for id in ["a", "b"] {
            coordinator.connect(id, TransportKind::Radio, None).await.unwrap();
        }

        let results = dispatcher.get_status_all().await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));

        let results = dispatcher
            .start_measurement_all(MeasurementParams::default())
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.success));
        assert_eq!(
            dispatcher.registry.get("a").await.unwrap().status,
            DeviceStatus::Measuring
        );
    }

    #[tokio::test]
    async fn test_group_addressing() {
        let (dispatcher, driver, coordinator) = fixture().await;
        for id in ["a", "b", "c"] {
            driver.add_device(SimDeviceConfig::new(id, id));
            coordinator.connect(id, TransportKind::Radio, None).await.unwrap();
        }

        let mut group = DeviceGroup::new("ward-3");
        group.add("a");
        group.add("c");

        let results = dispatcher
            .send_to_group(&group, CommandKind::GetStatus)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        let ids: std::collections::HashSet<&str> =
            results.iter().map(|r| r.device_id.as_str()).collect();
        assert!(ids.contains("a") && ids.contains("c") && !ids.contains("b"));
    }
}
