//! # Simulated Transport Driver
//!
//! An in-memory driver hosting simulated devices. Used by the test suites
//! and by development tooling when no physical fleet is attached; simulated
//! devices speak the same wire protocol as real ones.
//!
//! Behavior knobs per device: response latency, silence (never responds,
//! exercising command timeouts), forced command failures, reachability, and
//! externally triggered session drops (exercising reconnect paths).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use biolink_core::DiscoveredDevice;

use crate::error::{DeviceError, DeviceResult};
use crate::transport::{DeviceLink, TransportDriver, TransportKind};
use crate::wire::{DeviceInfo, WireRequest, WireResponse, GET_INFO};

// =============================================================================
// Simulated Device
// =============================================================================

/// Configuration of one simulated device.
#[derive(Debug, Clone)]
pub struct SimDeviceConfig {
    pub info: DeviceInfo,

    /// Whether the device shows up as paired during scans.
    pub paired: bool,

    /// Whether connect attempts succeed.
    pub reachable: bool,

    /// Artificial response latency.
    pub latency: Duration,

    /// Never respond to any request (commands hit their timeout).
    pub silent: bool,

    /// Respond to every command with an ERROR envelope.
    pub fail_commands: bool,
}

impl SimDeviceConfig {
    /// A healthy glucose analyzer with sensible defaults.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        SimDeviceConfig {
            info: DeviceInfo {
                serial: format!("SIM-{id}"),
                id,
                name: name.into(),
                model: "SIM-100".into(),
                firmware_version: "1.0.0".into(),
                capabilities: vec![],
                battery_percent: Some(100),
                uptime_secs: 0,
                signal_quality: 90,
            },
            paired: true,
            reachable: true,
            latency: Duration::ZERO,
            silent: false,
            fail_commands: false,
        }
    }

    pub fn with_battery(mut self, percent: u8) -> Self {
        self.info.battery_percent = Some(percent);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_commands = true;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }
}

// =============================================================================
// Simulated Driver
// =============================================================================

/// In-memory transport driver.
pub struct SimDriver {
    kind: TransportKind,
    devices: Arc<Mutex<HashMap<String, SimDeviceConfig>>>,

    /// Close signal of the most recent link per device, so tests can sever
    /// sessions out from under the coordinator.
    links: Arc<Mutex<HashMap<String, watch::Sender<bool>>>>,

    /// Artificial scan duration.
    scan_delay: Duration,
}

impl SimDriver {
    pub fn new(kind: TransportKind) -> Self {
        SimDriver {
            kind,
            devices: Arc::new(Mutex::new(HashMap::new())),
            links: Arc::new(Mutex::new(HashMap::new())),
            scan_delay: Duration::from_millis(10),
        }
    }

    pub fn with_scan_delay(mut self, delay: Duration) -> Self {
        self.scan_delay = delay;
        self
    }

    /// Registers a simulated device.
    pub fn add_device(&self, config: SimDeviceConfig) {
        self.devices
            .lock()
            .expect("sim device table poisoned")
            .insert(config.info.id.clone(), config);
    }

    /// Mutates a device's configuration in place.
    pub fn update_device(&self, device_id: &str, f: impl FnOnce(&mut SimDeviceConfig)) {
        if let Some(config) = self
            .devices
            .lock()
            .expect("sim device table poisoned")
            .get_mut(device_id)
        {
            f(config);
        }
    }

    /// Severs the active session to a device, as an unexpected radio drop
    /// or cable pull would.
    pub fn drop_link(&self, device_id: &str) {
        if let Some(tx) = self
            .links
            .lock()
            .expect("sim link table poisoned")
            .get(device_id)
        {
            let _ = tx.send(true);
        }
    }

    fn device(&self, device_id: &str) -> Option<SimDeviceConfig> {
        self.devices
            .lock()
            .expect("sim device table poisoned")
            .get(device_id)
            .cloned()
    }
}

#[async_trait]
impl TransportDriver for SimDriver {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn scan(&self, timeout: Duration) -> DeviceResult<Vec<DiscoveredDevice>> {
        tokio::time::sleep(self.scan_delay.min(timeout)).await;

        let devices = self.devices.lock().expect("sim device table poisoned");
        Ok(devices
            .values()
            .filter(|d| d.reachable)
            .map(|d| DiscoveredDevice {
                id: d.info.id.clone(),
                name: d.info.name.clone(),
                transport_type: self.kind.connection_type(),
                signal_quality: d.info.signal_quality,
                is_paired: d.paired,
            })
            .collect())
    }

    async fn connect(
        &self,
        device_id: &str,
        _address: Option<&str>,
    ) -> DeviceResult<Arc<dyn DeviceLink>> {
        let config = self
            .device(device_id)
            .ok_or_else(|| DeviceError::ConnectionFailed(format!("no such device: {device_id}")))?;

        if !config.reachable {
            return Err(DeviceError::ConnectionFailed(format!(
                "device {device_id} is unreachable"
            )));
        }

        debug!(device_id, transport = %self.kind, "Sim device connected");

        let (closed_tx, closed_rx) = watch::channel(false);
        self.links
            .lock()
            .expect("sim link table poisoned")
            .insert(device_id.to_string(), closed_tx.clone());

        Ok(Arc::new(SimLink {
            device_id: device_id.to_string(),
            kind: self.kind,
            devices: self.devices.clone(),
            closed_tx,
            closed_rx,
        }))
    }
}

// =============================================================================
// Simulated Link
// =============================================================================

struct SimLink {
    device_id: String,
    kind: TransportKind,
    devices: Arc<Mutex<HashMap<String, SimDeviceConfig>>>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl SimLink {
    fn config(&self) -> Option<SimDeviceConfig> {
        self.devices
            .lock()
            .expect("sim device table poisoned")
            .get(&self.device_id)
            .cloned()
    }

    async fn handle(&self, request: WireRequest) -> DeviceResult<WireResponse> {
        let config = self
            .config()
            .ok_or(DeviceError::LinkClosed)?;

        if config.silent {
            // Device never answers; the caller's timeout fires.
            std::future::pending::<()>().await;
        }

        if !config.latency.is_zero() {
            tokio::time::sleep(config.latency).await;
        }

        if *self.closed_rx.borrow() {
            return Err(DeviceError::LinkClosed);
        }

        if request.msg_type == GET_INFO {
            let data = serde_json::to_value(&config.info)?;
            return Ok(WireResponse::for_request(&request, Some(data)));
        }

        if config.fail_commands {
            return Ok(WireResponse::error_for(&request, "simulated device fault"));
        }

        let data = match request.msg_type.as_str() {
            "GET_STATUS" => serde_json::json!({
                "status": "ok",
                "batteryPercent": config.info.battery_percent,
                "uptimeSecs": config.info.uptime_secs,
            }),
            _ => serde_json::json!({ "accepted": true }),
        };

        Ok(WireResponse::for_request(&request, Some(data)))
    }
}

#[async_trait]
impl DeviceLink for SimLink {
    async fn request(&self, request: WireRequest, timeout: Duration) -> DeviceResult<WireResponse> {
        match tokio::time::timeout(timeout, self.handle(request)).await {
            Ok(result) => result,
            Err(_) => Err(DeviceError::CommandTimeout {
                device_id: self.device_id.clone(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn close(&self) {
        let _ = self.closed_tx.send(true);
    }

    fn transport(&self) -> TransportKind {
        self.kind
    }

    fn remote_address(&self) -> Option<String> {
        None
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use biolink_core::CommandKind;

    #[tokio::test]
    async fn test_scan_lists_reachable_devices() {
        let driver = SimDriver::new(TransportKind::Radio);
        driver.add_device(SimDeviceConfig::new("dev-a", "Analyzer A"));
        driver.add_device(SimDeviceConfig::new("dev-b", "Analyzer B").unreachable());

        let found = driver.scan(Duration::from_millis(100)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "dev-a");
    }

    #[tokio::test]
    async fn test_info_handshake_and_command() {
        let driver = SimDriver::new(TransportKind::Lan);
        driver.add_device(SimDeviceConfig::new("dev-a", "Analyzer A").with_battery(64));

        let link = driver.connect("dev-a", None).await.unwrap();

        let response = link
            .request(WireRequest::get_info(), Duration::from_secs(1))
            .await
            .unwrap();
        let info = DeviceInfo::from_response(&response).unwrap();
        assert_eq!(info.battery_percent, Some(64));

        let response = link
            .request(
                WireRequest::from_command(&CommandKind::GetStatus),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(response.msg_type, "GET_STATUS_RESPONSE");
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let driver = SimDriver::new(TransportKind::Radio);
        driver.add_device(SimDeviceConfig::new("dev-a", "Analyzer A").silent());

        let link = driver.connect("dev-a", None).await.unwrap();
        let err = link
            .request(
                WireRequest::from_command(&CommandKind::GetStatus),
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::CommandTimeout { .. }));
    }

    #[tokio::test]
    async fn test_drop_link_resolves_closed() {
        let driver = SimDriver::new(TransportKind::Radio);
        driver.add_device(SimDeviceConfig::new("dev-a", "Analyzer A"));

        let link = driver.connect("dev-a", None).await.unwrap();
        let watcher = {
            let link = link.clone();
            tokio::spawn(async move { link.closed().await })
        };

        driver.drop_link("dev-a");
        tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .expect("closed() did not resolve")
            .unwrap();
    }
}
