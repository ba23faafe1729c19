//! # Connection Coordinator
//!
//! Owns the scan → connect → info-handshake → monitor → reconnect lifecycle
//! for every device session, and enforces the per-transport admission
//! limits.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Connection Lifecycle                                 │
//! │                                                                         │
//! │  connect(id, transport)                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────────┐  slot reserved under the session-table lock BEFORE   │
//! │  │ RESERVE SLOT │  any I/O, so two racing connects can never both      │
//! │  └──────┬───────┘  take the last radio slot                            │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐                │
//! │  │ driver       │──►│ GET_INFO     │──►│ session      │                │
//! │  │ connect()    │   │ handshake    │   │ ACTIVE       │                │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘                │
//! │         │ failure          │ failure          │ link.closed()          │
//! │         ▼                  ▼                  ▼                         │
//! │  slot released      slot released      ┌──────────────┐                │
//! │  device offline     device offline     │ RECONNECT    │                │
//! │                                        │ up to N tries│                │
//! │                                        │ delay=base×n │                │
//! │                                        └──────┬───────┘                │
//! │                                               │ all failed             │
//! │                                               ▼                        │
//! │                                        offline until manual            │
//! │                                        reconnect                       │
//! │                                                                         │
//! │  RADIO CEILING: default 7 concurrent sessions. The ceiling reflects    │
//! │  real radio-stack limits; the error directs callers to a LAN           │
//! │  transport for additional devices.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use biolink_core::{
    validation, ConnectionType, DeviceRecord, DeviceStatus, DiscoveredDevice, NetworkMode,
};

use crate::error::{DeviceError, DeviceResult};
use crate::events::{DeviceEvent, DeviceEventBus};
use crate::netmode::NetworkMonitorHandle;
use crate::registry::DeviceRegistry;
use crate::transport::{DeviceLink, TransportDriver, TransportKind};
use crate::wire::{DeviceInfo, WireRequest};

// =============================================================================
// Configuration
// =============================================================================

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Hard ceiling on simultaneous radio sessions.
    pub max_radio_sessions: usize,

    /// Reconnect attempts after an unexpected session loss.
    pub reconnect_attempts: u32,

    /// Reconnect delay grows linearly: `base × attempt_number`.
    pub reconnect_base_delay: Duration,

    /// Timeout for the post-connect GET_INFO exchange.
    pub handshake_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            max_radio_sessions: 7,
            reconnect_attempts: 3,
            reconnect_base_delay: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Session Table
// =============================================================================

/// An established session.
#[derive(Clone)]
struct ActiveSession {
    link: Arc<dyn DeviceLink>,
    transport: TransportKind,
}

/// A slot in the session table. Reservations count against transport
/// ceilings exactly like active sessions, which is what makes the
/// check-and-reserve atomic.
enum SessionSlot {
    Reserved { transport: TransportKind },
    Active(ActiveSession),
}

impl SessionSlot {
    fn transport(&self) -> TransportKind {
        match self {
            SessionSlot::Reserved { transport } => *transport,
            SessionSlot::Active(session) => session.transport,
        }
    }
}

// =============================================================================
// Scan Guard
// =============================================================================

/// Releases the per-transport scan flag on drop, so an early return or a
/// scan error can never leave the transport permanently "scanning".
struct ScanGuard<'a> {
    scans: &'a StdMutex<HashSet<TransportKind>>,
    transport: TransportKind,
}

impl<'a> ScanGuard<'a> {
    fn acquire(
        scans: &'a StdMutex<HashSet<TransportKind>>,
        transport: TransportKind,
    ) -> DeviceResult<Self> {
        let mut active = scans.lock().expect("scan set poisoned");
        if !active.insert(transport) {
            return Err(DeviceError::ScanInProgress { transport });
        }
        Ok(ScanGuard { scans, transport })
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.scans
            .lock()
            .expect("scan set poisoned")
            .remove(&self.transport);
    }
}

// =============================================================================
// Connection Coordinator
// =============================================================================

/// Coordinates all device sessions. One instance per process by convention;
/// construct with [`ConnectionCoordinator::new`] and share via `Arc`.
pub struct ConnectionCoordinator {
    config: CoordinatorConfig,
    registry: DeviceRegistry,
    events: DeviceEventBus,

    /// Registered transport drivers.
    drivers: StdRwLock<HashMap<TransportKind, Arc<dyn TransportDriver>>>,

    /// Session table: one slot per device id.
    sessions: Mutex<HashMap<String, SessionSlot>>,

    /// Transports with a scan currently running.
    scans: StdMutex<HashSet<TransportKind>>,

    /// Pending reconnect tasks, aborted on explicit disconnect.
    reconnects: StdMutex<HashMap<String, JoinHandle<()>>>,

    /// Network-mode monitor, when attached.
    network: StdMutex<Option<NetworkMonitorHandle>>,
}

impl ConnectionCoordinator {
    pub fn new(
        registry: DeviceRegistry,
        events: DeviceEventBus,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        Arc::new(ConnectionCoordinator {
            config,
            registry,
            events,
            drivers: StdRwLock::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            scans: StdMutex::new(HashSet::new()),
            reconnects: StdMutex::new(HashMap::new()),
            network: StdMutex::new(None),
        })
    }

    /// Registers a transport driver. Later registrations replace earlier
    /// ones for the same transport.
    pub fn register_driver(&self, driver: Arc<dyn TransportDriver>) {
        let kind = driver.kind();
        info!(transport = %kind, "Transport driver registered");
        self.drivers
            .write()
            .expect("driver table poisoned")
            .insert(kind, driver);
    }

    /// Attaches the network-mode monitor.
    pub fn attach_network(&self, handle: NetworkMonitorHandle) {
        *self.network.lock().expect("network handle poisoned") = Some(handle);
    }

    /// Current network mode; Offline when no monitor is attached. Device
    /// operations never consult this - devices are addressed directly.
    pub fn network_mode(&self) -> NetworkMode {
        self.network
            .lock()
            .expect("network handle poisoned")
            .as_ref()
            .map(|h| h.mode())
            .unwrap_or(NetworkMode::Offline)
    }

    fn driver(&self, transport: TransportKind) -> DeviceResult<Arc<dyn TransportDriver>> {
        self.drivers
            .read()
            .expect("driver table poisoned")
            .get(&transport)
            .cloned()
            .ok_or(DeviceError::TransportUnavailable { transport })
    }

    // =========================================================================
    // Scan
    // =========================================================================

    /// Scans one transport for reachable devices.
    ///
    /// Only one scan per transport runs at a time; a second call fails with
    /// `ScanInProgress`. Already-connected devices are filtered out - the
    /// result is discovered-but-unconnected devices only.
    pub async fn scan(
        &self,
        transport: TransportKind,
        timeout: Duration,
    ) -> DeviceResult<Vec<DiscoveredDevice>> {
        let driver = self.driver(transport)?;
        let _guard = ScanGuard::acquire(&self.scans, transport)?;

        debug!(transport = %transport, ?timeout, "Scan starting");
        let found = driver.scan(timeout).await?;

        let connected: HashSet<String> = {
            let sessions = self.sessions.lock().await;
            sessions.keys().cloned().collect()
        };

        let unconnected: Vec<DiscoveredDevice> = found
            .into_iter()
            .filter(|d| !connected.contains(&d.id))
            .collect();

        for device in &unconnected {
            self.events.emit(DeviceEvent::DeviceDiscovered {
                device: device.clone(),
            });
        }

        info!(transport = %transport, count = unconnected.len(), "Scan complete");
        Ok(unconnected)
    }

    // =========================================================================
    // Connect
    // =========================================================================

    /// Connects to a device and runs the info handshake.
    ///
    /// Returns the populated registry record. Connecting to an
    /// already-connected device is a no-op returning its current record.
    pub async fn connect(
        self: &Arc<Self>,
        device_id: &str,
        transport: TransportKind,
        address: Option<String>,
    ) -> DeviceResult<DeviceRecord> {
        validation::validate_device_id(device_id)?;
        let driver = self.driver(transport)?;

        // ---- Admission: reserve a slot before any I/O -----------------------
        {
            let mut sessions = self.sessions.lock().await;

            match sessions.get(device_id) {
                Some(SessionSlot::Active(_)) => {
                    debug!(device_id, "Already connected");
                    return self
                        .registry
                        .get(device_id)
                        .await
                        .ok_or_else(|| DeviceError::DeviceNotFound {
                            device_id: device_id.to_string(),
                        });
                }
                Some(SessionSlot::Reserved { .. }) => {
                    return Err(DeviceError::ConnectionFailed(format!(
                        "connect already in progress for {device_id}"
                    )));
                }
                None => {}
            }

            if transport == TransportKind::Radio {
                let radio_sessions = sessions
                    .values()
                    .filter(|s| s.transport() == TransportKind::Radio)
                    .count();
                if radio_sessions >= self.config.max_radio_sessions {
                    return Err(DeviceError::ConnectionLimitExceeded {
                        limit: self.config.max_radio_sessions,
                    });
                }
            }

            sessions.insert(
                device_id.to_string(),
                SessionSlot::Reserved { transport },
            );
        }

        // Registry shows the attempt while the handshake runs.
        let now = Utc::now();
        if self.registry.get(device_id).await.is_some() {
            self.registry
                .update(device_id, |r| r.status = DeviceStatus::Connecting)
                .await;
        } else {
            self.registry
                .upsert(DeviceRecord::placeholder(device_id, now))
                .await;
        }

        // ---- Transport connect + handshake (no locks held) ------------------
        let link = match driver.connect(device_id, address.as_deref()).await {
            Ok(link) => link,
            Err(e) => {
                self.release_failed_connect(device_id).await;
                return Err(e);
            }
        };

        let info = match link
            .request(WireRequest::get_info(), self.config.handshake_timeout)
            .await
            .and_then(|response| DeviceInfo::from_response(&response))
        {
            Ok(info) => info,
            Err(e) => {
                link.close().await;
                self.release_failed_connect(device_id).await;
                return Err(DeviceError::HandshakeFailed(e.to_string()));
            }
        };

        if info.id != device_id {
            warn!(
                device_id,
                announced = %info.id,
                "Device announced a different id; keeping the requested id"
            );
        }

        let mut record = info.into_record(
            transport.connection_type(),
            link.remote_address().or(address.clone()),
            Utc::now(),
        );
        record.id = device_id.to_string();

        // ---- Activate the slot ----------------------------------------------
        {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(
                device_id.to_string(),
                SessionSlot::Active(ActiveSession {
                    link: link.clone(),
                    transport,
                }),
            );
        }

        self.registry.upsert(record.clone()).await;
        self.spawn_session_watcher(device_id.to_string(), link, transport, address);

        self.events.emit(DeviceEvent::DeviceConnected {
            device_id: device_id.to_string(),
            transport,
        });
        info!(device_id, transport = %transport, "Device connected");

        Ok(record)
    }

    /// Releases a reservation after a failed connect and marks the device
    /// offline.
    async fn release_failed_connect(&self, device_id: &str) {
        self.sessions.lock().await.remove(device_id);
        self.registry
            .update(device_id, |r| {
                r.status = DeviceStatus::Offline;
                r.connection_type = ConnectionType::Disconnected;
                r.signal_quality = 0;
            })
            .await;
    }

    /// Watches a link and drives the disconnect-callback path when the
    /// session is lost.
    fn spawn_session_watcher(
        self: &Arc<Self>,
        device_id: String,
        link: Arc<dyn DeviceLink>,
        transport: TransportKind,
        address: Option<String>,
    ) {
        let coordinator = Arc::downgrade(self);
        tokio::spawn(async move {
            link.closed().await;
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator
                    .handle_session_loss(&device_id, &link, transport, address)
                    .await;
            }
        });
    }

    /// Reacts to an observed session loss. A loss caused by an explicit
    /// disconnect (slot already removed, or superseded by a newer session)
    /// is ignored; an unexpected loss marks the device offline and
    /// schedules reconnects.
    async fn handle_session_loss(
        self: &Arc<Self>,
        device_id: &str,
        link: &Arc<dyn DeviceLink>,
        transport: TransportKind,
        address: Option<String>,
    ) {
        {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(device_id) {
                Some(SessionSlot::Active(session)) if Arc::ptr_eq(&session.link, link) => {
                    sessions.remove(device_id);
                }
                _ => return,
            }
        }

        warn!(device_id, "Session lost unexpectedly");
        self.registry
            .update(device_id, |r| {
                r.status = DeviceStatus::Offline;
                r.connection_type = ConnectionType::Disconnected;
                r.signal_quality = 0;
            })
            .await;
        self.events.emit(DeviceEvent::DeviceDisconnected {
            device_id: device_id.to_string(),
        });

        self.schedule_reconnect(device_id.to_string(), transport, address);
    }

    /// Schedules up to `reconnect_attempts` reconnects with linearly
    /// increasing delay, then abandons the device offline.
    fn schedule_reconnect(
        self: &Arc<Self>,
        device_id: String,
        transport: TransportKind,
        address: Option<String>,
    ) {
        let coordinator = Arc::downgrade(self);
        let events = self.events.clone();
        let attempts = self.config.reconnect_attempts;
        let base_delay = self.config.reconnect_base_delay;
        let task_device_id = device_id.clone();

        let handle = tokio::spawn(async move {
            for attempt in 1..=attempts {
                let delay = base_delay * attempt;
                events.emit(DeviceEvent::ReconnectScheduled {
                    device_id: task_device_id.clone(),
                    attempt,
                    delay,
                });
                tokio::time::sleep(delay).await;

                let Some(coordinator) = coordinator.upgrade() else {
                    return;
                };

                match coordinator
                    .connect(&task_device_id, transport, address.clone())
                    .await
                {
                    Ok(_) => {
                        info!(device_id = %task_device_id, attempt, "Reconnected");
                        return;
                    }
                    Err(e) => {
                        warn!(device_id = %task_device_id, attempt, ?e, "Reconnect attempt failed");
                    }
                }
            }

            warn!(device_id = %task_device_id, "Reconnects exhausted, leaving device offline");
            events.emit(DeviceEvent::ReconnectAbandoned {
                device_id: task_device_id,
            });
        });

        let mut reconnects = self.reconnects.lock().expect("reconnect table poisoned");
        if let Some(previous) = reconnects.insert(device_id, handle) {
            previous.abort();
        }
    }

    // =========================================================================
    // Disconnect
    // =========================================================================

    /// Best-effort teardown of a device's session. Always cancels any
    /// reconnect scheduling for the device.
    pub async fn disconnect(&self, device_id: &str) -> DeviceResult<()> {
        if let Some(task) = self
            .reconnects
            .lock()
            .expect("reconnect table poisoned")
            .remove(device_id)
        {
            task.abort();
        }

        let slot = self.sessions.lock().await.remove(device_id);
        let had_session = slot.is_some();

        if let Some(SessionSlot::Active(session)) = slot {
            session.link.close().await;
        }

        self.registry
            .update(device_id, |r| {
                r.status = DeviceStatus::Offline;
                r.connection_type = ConnectionType::Disconnected;
                r.signal_quality = 0;
            })
            .await;

        if had_session {
            self.events.emit(DeviceEvent::DeviceDisconnected {
                device_id: device_id.to_string(),
            });
            info!(device_id, "Disconnected");
        }

        Ok(())
    }

    /// Tears down every session and pending reconnect.
    pub async fn disconnect_all(&self) -> DeviceResult<()> {
        let ids: Vec<String> = {
            let sessions = self.sessions.lock().await;
            let mut ids: HashSet<String> = sessions.keys().cloned().collect();
            ids.extend(
                self.reconnects
                    .lock()
                    .expect("reconnect table poisoned")
                    .keys()
                    .cloned(),
            );
            ids.into_iter().collect()
        };

        for id in ids {
            self.disconnect(&id).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Session Access
    // =========================================================================

    /// The active link for a device, for the command dispatcher.
    pub async fn link_for(&self, device_id: &str) -> Option<Arc<dyn DeviceLink>> {
        match self.sessions.lock().await.get(device_id) {
            Some(SessionSlot::Active(session)) => Some(session.link.clone()),
            _ => None,
        }
    }

    /// Ids of all devices with an active session.
    pub async fn connected_ids(&self) -> Vec<String> {
        self.sessions
            .lock()
            .await
            .iter()
            .filter_map(|(id, slot)| match slot {
                SessionSlot::Active(_) => Some(id.clone()),
                SessionSlot::Reserved { .. } => None,
            })
            .collect()
    }

    /// Number of sessions (active + reserved) on a transport.
    pub async fn session_count(&self, transport: TransportKind) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|s| s.transport() == transport)
            .count()
    }

    /// Severs an active session without cancelling reconnects, so the
    /// normal session-loss path re-establishes it. Used by the health
    /// monitor on devices that have gone silent.
    pub async fn recycle_session(&self, device_id: &str) {
        if let Some(link) = self.link_for(device_id).await {
            debug!(device_id, "Recycling silent session");
            link.close().await;
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::sim::{SimDeviceConfig, SimDriver};

    fn radio_fixture(max_radio: usize) -> (Arc<ConnectionCoordinator>, Arc<SimDriver>) {
        let driver = Arc::new(SimDriver::new(TransportKind::Radio));
        let coordinator = ConnectionCoordinator::new(
            DeviceRegistry::new(),
            DeviceEventBus::new(),
            CoordinatorConfig {
                max_radio_sessions: max_radio,
                reconnect_attempts: 3,
                reconnect_base_delay: Duration::from_millis(10),
                handshake_timeout: Duration::from_secs(1),
            },
        );
        coordinator.register_driver(driver.clone());
        (coordinator, driver)
    }

    #[tokio::test]
    async fn test_connect_populates_registry() {
        let (coordinator, driver) = radio_fixture(7);
        driver.add_device(SimDeviceConfig::new("dev-a", "Analyzer A").with_battery(73));

        let record = coordinator
            .connect("dev-a", TransportKind::Radio, None)
            .await
            .unwrap();

        assert_eq!(record.status, DeviceStatus::Online);
        assert_eq!(record.connection_type, ConnectionType::Radio);
        assert_eq!(record.battery_percent, Some(73));
        assert_eq!(coordinator.session_count(TransportKind::Radio).await, 1);
    }

    #[tokio::test]
    async fn test_radio_ceiling_scenario() {
        let (coordinator, driver) = radio_fixture(2);
        for id in ["a", "b", "c"] {
            driver.add_device(SimDeviceConfig::new(id, id));
        }

        coordinator.connect("a", TransportKind::Radio, None).await.unwrap();
        coordinator.connect("b", TransportKind::Radio, None).await.unwrap();

        let err = coordinator
            .connect("c", TransportKind::Radio, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::ConnectionLimitExceeded { limit: 2 }
        ));
        // The failed admission disturbed nobody.
        assert_eq!(coordinator.session_count(TransportKind::Radio).await, 2);

        coordinator.disconnect("a").await.unwrap();
        coordinator.connect("c", TransportKind::Radio, None).await.unwrap();
        assert_eq!(coordinator.session_count(TransportKind::Radio).await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_connects_cannot_oversubscribe() {
        let (coordinator, driver) = radio_fixture(1);
        driver.add_device(
            SimDeviceConfig::new("a", "a").with_latency(Duration::from_millis(50)),
        );
        driver.add_device(
            SimDeviceConfig::new("b", "b").with_latency(Duration::from_millis(50)),
        );

        let c1 = coordinator.clone();
        let c2 = coordinator.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { c1.connect("a", TransportKind::Radio, None).await }),
            tokio::spawn(async move { c2.connect("b", TransportKind::Radio, None).await }),
        );

        let results = [r1.unwrap(), r2.unwrap()];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let limited = results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Err(DeviceError::ConnectionLimitExceeded { .. })
                )
            })
            .count();

        assert_eq!(ok, 1);
        assert_eq!(limited, 1);
        assert_eq!(coordinator.session_count(TransportKind::Radio).await, 1);
    }

    #[tokio::test]
    async fn test_failed_connect_releases_slot() {
        let (coordinator, driver) = radio_fixture(1);
        driver.add_device(SimDeviceConfig::new("ghost", "ghost").unreachable());
        driver.add_device(SimDeviceConfig::new("real", "real"));

        assert!(coordinator
            .connect("ghost", TransportKind::Radio, None)
            .await
            .is_err());
        assert_eq!(coordinator.session_count(TransportKind::Radio).await, 0);

        // The released slot is usable.
        coordinator
            .connect("real", TransportKind::Radio, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_scan_single_flight_per_transport() {
        let (coordinator, driver) = radio_fixture(7);
        driver.add_device(SimDeviceConfig::new("dev-a", "Analyzer A"));

        let slow = Arc::new(
            SimDriver::new(TransportKind::Lan).with_scan_delay(Duration::from_millis(200)),
        );
        coordinator.register_driver(slow.clone());

        let c = coordinator.clone();
        let first = tokio::spawn(async move {
            c.scan(TransportKind::Lan, Duration::from_millis(500)).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Second LAN scan is rejected while the first runs...
        let err = coordinator
            .scan(TransportKind::Lan, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::ScanInProgress { .. }));

        // ...but a different transport scans freely.
        coordinator
            .scan(TransportKind::Radio, Duration::from_millis(100))
            .await
            .unwrap();

        first.await.unwrap().unwrap();

        // Flag released once the first scan finishes.
        coordinator
            .scan(TransportKind::Lan, Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_drop_triggers_reconnect() {
        let (coordinator, driver) = radio_fixture(7);
        driver.add_device(SimDeviceConfig::new("dev-a", "Analyzer A"));

        let mut events = coordinator.events.subscribe();

        coordinator
            .connect("dev-a", TransportKind::Radio, None)
            .await
            .unwrap();

        driver.drop_link("dev-a");

        // Disconnected + reconnect scheduled + reconnected, within a few
        // 10ms backoff steps.
        let mut saw_disconnect = false;
        let mut saw_reconnect = false;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline && !(saw_disconnect && saw_reconnect) {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(DeviceEvent::DeviceDisconnected { device_id })) if device_id == "dev-a" => {
                    saw_disconnect = true;
                }
                Ok(Ok(DeviceEvent::DeviceConnected { device_id, .. })) if device_id == "dev-a" => {
                    if saw_disconnect {
                        saw_reconnect = true;
                    }
                }
                Ok(Ok(_)) => {}
                _ => break,
            }
        }

        assert!(saw_disconnect, "session loss was not observed");
        assert!(saw_reconnect, "device did not reconnect");
        assert_eq!(
            coordinator.registry.get("dev-a").await.unwrap().status,
            DeviceStatus::Online
        );
    }

    #[tokio::test]
    async fn test_explicit_disconnect_does_not_reconnect() {
        let (coordinator, driver) = radio_fixture(7);
        driver.add_device(SimDeviceConfig::new("dev-a", "Analyzer A"));

        coordinator
            .connect("dev-a", TransportKind::Radio, None)
            .await
            .unwrap();
        coordinator.disconnect("dev-a").await.unwrap();

        // Give any (wrong) reconnect a chance to run.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(coordinator.session_count(TransportKind::Radio).await, 0);
        assert_eq!(
            coordinator.registry.get("dev-a").await.unwrap().status,
            DeviceStatus::Offline
        );
    }
}
