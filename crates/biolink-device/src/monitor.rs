//! # Health Monitor
//!
//! Periodic liveness sweep over the device registry.
//!
//! ## Sweep Logic
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Health Sweep (every interval, default 5s)            │
//! │                                                                         │
//! │  For every registry entry:                                             │
//! │                                                                         │
//! │  1. SILENCE CHECK                                                      │
//! │     now − last_seen > 3 × interval?                                    │
//! │       ──► status = offline, emit DeviceOffline (once per transition,   │
//! │           no repeat while the device stays silent), recycle the        │
//! │           session so the coordinator's reconnect path runs             │
//! │                                                                         │
//! │  2. RESOURCE CHECK                                                     │
//! │     battery ≤ threshold and not already flagged?                       │
//! │       ──► status = low_resource, emit DeviceLowBattery (once)          │
//! │                                                                         │
//! │  Then, as an ACTIVE liveness check:                                    │
//! │                                                                         │
//! │  3. STATUS PROBE to every connected device                             │
//! │     success ──► refresh last_seen + battery in the registry            │
//! │     failure ──► swallowed; the next silence check handles it           │
//! │                                                                         │
//! │  The sweep itself never fails - heartbeat machinery must not throw.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use biolink_core::{CommandKind, DeviceStatus};

use crate::coordinator::ConnectionCoordinator;
use crate::events::{DeviceEvent, DeviceEventBus};
use crate::registry::DeviceRegistry;
use crate::wire::WireRequest;

// =============================================================================
// Configuration
// =============================================================================

/// Health monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sweep interval. A device silent for 3× this is demoted to offline.
    pub interval: Duration,

    /// Battery percentage at or below which a device is flagged.
    pub low_battery_threshold: u8,

    /// Timeout for the post-sweep status probes.
    pub probe_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            interval: Duration::from_secs(5),
            low_battery_threshold: 20,
            probe_timeout: Duration::from_secs(2),
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for a running health monitor.
pub struct HealthMonitorHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl HealthMonitorHandle {
    /// Stops the sweep loop.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Health Monitor
// =============================================================================

/// Periodic heartbeat/liveness sweep.
pub struct HealthMonitor {
    registry: DeviceRegistry,
    coordinator: Arc<ConnectionCoordinator>,
    events: DeviceEventBus,
    config: MonitorConfig,
}

impl HealthMonitor {
    pub fn new(
        registry: DeviceRegistry,
        coordinator: Arc<ConnectionCoordinator>,
        events: DeviceEventBus,
        config: MonitorConfig,
    ) -> Self {
        HealthMonitor {
            registry,
            coordinator,
            events,
            config,
        }
    }

    /// Spawns the sweep loop and returns its handle.
    pub fn spawn(self) -> HealthMonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            info!(interval = ?self.config.interval, "Health monitor starting");
            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sweep_at(Utc::now()).await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Health monitor shutting down");
                        break;
                    }
                }
            }
        });

        HealthMonitorHandle { shutdown_tx }
    }

    /// One sweep, with an injectable clock for tests. Never fails.
    pub async fn sweep_at(&self, now: DateTime<Utc>) {
        let silence_limit = chrono::Duration::from_std(self.config.interval * 3)
            .unwrap_or_else(|_| chrono::Duration::seconds(15));

        for record in self.registry.all().await {
            // Silence check: only devices currently counted online can
            // transition, which is what makes the offline notification
            // fire exactly once per silence.
            if record.status.counts_as_online() && now - record.last_seen > silence_limit {
                warn!(
                    device_id = %record.id,
                    last_seen = %record.last_seen,
                    "Device silent past threshold, marking offline"
                );
                self.registry
                    .update(&record.id, |r| r.status = DeviceStatus::Offline)
                    .await;
                self.events.emit(DeviceEvent::DeviceOffline {
                    device_id: record.id.clone(),
                });
                // Sever the stale session; the coordinator's session-loss
                // path schedules the reconnect attempts.
                self.coordinator.recycle_session(&record.id).await;
                continue;
            }

            // Resource check, once per low-battery transition.
            if record.status.counts_as_online()
                && record.status != DeviceStatus::LowResource
                && record.battery_below(self.config.low_battery_threshold)
            {
                let level = record.battery_percent.unwrap_or(0);
                warn!(device_id = %record.id, battery = level, "Device battery low");
                self.registry
                    .update(&record.id, |r| r.status = DeviceStatus::LowResource)
                    .await;
                self.events.emit(DeviceEvent::DeviceLowBattery {
                    device_id: record.id.clone(),
                    battery_percent: level,
                });
            }
        }

        self.probe_connected(now).await;
    }

    /// Lightweight status probe of every connected device. Failures are
    /// swallowed; a dead session shows up as silence next sweep.
    async fn probe_connected(&self, now: DateTime<Utc>) {
        for device_id in self.coordinator.connected_ids().await {
            let Some(link) = self.coordinator.link_for(&device_id).await else {
                continue;
            };

            let request = WireRequest::from_command(&CommandKind::GetStatus);
            match link.request(request, self.config.probe_timeout).await {
                Ok(response) if !response.is_error() => {
                    let battery = response
                        .data
                        .as_ref()
                        .and_then(|d| d.get("batteryPercent"))
                        .and_then(|b| b.as_u64())
                        .map(|b| b.min(100) as u8);

                    self.registry
                        .update(&device_id, |r| {
                            r.touch(now);
                            if battery.is_some() {
                                r.battery_percent = battery;
                            }
                        })
                        .await;
                }
                Ok(_) | Err(_) => {
                    debug!(device_id, "Status probe failed");
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::transport::sim::{SimDeviceConfig, SimDriver};
    use crate::transport::TransportKind;
    use biolink_core::DeviceRecord;

    fn fixture() -> (HealthMonitor, DeviceRegistry, DeviceEventBus) {
        let registry = DeviceRegistry::new();
        let events = DeviceEventBus::new();
        let coordinator = ConnectionCoordinator::new(
            registry.clone(),
            events.clone(),
            CoordinatorConfig::default(),
        );
        let monitor = HealthMonitor::new(
            registry.clone(),
            coordinator,
            events.clone(),
            MonitorConfig {
                interval: Duration::from_secs(5),
                low_battery_threshold: 20,
                probe_timeout: Duration::from_millis(100),
            },
        );
        (monitor, registry, events)
    }

    fn online_record(id: &str, last_seen: DateTime<Utc>) -> DeviceRecord {
        let mut record = DeviceRecord::placeholder(id, last_seen);
        record.status = DeviceStatus::Online;
        record
    }

    #[tokio::test]
    async fn test_silent_device_goes_offline_exactly_once() {
        let (monitor, registry, events) = fixture();
        let mut rx = events.subscribe();

        let now = Utc::now();
        let long_ago = now - chrono::Duration::seconds(60);
        registry.upsert(online_record("quiet", long_ago)).await;

        monitor.sweep_at(now).await;
        assert_eq!(
            registry.get("quiet").await.unwrap().status,
            DeviceStatus::Offline
        );

        // Sweeps while still silent do not re-notify.
        monitor.sweep_at(now + chrono::Duration::seconds(5)).await;
        monitor.sweep_at(now + chrono::Duration::seconds(10)).await;

        let mut offline_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, DeviceEvent::DeviceOffline { ref device_id } if device_id == "quiet")
            {
                offline_events += 1;
            }
        }
        assert_eq!(offline_events, 1);
    }

    #[tokio::test]
    async fn test_recent_device_stays_online() {
        let (monitor, registry, _) = fixture();

        let now = Utc::now();
        registry
            .upsert(online_record("chatty", now - chrono::Duration::seconds(5)))
            .await;

        monitor.sweep_at(now).await;
        assert_eq!(
            registry.get("chatty").await.unwrap().status,
            DeviceStatus::Online
        );
    }

    #[tokio::test]
    async fn test_low_battery_flagged_once() {
        let (monitor, registry, events) = fixture();
        let mut rx = events.subscribe();

        let now = Utc::now();
        let mut record = online_record("tired", now);
        record.battery_percent = Some(12);
        registry.upsert(record).await;

        monitor.sweep_at(now).await;
        assert_eq!(
            registry.get("tired").await.unwrap().status,
            DeviceStatus::LowResource
        );

        monitor.sweep_at(now + chrono::Duration::seconds(5)).await;

        let mut low_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, DeviceEvent::DeviceLowBattery { ref device_id, .. } if device_id == "tired")
            {
                low_events += 1;
            }
        }
        assert_eq!(low_events, 1);
    }

    #[tokio::test]
    async fn test_probe_refreshes_last_seen_and_battery() {
        let registry = DeviceRegistry::new();
        let events = DeviceEventBus::new();
        let coordinator = ConnectionCoordinator::new(
            registry.clone(),
            events.clone(),
            CoordinatorConfig::default(),
        );
        let driver = Arc::new(SimDriver::new(TransportKind::Radio));
        driver.add_device(SimDeviceConfig::new("dev-a", "Analyzer A").with_battery(47));
        coordinator.register_driver(driver);
        coordinator
            .connect("dev-a", TransportKind::Radio, None)
            .await
            .unwrap();

        let monitor = HealthMonitor::new(
            registry.clone(),
            coordinator,
            events,
            MonitorConfig::default(),
        );

        // Inside the silence window, so the probe is what refreshes state.
        let later = Utc::now() + chrono::Duration::seconds(10);
        monitor.sweep_at(later).await;

        let record = registry.get("dev-a").await.unwrap();
        assert_eq!(record.last_seen, later);
        assert_eq!(record.battery_percent, Some(47));
        // Probe happens even though nothing was wrong; it must not throw.
        assert_eq!(record.status, DeviceStatus::Online);
    }
}
