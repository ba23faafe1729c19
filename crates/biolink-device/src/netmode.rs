//! # Network Mode Detection
//!
//! Probes connectivity in preference order and publishes the result on a
//! watch channel so the sync engine can react to transitions without
//! polling.
//!
//! ## Probe Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Network Mode Probing                                 │
//! │                                                                         │
//! │  1. GET cloud probe URL            reachable? ──► Cloud                 │
//! │  2. GET local-server probe URL     reachable? ──► LocalServer           │
//! │  3. Non-loopback local interface?  present?   ──► Direct                │
//! │  4. otherwise                                 ──► Offline               │
//! │                                                                         │
//! │  Re-probed on a fixed interval and on explicit refresh() calls         │
//! │  (wired to the platform's connectivity-change signal by the host       │
//! │  application).                                                          │
//! │                                                                         │
//! │  Mode NEVER gates device operations - devices are addressed directly   │
//! │  over their transports in every mode.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use biolink_core::NetworkMode;

use crate::error::{DeviceError, DeviceResult};
use crate::events::{DeviceEvent, DeviceEventBus};

// =============================================================================
// Configuration
// =============================================================================

/// Network probe configuration.
#[derive(Debug, Clone)]
pub struct NetworkProbeConfig {
    /// Cloud health/probe URL. None disables the cloud tier.
    pub cloud_url: Option<String>,

    /// Configured local server probe URL. None disables the tier.
    pub local_url: Option<String>,

    /// Per-request probe timeout.
    pub probe_timeout: Duration,

    /// Interval between periodic re-probes.
    pub probe_interval: Duration,
}

impl Default for NetworkProbeConfig {
    fn default() -> Self {
        NetworkProbeConfig {
            cloud_url: None,
            local_url: None,
            probe_timeout: Duration::from_secs(3),
            probe_interval: Duration::from_secs(30),
        }
    }
}

impl NetworkProbeConfig {
    /// Validates configured probe URLs. Called at startup; a malformed URL
    /// is a configuration error, not a runtime condition.
    pub fn validate(&self) -> DeviceResult<()> {
        for candidate in [&self.cloud_url, &self.local_url].into_iter().flatten() {
            url::Url::parse(candidate)
                .map_err(|e| DeviceError::ConnectionFailed(format!("invalid probe URL {candidate}: {e}")))?;
        }
        Ok(())
    }
}

// =============================================================================
// Prober
// =============================================================================

/// One-shot probe logic, separated from the monitor loop for testability.
#[derive(Debug, Clone)]
pub struct NetworkProber {
    config: NetworkProbeConfig,
    client: reqwest::Client,
}

impl NetworkProber {
    pub fn new(config: NetworkProbeConfig) -> DeviceResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .map_err(|e| DeviceError::ConnectionFailed(e.to_string()))?;
        Ok(NetworkProber { config, client })
    }

    /// Runs the probe sequence once.
    pub async fn probe(&self) -> NetworkMode {
        if let Some(url) = &self.config.cloud_url {
            if self.reachable(url).await {
                return NetworkMode::Cloud;
            }
        }

        if let Some(url) = &self.config.local_url {
            if self.reachable(url).await {
                return NetworkMode::LocalServer;
            }
        }

        if has_local_interface() {
            NetworkMode::Direct
        } else {
            NetworkMode::Offline
        }
    }

    /// A target counts as reachable when it answers at all with a non-5xx
    /// status; the probe asks "is there a server", not "is it healthy".
    async fn reachable(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                debug!(url, ?e, "Probe target unreachable");
                false
            }
        }
    }
}

/// Detects a usable non-loopback interface without sending traffic: a UDP
/// "connect" only selects a route.
fn has_local_interface() -> bool {
    let Ok(socket) = std::net::UdpSocket::bind("0.0.0.0:0") else {
        return false;
    };
    if socket.connect("10.254.254.254:1").is_err() {
        return false;
    }
    match socket.local_addr() {
        Ok(addr) => !addr.ip().is_loopback() && !addr.ip().is_unspecified(),
        Err(_) => false,
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Handle for the background network monitor.
#[derive(Debug, Clone)]
pub struct NetworkMonitorHandle {
    mode_rx: watch::Receiver<NetworkMode>,
    refresh_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl NetworkMonitorHandle {
    /// Current mode.
    pub fn mode(&self) -> NetworkMode {
        *self.mode_rx.borrow()
    }

    /// Watch channel for mode transitions.
    pub fn watch(&self) -> watch::Receiver<NetworkMode> {
        self.mode_rx.clone()
    }

    /// Requests an immediate re-probe. Wired to connectivity-change
    /// signals by the host application.
    pub async fn refresh(&self) {
        let _ = self.refresh_tx.send(()).await;
    }

    /// Stops the monitor task.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Background task re-probing connectivity and publishing transitions.
pub struct NetworkMonitor;

impl NetworkMonitor {
    /// Probes once for the initial mode, then spawns the monitor loop.
    pub async fn spawn(
        config: NetworkProbeConfig,
        events: DeviceEventBus,
    ) -> DeviceResult<NetworkMonitorHandle> {
        let prober = NetworkProber::new(config.clone())?;

        let initial = prober.probe().await;
        info!(mode = %initial, "Initial network mode");

        let (mode_tx, mode_rx) = watch::channel(initial);
        let (refresh_tx, mut refresh_rx) = mpsc::channel(8);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.probe_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; the initial probe already ran.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    Some(()) = refresh_rx.recv() => {
                        debug!("Explicit network re-probe requested");
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Network monitor shutting down");
                        break;
                    }
                }

                let mode = prober.probe().await;
                let previous = *mode_tx.borrow();
                if mode != previous {
                    info!(from = %previous, to = %mode, "Network mode changed");
                    if mode_tx.send(mode).is_err() {
                        warn!("All network mode watchers dropped");
                        break;
                    }
                    events.emit(DeviceEvent::NetworkModeChanged { mode });
                }
            }
        });

        Ok(NetworkMonitorHandle {
            mode_rx,
            refresh_tx,
            shutdown_tx,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = NetworkProbeConfig {
            cloud_url: Some("https://api.example.com/health".into()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = NetworkProbeConfig {
            cloud_url: Some("not a url".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_probe_with_no_targets_is_direct_or_offline() {
        let prober = NetworkProber::new(NetworkProbeConfig::default()).unwrap();
        let mode = prober.probe().await;
        assert!(matches!(mode, NetworkMode::Direct | NetworkMode::Offline));
    }

    #[tokio::test]
    async fn test_unreachable_targets_fall_through() {
        // Port 9 on loopback is about as dead as it gets.
        let prober = NetworkProber::new(NetworkProbeConfig {
            cloud_url: Some("http://127.0.0.1:9/health".into()),
            local_url: Some("http://127.0.0.1:9/health".into()),
            probe_timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();

        let mode = prober.probe().await;
        assert!(matches!(mode, NetworkMode::Direct | NetworkMode::Offline));
    }
}
