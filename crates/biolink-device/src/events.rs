//! # Device Events
//!
//! Typed event values published by the coordinator and health monitor.
//!
//! Delivery is best-effort over a broadcast channel: subscribers that fall
//! behind lose the oldest events, and events published with no subscribers
//! are dropped. Ordering is only guaranteed per publisher; no ordering is
//! implied across distinct event types.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::trace;

use biolink_core::{DiscoveredDevice, NetworkMode};

use crate::transport::TransportKind;

/// Default buffered events per subscriber.
const DEFAULT_CAPACITY: usize = 64;

/// Everything the device layer announces to the rest of the system.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A scan saw a device.
    DeviceDiscovered { device: DiscoveredDevice },

    /// A session was established and the info handshake completed.
    DeviceConnected {
        device_id: String,
        transport: TransportKind,
    },

    /// A session ended, expectedly or not.
    DeviceDisconnected { device_id: String },

    /// The health monitor demoted a silent device. Emitted once per
    /// offline transition, not repeatedly while the device stays silent.
    DeviceOffline { device_id: String },

    /// A device's resource level dropped below the low threshold.
    /// Emitted once per low-resource transition.
    DeviceLowBattery {
        device_id: String,
        battery_percent: u8,
    },

    /// A reconnect attempt was scheduled.
    ReconnectScheduled {
        device_id: String,
        attempt: u32,
        delay: Duration,
    },

    /// All reconnect attempts failed; the device stays offline until a
    /// manual reconnect.
    ReconnectAbandoned { device_id: String },

    /// The network-mode probe observed a transition.
    NetworkModeChanged { mode: NetworkMode },
}

/// Broadcast bus for device events. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeviceEventBus {
    tx: broadcast::Sender<DeviceEvent>,
}

impl DeviceEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        DeviceEventBus { tx }
    }

    /// Subscribes to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Never fails; without subscribers the event is
    /// dropped.
    pub fn emit(&self, event: DeviceEvent) {
        trace!(?event, "Device event");
        let _ = self.tx.send(event);
    }
}

impl Default for DeviceEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_receives_events() {
        let bus = DeviceEventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(DeviceEvent::DeviceDisconnected {
            device_id: "dev-a".into(),
        });

        match rx.recv().await.unwrap() {
            DeviceEvent::DeviceDisconnected { device_id } => assert_eq!(device_id, "dev-a"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = DeviceEventBus::new();
        bus.emit(DeviceEvent::DeviceOffline {
            device_id: "dev-a".into(),
        });
    }
}
