//! # LAN Transport Driver
//!
//! Socket driver for devices reachable over the local network or a
//! device-hosted access point. Sessions are TCP with newline-delimited JSON
//! envelopes; discovery is a UDP broadcast exchange.
//!
//! ## Discovery Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      LAN Discovery                                      │
//! │                                                                         │
//! │  ┌──────────┐      UDP broadcast [BLNK|ver|SCAN]      ┌──────────┐     │
//! │  │   host   │ ═══════════════════════════════════════►│  device  │     │
//! │  │          │      UDP unicast [BLNK|ver|ANNOUNCE]    │          │     │
//! │  │          │ ◄───────────────────────────────────────│  + JSON  │     │
//! │  └──────────┘                                         └──────────┘     │
//! │                                                                         │
//! │  Announce body (JSON): { id, name, port, signalQuality, paired }       │
//! │                                                                         │
//! │  Responses are collected until the scan deadline; duplicates from      │
//! │  multiple interfaces are collapsed by device id.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Access-point mode is the same wire protocol at a fixed well-known
//! address, so one driver serves both transports.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use biolink_core::DiscoveredDevice;

use crate::error::{DeviceError, DeviceResult};
use crate::transport::{DeviceLink, TransportDriver, TransportKind};
use crate::wire::{WireRequest, WireResponse};

// =============================================================================
// Constants
// =============================================================================

/// Default UDP discovery port.
pub const DEFAULT_DISCOVERY_PORT: u16 = 4710;

/// Discovery message magic bytes for validation.
const DISCOVERY_MAGIC: &[u8; 4] = b"BLNK";

/// Protocol version for discovery messages.
const DISCOVERY_PROTOCOL_VERSION: u8 = 1;

/// Discovery message: scan request broadcast by the host.
const MSG_SCAN_REQUEST: u8 = 1;

/// Discovery message: device announce reply.
const MSG_ANNOUNCE: u8 = 2;

// =============================================================================
// Announce Payload
// =============================================================================

/// JSON body of a device announce, following the 6-byte header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnouncePayload {
    id: String,
    name: String,
    /// TCP port the device's command channel listens on.
    port: u16,
    #[serde(default)]
    signal_quality: u8,
    #[serde(default)]
    paired: bool,
}

// =============================================================================
// Driver Configuration
// =============================================================================

/// LAN driver configuration.
#[derive(Debug, Clone)]
pub struct LanDriverConfig {
    /// UDP port devices listen for scan requests on.
    pub discovery_port: u16,

    /// Address scan requests are sent to. The default is the IPv4 broadcast
    /// address; point it at a specific device/subnet for access-point mode.
    pub scan_target: IpAddr,

    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for LanDriverConfig {
    fn default() -> Self {
        LanDriverConfig {
            discovery_port: DEFAULT_DISCOVERY_PORT,
            scan_target: IpAddr::V4(Ipv4Addr::BROADCAST),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// LAN Driver
// =============================================================================

/// TCP/UDP driver serving the Lan and AccessPoint transports.
pub struct LanDriver {
    kind: TransportKind,
    config: LanDriverConfig,
}

impl LanDriver {
    /// Creates a driver with default configuration.
    pub fn new(kind: TransportKind) -> Self {
        LanDriver {
            kind,
            config: LanDriverConfig::default(),
        }
    }

    pub fn with_config(kind: TransportKind, config: LanDriverConfig) -> Self {
        LanDriver { kind, config }
    }

    /// Builds a scan request datagram.
    fn build_scan_request() -> Vec<u8> {
        let mut msg = Vec::with_capacity(6);
        msg.extend_from_slice(DISCOVERY_MAGIC);
        msg.push(DISCOVERY_PROTOCOL_VERSION);
        msg.push(MSG_SCAN_REQUEST);
        msg
    }

    /// Parses an announce datagram into a discovered device.
    fn parse_announce(&self, data: &[u8]) -> DeviceResult<DiscoveredDevice> {
        if data.len() < 6 || &data[0..4] != DISCOVERY_MAGIC {
            return Err(DeviceError::InvalidMessage("bad discovery magic".into()));
        }
        if data[4] != DISCOVERY_PROTOCOL_VERSION {
            return Err(DeviceError::InvalidMessage(format!(
                "unsupported discovery version: {}",
                data[4]
            )));
        }
        if data[5] != MSG_ANNOUNCE {
            return Err(DeviceError::InvalidMessage(format!(
                "unexpected discovery message type: {}",
                data[5]
            )));
        }

        let payload: AnnouncePayload = serde_json::from_slice(&data[6..])
            .map_err(|e| DeviceError::InvalidMessage(e.to_string()))?;

        Ok(DiscoveredDevice {
            id: payload.id,
            name: payload.name,
            transport_type: self.kind.connection_type(),
            signal_quality: payload.signal_quality,
            is_paired: payload.paired,
        })
    }

    /// Builds an announce datagram. Used by simulated LAN devices and tests;
    /// real devices implement the same format in firmware.
    pub fn build_announce(
        id: &str,
        name: &str,
        port: u16,
        signal_quality: u8,
        paired: bool,
    ) -> Vec<u8> {
        let mut msg = Vec::with_capacity(64);
        msg.extend_from_slice(DISCOVERY_MAGIC);
        msg.push(DISCOVERY_PROTOCOL_VERSION);
        msg.push(MSG_ANNOUNCE);

        let payload = AnnouncePayload {
            id: id.to_string(),
            name: name.to_string(),
            port,
            signal_quality,
            paired,
        };
        // serialization of a plain struct cannot fail
        msg.extend_from_slice(&serde_json::to_vec(&payload).unwrap_or_default());
        msg
    }
}

#[async_trait]
impl TransportDriver for LanDriver {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn scan(&self, scan_timeout: Duration) -> DeviceResult<Vec<DiscoveredDevice>> {
        info!(transport = %self.kind, "Starting LAN discovery scan");

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| DeviceError::ConnectionFailed(format!("bind discovery socket: {e}")))?;

        socket
            .set_broadcast(true)
            .map_err(|e| DeviceError::ConnectionFailed(format!("enable broadcast: {e}")))?;

        let target = SocketAddr::new(self.config.scan_target, self.config.discovery_port);
        socket
            .send_to(&Self::build_scan_request(), target)
            .await
            .map_err(|e| DeviceError::ConnectionFailed(format!("send scan request: {e}")))?;

        debug!(?target, "Sent scan request, collecting announces");

        // Collect responses until the deadline; dedupe by device id.
        let mut found: HashMap<String, DiscoveredDevice> = HashMap::new();
        let mut buf = [0u8; 2048];
        let deadline = Instant::now() + scan_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match timeout(remaining, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, from))) => match self.parse_announce(&buf[..len]) {
                    Ok(device) => {
                        debug!(device_id = %device.id, %from, "Device announced");
                        found.insert(device.id.clone(), device);
                    }
                    Err(e) => {
                        debug!(?e, %from, "Ignoring malformed announce");
                    }
                },
                Ok(Err(e)) => {
                    warn!(?e, "Error receiving discovery response");
                }
                Err(_) => break, // deadline reached
            }
        }

        info!(count = found.len(), "LAN scan complete");
        Ok(found.into_values().collect())
    }

    async fn connect(
        &self,
        device_id: &str,
        address: Option<&str>,
    ) -> DeviceResult<Arc<dyn DeviceLink>> {
        let address = address.ok_or_else(|| {
            DeviceError::ConnectionFailed(format!(
                "address required to connect to {device_id} over {}",
                self.kind
            ))
        })?;

        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(DeviceError::ConnectionFailed(e.to_string())),
            Err(_) => {
                return Err(DeviceError::ConnectionFailed(format!(
                    "connect to {address} timed out"
                )))
            }
        };

        info!(device_id, address, transport = %self.kind, "LAN session established");
        Ok(Arc::new(LanLink::spawn(
            device_id.to_string(),
            self.kind,
            address.to_string(),
            stream,
        )))
    }
}

// =============================================================================
// LAN Link
// =============================================================================

type PendingMap = Arc<StdMutex<HashMap<String, oneshot::Sender<WireResponse>>>>;

/// One TCP session. A background task reads response lines and routes them
/// to waiting requests by correlation id.
struct LanLink {
    device_id: String,
    kind: TransportKind,
    address: String,
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingMap,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
    reader_task: JoinHandle<()>,
}

impl LanLink {
    fn spawn(device_id: String, kind: TransportKind, address: String, stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let (closed_tx, closed_rx) = watch::channel(false);

        let reader_task = tokio::spawn(Self::read_loop(
            device_id.clone(),
            read_half,
            pending.clone(),
            closed_tx.clone(),
        ));

        LanLink {
            device_id,
            kind,
            address,
            writer: Mutex::new(write_half),
            pending,
            closed_tx,
            closed_rx,
            reader_task,
        }
    }

    /// Reads response lines until the peer closes or errors, routing each
    /// to its waiting request.
    async fn read_loop(
        device_id: String,
        read_half: OwnedReadHalf,
        pending: PendingMap,
        closed_tx: watch::Sender<bool>,
    ) {
        let mut lines = BufReader::new(read_half).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match WireResponse::from_json(&line) {
                    Ok(response) => {
                        let waiter = pending
                            .lock()
                            .expect("pending map poisoned")
                            .remove(&response.request_id);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(response);
                            }
                            None => {
                                // Late response after a timeout, or an
                                // unsolicited message; dropped either way.
                                debug!(device_id, request_id = %response.request_id, "Unmatched response");
                            }
                        }
                    }
                    Err(e) => {
                        warn!(device_id, ?e, "Failed to parse device message");
                    }
                },
                Ok(None) => {
                    debug!(device_id, "Device closed the session");
                    break;
                }
                Err(e) => {
                    warn!(device_id, ?e, "Session read error");
                    break;
                }
            }
        }

        // Session lost: fail every waiter and signal watchers.
        pending.lock().expect("pending map poisoned").clear();
        let _ = closed_tx.send(true);
    }
}

#[async_trait]
impl DeviceLink for LanLink {
    async fn request(
        &self,
        request: WireRequest,
        request_timeout: Duration,
    ) -> DeviceResult<WireResponse> {
        if *self.closed_rx.borrow() {
            return Err(DeviceError::LinkClosed);
        }

        let (tx, rx) = oneshot::channel();
        let request_id = request.request_id.clone();
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(request_id.clone(), tx);

        let mut line = request.to_json()?;
        line.push('\n');

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                self.pending
                    .lock()
                    .expect("pending map poisoned")
                    .remove(&request_id);
                return Err(DeviceError::ConnectionFailed(e.to_string()));
            }
        }

        match timeout(request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Reader task dropped the sender: session lost mid-request.
            Ok(Err(_)) => Err(DeviceError::LinkClosed),
            Err(_) => {
                self.pending
                    .lock()
                    .expect("pending map poisoned")
                    .remove(&request_id);
                Err(DeviceError::CommandTimeout {
                    device_id: self.device_id.clone(),
                    timeout_secs: request_timeout.as_secs(),
                })
            }
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
        self.reader_task.abort();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    fn transport(&self) -> TransportKind {
        self.kind
    }

    fn remote_address(&self) -> Option<String> {
        Some(self.address.clone())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{DeviceInfo, GET_INFO};
    use tokio::net::TcpListener;

    /// Minimal fake device: answers GET_INFO and echoes everything else.
    async fn spawn_fake_device(info: DeviceInfo) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                let request: WireRequest = serde_json::from_str(&line).unwrap();
                let response = if request.msg_type == GET_INFO {
                    WireResponse::for_request(
                        &request,
                        Some(serde_json::to_value(&info).unwrap()),
                    )
                } else {
                    WireResponse::for_request(&request, Some(serde_json::json!({"echo": true})))
                };
                let mut out = response.to_json().unwrap();
                out.push('\n');
                write_half.write_all(out.as_bytes()).await.unwrap();
            }
        });

        addr
    }

    fn test_info() -> DeviceInfo {
        DeviceInfo {
            id: "lan-dev".into(),
            serial: "SN-1".into(),
            name: "Lan Analyzer".into(),
            model: "BL-200".into(),
            firmware_version: "2.0.0".into(),
            capabilities: vec![],
            battery_percent: Some(55),
            uptime_secs: 10,
            signal_quality: 80,
        }
    }

    #[tokio::test]
    async fn test_connect_and_request_roundtrip() {
        let addr = spawn_fake_device(test_info()).await;
        let driver = LanDriver::new(TransportKind::Lan);

        let link = driver
            .connect("lan-dev", Some(&addr.to_string()))
            .await
            .unwrap();

        let response = link
            .request(WireRequest::get_info(), Duration::from_secs(1))
            .await
            .unwrap();
        let info = DeviceInfo::from_response(&response).unwrap();
        assert_eq!(info.id, "lan-dev");

        assert_eq!(link.remote_address(), Some(addr.to_string()));
    }

    #[tokio::test]
    async fn test_connect_requires_address() {
        let driver = LanDriver::new(TransportKind::Lan);
        assert!(driver.connect("lan-dev", None).await.is_err());
    }

    #[tokio::test]
    async fn test_scan_finds_announcing_device() {
        // Fake device discovery responder on loopback.
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let discovery_port = responder.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, from) = responder.recv_from(&mut buf).await.unwrap();
            let announce = LanDriver::build_announce("lan-dev", "Lan Analyzer", 4711, 77, true);
            responder.send_to(&announce, from).await.unwrap();
        });

        let driver = LanDriver::with_config(
            TransportKind::Lan,
            LanDriverConfig {
                discovery_port,
                scan_target: IpAddr::V4(Ipv4Addr::LOCALHOST),
                connect_timeout: Duration::from_secs(1),
            },
        );

        let found = driver.scan(Duration::from_millis(500)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "lan-dev");
        assert_eq!(found[0].signal_quality, 77);
        assert!(found[0].is_paired);
    }

    #[test]
    fn test_announce_parse_rejects_garbage() {
        let driver = LanDriver::new(TransportKind::Lan);
        assert!(driver.parse_announce(b"nope").is_err());
        assert!(driver.parse_announce(b"BLNK\x01\x07{}").is_err()); // bad type
    }
}
