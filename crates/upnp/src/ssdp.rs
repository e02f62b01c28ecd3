/// SSDP discovery of UPnP MediaServer devices
///
/// Sends a single M-SEARCH and collects unicast replies on the sending socket
/// until the wall-clock deadline. Discovery is best-effort: socket failures
/// produce an empty result instead of an error.

use nas_catalog_core::{DiscoveredDevice, MEDIA_SERVER_SEARCH_TARGET};
use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// SSDP multicast group and port
pub const SSDP_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1900);

/// Replies with long SERVER or vendor headers exceed 2 KiB
const RECV_BUFFER_SIZE: usize = 8192;

/// Discover MediaServer devices on the local network
///
/// # Arguments
/// * `timeout` - How long to listen for replies (also sent as `MX`)
///
/// # Returns
/// One entry per distinct `(LOCATION, USN)` pair, in arrival order
pub async fn discover(timeout: Duration) -> Vec<DiscoveredDevice> {
    discover_at(SocketAddr::V4(SSDP_ADDR), timeout).await
}

/// Same as [`discover`], sending the M-SEARCH to `target`
pub async fn discover_at(target: SocketAddr, timeout: Duration) -> Vec<DiscoveredDevice> {
    info!("Starting SSDP discovery ({}s timeout)", timeout.as_secs_f32());

    match try_discover(target, timeout).await {
        Ok(devices) => {
            info!("SSDP discovery complete, found {} device(s)", devices.len());
            devices
        }
        Err(e) => {
            warn!("SSDP discovery failed: {}", e);
            Vec::new()
        }
    }
}

async fn try_discover(target: SocketAddr, timeout: Duration) -> std::io::Result<Vec<DiscoveredDevice>> {
    let socket = create_ssdp_socket()?;
    let deadline = Instant::now() + timeout;

    send_msearch(&socket, target, mx_seconds(timeout)).await?;

    let mut collector = DiscoveryCollector::new();
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    loop {
        match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, addr))) => {
                let response = String::from_utf8_lossy(&buf[..len]);
                debug!("Received SSDP response from {} ({} bytes)", addr, len);
                if len == buf.len() {
                    warn!("SSDP response from {} filled the {} byte buffer and may be truncated", addr, len);
                }

                match parse_ssdp_response(&response) {
                    Some(device) => {
                        let location = device.location.clone();
                        if collector.insert(device) {
                            debug!("Found UPnP device at {}", location);
                        }
                    }
                    None => debug!("Ignoring SSDP message from {}", addr),
                }
            }
            Ok(Err(e)) => {
                // ICMP errors surface here on some platforms; keep listening
                debug!("Error receiving SSDP response: {}", e);
            }
            Err(_) => break,
        }
    }

    Ok(collector.into_devices())
}

/// MX is the listen window in whole seconds, at least 1
fn mx_seconds(timeout: Duration) -> u64 {
    timeout.as_secs().max(1)
}

/// Create a UDP socket for sending M-SEARCH and receiving unicast replies
fn create_ssdp_socket() -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_reuse_address(true)?;

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&addr.into())?;
    socket.set_multicast_ttl_v4(2)?;
    socket.set_nonblocking(true)?;

    let socket = UdpSocket::from_std(socket.into())?;
    debug!("SSDP socket bound to {}", socket.local_addr()?);
    Ok(socket)
}

/// Build the M-SEARCH request for MediaServer devices
pub fn build_msearch(mx: u64) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         \r\n",
        SSDP_ADDR, mx, MEDIA_SERVER_SEARCH_TARGET
    )
}

async fn send_msearch(socket: &UdpSocket, target: SocketAddr, mx: u64) -> std::io::Result<()> {
    let msearch = build_msearch(mx);
    let bytes_sent = socket.send_to(msearch.as_bytes(), target).await?;
    info!(
        "Sent M-SEARCH for {} ({} bytes to {})",
        MEDIA_SERVER_SEARCH_TARGET, bytes_sent, target
    );
    Ok(())
}

/// Parse an SSDP search reply.
///
/// Returns `None` unless the status line is `200 OK` and a non-empty
/// `LOCATION` header is present. Header names are case-insensitive.
pub fn parse_ssdp_response(response: &str) -> Option<DiscoveredDevice> {
    let mut lines = response.lines();
    let status_line = lines.next()?.trim();

    let mut parts = status_line.split_whitespace();
    let version = parts.next()?;
    let code = parts.next()?;
    if !version.to_ascii_uppercase().starts_with("HTTP/") || code != "200" {
        return None;
    }

    let mut headers: HashMap<String, String> = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers
                .entry(key.trim().to_ascii_uppercase())
                .or_insert_with(|| value.trim().to_string());
        }
    }

    let location = headers.remove("LOCATION").filter(|l| !l.is_empty())?;

    Some(DiscoveredDevice {
        location,
        server_header: headers.remove("SERVER").unwrap_or_default(),
        search_target: headers.remove("ST").unwrap_or_default(),
        unique_service_name: headers.remove("USN").unwrap_or_default(),
    })
}

/// Collects SSDP replies, dropping repeats of the same `(LOCATION, USN)`
#[derive(Debug, Default)]
pub struct DiscoveryCollector {
    seen: HashSet<(String, String)>,
    devices: Vec<DiscoveredDevice>,
}

impl DiscoveryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the device had not been seen before
    pub fn insert(&mut self, device: DiscoveredDevice) -> bool {
        let key = (
            device.location.clone(),
            device.unique_service_name.clone(),
        );
        if self.seen.insert(key) {
            self.devices.push(device);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn into_devices(self) -> Vec<DiscoveredDevice> {
        self.devices
    }
}
