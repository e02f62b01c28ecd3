/// UPnP device description retrieval and parsing
///
/// Turns a [`DiscoveredDevice`] into a [`MediaServer`] when the description
/// declares a MediaServer device with a ContentDirectory service.

use anyhow::{anyhow, Result};
use nas_catalog_core::{DiscoveredDevice, MediaServer};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

/// Per-request timeout for description fetches
pub const DESCRIPTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Fields of the root device that the catalog needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescription {
    pub friendly_name: Option<String>,
    pub udn: String,
    pub device_type: String,
    pub services: Vec<ServiceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service_type: String,
    pub control_url: String,
}

impl DeviceDescription {
    /// Control URL of the first ContentDirectory service, as written in the XML
    pub fn content_directory_control_url(&self) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.service_type.contains("ContentDirectory") && !s.control_url.is_empty())
            .map(|s| s.control_url.as_str())
    }

    pub fn is_media_server(&self) -> bool {
        self.device_type.contains("MediaServer")
    }
}

/// Fetch and parse the description of `device`.
///
/// Returns `None` for transport errors, non-200 replies, malformed XML,
/// non-MediaServer devices, and MediaServers without ContentDirectory.
pub async fn resolve(client: &reqwest::Client, device: &DiscoveredDevice) -> Option<MediaServer> {
    debug!("Fetching device description from: {}", device.location);

    let xml = match fetch_device_description(client, &device.location).await {
        Ok(xml) => xml,
        Err(e) => {
            warn!("Failed to fetch device description from {}: {}", device.location, e);
            return None;
        }
    };

    let description = match parse_device_description(&xml) {
        Ok(description) => description,
        Err(e) => {
            warn!("Invalid device description at {}: {}", device.location, e);
            return None;
        }
    };

    into_media_server(description, device)
}

/// Build a [`MediaServer`] from a parsed description
pub fn into_media_server(
    description: DeviceDescription,
    device: &DiscoveredDevice,
) -> Option<MediaServer> {
    let name = description
        .friendly_name
        .clone()
        .unwrap_or_else(|| "Unknown Device".to_string());

    if !description.is_media_server() {
        debug!("Skipping {} ({}): not a MediaServer", name, description.device_type);
        return None;
    }

    let Some(control_url) = description.content_directory_control_url() else {
        warn!("No ContentDirectory service found for {}", name);
        return None;
    };

    let content_directory_control_url = match resolve_url(&device.location, control_url) {
        Ok(url) => url,
        Err(e) => {
            warn!("Cannot resolve control URL '{}' for {}: {}", control_url, name, e);
            return None;
        }
    };

    Some(MediaServer {
        name,
        udn: description.udn,
        base_url: device.location.clone(),
        content_directory_control_url,
        raw_device_info: device.clone(),
    })
}

/// Resolve every device on a bounded worker pool.
///
/// Servers come back in the order their devices were discovered; devices
/// that fail to resolve are skipped, and servers sharing a UDN are collapsed
/// to the first one.
pub async fn resolve_all(
    client: &reqwest::Client,
    devices: &[DiscoveredDevice],
    concurrency: usize,
) -> Vec<MediaServer> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, device) in devices.iter().cloned().enumerate() {
        let client = client.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            resolve(&client, &device).await.map(|server| (index, server))
        });
    }

    let mut resolved = Vec::with_capacity(devices.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(entry)) => resolved.push(entry),
            Ok(None) => {}
            Err(e) => warn!("Device resolution task failed: {}", e),
        }
    }
    resolved.sort_by_key(|(index, _)| *index);

    let mut seen_udns = HashSet::new();
    let servers: Vec<MediaServer> = resolved
        .into_iter()
        .map(|(_, server)| server)
        .filter(|server| server.udn.is_empty() || seen_udns.insert(server.udn.clone()))
        .collect();

    for server in &servers {
        info!("Found media server: {} ({})", server.name, server.udn);
    }
    servers
}

async fn fetch_device_description(client: &reqwest::Client, location: &str) -> Result<String> {
    let response = client
        .get(location)
        .timeout(DESCRIPTION_TIMEOUT)
        .send()
        .await?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(anyhow!("HTTP status {}", response.status()));
    }

    Ok(response.text().await?)
}

/// Parse a UPnP device description (`urn:schemas-upnp-org:device-1-0`).
///
/// Only the root device is read; embedded devices under `deviceList` and
/// their services are ignored. Element prefixes are not significant.
pub fn parse_device_description(xml: &str) -> Result<DeviceDescription> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut description = DeviceDescription::default();
    let mut current_service = ServiceInfo::default();
    let mut current_text = String::new();
    let mut device_depth = 0usize;
    let mut in_service = false;
    let mut saw_device = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(e.local_name().as_ref());

                match name.as_str() {
                    "device" => {
                        device_depth += 1;
                        saw_device = true;
                    }
                    "service" if device_depth == 1 => {
                        in_service = true;
                        current_service = ServiceInfo::default();
                    }
                    _ => {}
                }

                current_text.clear();
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.local_name().as_ref());
                let text = current_text.trim();

                if device_depth == 1 && !in_service {
                    match name.as_str() {
                        "friendlyName" if !text.is_empty() => {
                            description.friendly_name = Some(text.to_string())
                        }
                        "UDN" => description.udn = text.to_string(),
                        "deviceType" => description.device_type = text.to_string(),
                        _ => {}
                    }
                }

                if in_service {
                    match name.as_str() {
                        "serviceType" => current_service.service_type = text.to_string(),
                        "controlURL" => current_service.control_url = text.to_string(),
                        "service" => {
                            if !current_service.service_type.is_empty() {
                                description.services.push(std::mem::take(&mut current_service));
                            }
                            in_service = false;
                        }
                        _ => {}
                    }
                }

                if name == "device" {
                    device_depth = device_depth.saturating_sub(1);
                }

                current_text.clear();
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| anyhow!("XML text error: {}", err))?;
                current_text.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(anyhow!(
                    "XML parsing error at position {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
            _ => {}
        }
    }

    if !saw_device {
        return Err(anyhow!("no <device> element"));
    }

    Ok(description)
}

fn local_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Resolve a possibly relative URL against the description location
pub fn resolve_url(base: &str, url: &str) -> Result<String> {
    let base = Url::parse(base).map_err(|e| anyhow!("invalid base URL '{}': {}", base, e))?;
    let joined = base
        .join(url.trim())
        .map_err(|e| anyhow!("invalid URL '{}': {}", url, e))?;
    Ok(joined.to_string())
}
