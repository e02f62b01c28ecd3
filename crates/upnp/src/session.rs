/// One discovery-to-catalog cycle against the local network
///
/// A session owns the servers found by one discovery run and the server
/// selected from them. It is built once and then shared read-only (usually
/// behind an `Arc`); reconnecting means building a new session.

use nas_catalog_core::{CatalogError, CatalogSnapshot, MediaServer, Settings};
use std::sync::Arc;
use tracing::info;

use crate::browser::ContentDirectoryBrowser;
use crate::description::resolve_all;
use crate::ssdp::discover;
use crate::walker::{walk, WalkOptions};

/// Name fragments that mark the preferred server when none is requested
const PREFERRED_SERVER_HINTS: &[&str] = &["fritz", "avm"];

#[derive(Debug, Clone)]
pub struct UpnpSession {
    client: reqwest::Client,
    servers: Vec<MediaServer>,
    selected: Option<usize>,
}

impl UpnpSession {
    /// Run SSDP discovery and resolve every reply into media servers.
    ///
    /// No server is selected yet; call [`UpnpSession::select`].
    pub async fn discover(settings: &Settings) -> Self {
        let client = reqwest::Client::new();
        let devices = discover(settings.discovery_timeout()).await;
        let servers = resolve_all(&client, &devices, settings.upnp.resolve_concurrency).await;
        info!("Discovered {} media server(s)", servers.len());
        Self::from_servers(client, servers)
    }

    pub fn from_servers(client: reqwest::Client, servers: Vec<MediaServer>) -> Self {
        Self {
            client,
            servers,
            selected: None,
        }
    }

    /// Discover and select in one step, using `upnp.server_name` from settings
    pub async fn connect(settings: &Settings) -> Result<Self, CatalogError> {
        let name = Some(settings.upnp.server_name.as_str()).filter(|n| !n.is_empty());
        Self::discover(settings).await.select(name)
    }

    pub fn servers(&self) -> &[MediaServer] {
        &self.servers
    }

    /// Select a server.
    ///
    /// With a name, the first server whose name contains it (ignoring case)
    /// wins. Without one, a FRITZ!Box/AVM server is preferred, else the
    /// first server.
    pub fn select(mut self, name: Option<&str>) -> Result<Self, CatalogError> {
        if self.servers.is_empty() {
            return Err(CatalogError::NoServersDiscovered);
        }

        let index = match name {
            Some(name) => {
                let wanted = name.to_lowercase();
                self.servers
                    .iter()
                    .position(|s| s.name.to_lowercase().contains(&wanted))
                    .ok_or_else(|| CatalogError::ServerNotFound(name.to_string()))?
            }
            None => self
                .servers
                .iter()
                .position(|s| {
                    let lower = s.name.to_lowercase();
                    PREFERRED_SERVER_HINTS.iter().any(|hint| lower.contains(hint))
                })
                .unwrap_or(0),
        };

        info!("Connected to media server: {}", self.servers[index].name);
        self.selected = Some(index);
        Ok(self)
    }

    pub fn selected(&self) -> Option<&MediaServer> {
        self.selected.and_then(|index| self.servers.get(index))
    }

    pub fn is_connected(&self) -> bool {
        self.selected().is_some()
    }

    /// Browser for the selected server
    pub fn browser(&self) -> Result<ContentDirectoryBrowser, CatalogError> {
        let server = self.selected().ok_or(CatalogError::NotConnected)?;
        Ok(ContentDirectoryBrowser::with_client(
            self.client.clone(),
            server.clone(),
        ))
    }

    /// Walk the selected server from `root_container_id`
    pub async fn walk(
        &self,
        root_container_id: &str,
        max_depth: usize,
        options: &WalkOptions,
    ) -> Result<CatalogSnapshot, CatalogError> {
        let browser = Arc::new(self.browser()?);
        Ok(walk(browser, root_container_id, max_depth, options).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nas_catalog_core::DiscoveredDevice;

    fn server(name: &str) -> MediaServer {
        MediaServer {
            name: name.to_string(),
            udn: format!("uuid:{}", name.to_lowercase().replace(' ', "-")),
            base_url: "http://127.0.0.1:1/desc.xml".to_string(),
            content_directory_control_url: "http://127.0.0.1:1/cds".to_string(),
            raw_device_info: DiscoveredDevice {
                location: "http://127.0.0.1:1/desc.xml".to_string(),
                server_header: String::new(),
                search_target: String::new(),
                unique_service_name: String::new(),
            },
        }
    }

    fn session(names: &[&str]) -> UpnpSession {
        UpnpSession::from_servers(
            reqwest::Client::new(),
            names.iter().map(|n| server(n)).collect(),
        )
    }

    #[test]
    fn test_select_prefers_fritz_box() {
        let s = session(&["Plex", "FRITZ!Box 7590 Media", "minidlna"])
            .select(None)
            .unwrap();
        assert_eq!(s.selected().unwrap().name, "FRITZ!Box 7590 Media");

        let s = session(&["Plex", "AVM Mediaserver"]).select(None).unwrap();
        assert_eq!(s.selected().unwrap().name, "AVM Mediaserver");
    }

    #[test]
    fn test_select_falls_back_to_first() {
        let s = session(&["Plex", "minidlna"]).select(None).unwrap();
        assert_eq!(s.selected().unwrap().name, "Plex");
    }

    #[test]
    fn test_select_by_name_substring() {
        let s = session(&["FRITZ!Box", "MiniDLNA on nas"])
            .select(Some("minidlna"))
            .unwrap();
        assert_eq!(s.selected().unwrap().name, "MiniDLNA on nas");

        let err = session(&["Plex"]).select(Some("jellyfin")).unwrap_err();
        assert!(matches!(err, CatalogError::ServerNotFound(name) if name == "jellyfin"));
    }

    #[test]
    fn test_select_without_servers() {
        let err = session(&[]).select(None).unwrap_err();
        assert!(matches!(err, CatalogError::NoServersDiscovered));
    }

    #[tokio::test]
    async fn test_unselected_session_fails_loudly() {
        let s = session(&["Plex"]);
        assert!(!s.is_connected());
        assert!(matches!(s.browser(), Err(CatalogError::NotConnected)));

        let result = s.walk("0", 3, &WalkOptions::default()).await;
        assert!(matches!(result, Err(CatalogError::NotConnected)));
    }
}
