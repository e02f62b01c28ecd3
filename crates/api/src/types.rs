/// Request and response bodies for the REST API

use crate::service::ScanSummary;
use nas_catalog_core::{MediaServer, PlaylistSpec};
use serde::{Deserialize, Serialize};

/// Response for GET /
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub upnp_connected: bool,
    pub upnp_server: Option<String>,
}

/// Response for GET /health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub upnp_connected: bool,
    pub database: String,
}

/// Response for GET /health/detailed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    /// "healthy" when connected, else "degraded"
    pub status: String,
    pub upnp_connected: bool,
    pub database: String,
    pub timestamp: i64,
    pub upnp_server: Option<ServerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upnp_error: Option<String>,
    pub scanning: bool,
    pub last_scan: Option<ScanSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub udn: String,
    pub base_url: String,
    pub content_directory_url: String,
}

impl From<&MediaServer> for ServerInfo {
    fn from(server: &MediaServer) -> Self {
        Self {
            name: server.name.clone(),
            udn: server.udn.clone(),
            base_url: server.base_url.clone(),
            content_directory_url: server.content_directory_control_url.clone(),
        }
    }
}

/// Response for GET /upnp/discover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub servers: Vec<ServerInfo>,
    pub count: usize,
}

/// Query for POST /upnp/reconnect
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconnectQuery {
    pub server_name: Option<String>,
}

/// Response for POST /upnp/reconnect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectResponse {
    pub message: String,
    pub server: ServerInfo,
}

/// Query for GET /media
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaQuery {
    pub share_name: Option<String>,
    pub file_type: Option<String>,
    pub search: Option<String>,
}

/// Request for POST /playlists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlaylistRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub file_paths: Vec<String>,
}

/// Query for GET /playlists/auto/generate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateQuery {
    /// Store the generated playlists as well
    #[serde(default)]
    pub save: bool,
}

/// Response for GET /playlists/auto/generate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedPlaylistsResponse {
    pub auto_playlists: Vec<PlaylistSpec>,
    pub smart_playlists: Vec<PlaylistSpec>,
    pub total: usize,
}

/// Generic message response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}
