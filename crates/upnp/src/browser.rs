/// ContentDirectory client bound to one media server

use async_trait::async_trait;
use nas_catalog_core::{CatalogEntry, ContentBrowser, MediaServer};
use std::time::Duration;
use tracing::{debug, warn};

use crate::didl::parse_didl;
use crate::error::BrowseError;
use crate::soap::{browse_soap_action, build_browse_envelope, parse_browse_response};

/// Timeout for one Browse round trip
pub const BROWSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Entries of one Browse page plus the server's counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowseResult {
    pub entries: Vec<CatalogEntry>,
    pub number_returned: Option<u32>,
    pub total_matches: Option<u32>,
}

impl BrowseResult {
    /// The server reported more children than it returned
    pub fn is_truncated(&self) -> bool {
        match (self.number_returned, self.total_matches) {
            (Some(returned), Some(total)) => total > returned,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentDirectoryBrowser {
    client: reqwest::Client,
    server: MediaServer,
}

impl ContentDirectoryBrowser {
    pub fn new(server: MediaServer) -> Self {
        Self::with_client(reqwest::Client::new(), server)
    }

    pub fn with_client(client: reqwest::Client, server: MediaServer) -> Self {
        Self { client, server }
    }

    pub fn server(&self) -> &MediaServer {
        &self.server
    }

    /// Browse the direct children of `container_id`, surfacing every failure
    pub async fn try_browse(&self, container_id: &str) -> Result<BrowseResult, BrowseError> {
        let body = build_browse_envelope(container_id);
        let control_url = &self.server.content_directory_control_url;

        debug!("Browsing container '{}' at {}", container_id, control_url);

        let response = self
            .client
            .post(control_url)
            .timeout(BROWSE_TIMEOUT)
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .header("SOAPAction", browse_soap_action())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status != reqwest::StatusCode::OK {
            // UPnP errors arrive as 500 with a Fault body; prefer the fault details
            if let Err(fault @ BrowseError::SoapFault { .. }) = parse_browse_response(&text) {
                return Err(fault);
            }
            return Err(BrowseError::Status {
                status: status.as_u16(),
            });
        }

        let response = parse_browse_response(&text)?;
        let entries = parse_didl(&response.didl)?;

        Ok(BrowseResult {
            entries,
            number_returned: response.number_returned,
            total_matches: response.total_matches,
        })
    }
}

#[async_trait]
impl ContentBrowser for ContentDirectoryBrowser {
    fn server_name(&self) -> &str {
        &self.server.name
    }

    async fn browse(&self, container_id: &str) -> Vec<CatalogEntry> {
        match self.try_browse(container_id).await {
            Ok(result) => {
                if result.is_truncated() {
                    warn!(
                        "Container '{}' on {} has {} children, only {} returned",
                        container_id,
                        self.server.name,
                        result.total_matches.unwrap_or_default(),
                        result.number_returned.unwrap_or_default()
                    );
                }
                result.entries
            }
            Err(e) => {
                warn!(
                    "Browse of container '{}' on {} failed: {}",
                    container_id, self.server.name, e
                );
                Vec::new()
            }
        }
    }
}
