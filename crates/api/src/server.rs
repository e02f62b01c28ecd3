/// API server lifecycle
use crate::routes::{create_router, AppState};
use crate::service::CatalogService;
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// HTTP API server
pub struct ApiServer {
    addr: SocketAddr,
    service: Arc<CatalogService>,
    server_handle: Option<JoinHandle<()>>,
}

impl ApiServer {
    /// Create a new API server
    ///
    /// # Arguments
    /// * `addr` - Address to bind to; port 0 picks a free port
    /// * `service` - Shared catalog service
    pub fn new(addr: SocketAddr, service: Arc<CatalogService>) -> Self {
        Self {
            addr,
            service,
            server_handle: None,
        }
    }

    /// Bind and start serving in a background task
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting API server on {}", self.addr);

        let state = AppState {
            service: self.service.clone(),
        };
        let app = create_router(state);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        self.addr = listener.local_addr()?;
        info!("API listening on http://{}", self.addr);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("API server error: {}", e);
            }
        });

        self.server_handle = Some(handle);

        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            info!("Stopping API server");
            handle.abort();
        }
    }

    /// Bound address once started, the requested one before
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}
