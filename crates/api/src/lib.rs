/// HTTP API for the media catalog
///
/// Exposes discovery, scanning, cached media and playlist management over
/// REST, backed by a shared [`CatalogService`].

pub mod routes;
pub mod server;
pub mod service;
pub mod types;

pub use routes::{create_router, AppState};
pub use server::ApiServer;
pub use service::{CatalogService, ScanSummary};
pub use types::*;
