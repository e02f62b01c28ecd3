use thiserror::Error;

/// Errors surfaced to callers of the catalog engine.
///
/// Network and protocol trouble is absorbed inside discovery and browsing;
/// what remains here are missing prerequisites and bad input.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Browsing or walking was attempted before a server was selected
    #[error("not connected to any media server")]
    NotConnected,

    #[error("no media servers discovered")]
    NoServersDiscovered,

    #[error("media server '{0}' not found")]
    ServerNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
