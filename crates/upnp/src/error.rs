use thiserror::Error;

/// Why a ContentDirectory Browse produced nothing usable.
///
/// Never escapes [`ContentBrowser::browse`](nas_catalog_core::ContentBrowser::browse),
/// which logs it and returns an empty list.
#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Browse failed with HTTP status {status}")]
    Status { status: u16 },

    #[error("SOAP fault {code}: {description}")]
    SoapFault { code: String, description: String },

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("Browse response has no Result element")]
    MissingResult,
}

impl BrowseError {
    pub(crate) fn xml(err: impl std::fmt::Display) -> Self {
        BrowseError::Xml(err.to_string())
    }
}
