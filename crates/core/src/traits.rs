use crate::models::CatalogEntry;
use async_trait::async_trait;

/// Lists the direct children of a ContentDirectory container.
///
/// Implementations absorb transport and protocol failures: a container that
/// could not be browsed yields an empty list, the same as an empty folder.
#[async_trait]
pub trait ContentBrowser: Send + Sync {
    /// Human-readable name of the server being browsed (for logging)
    fn server_name(&self) -> &str;

    /// Browse the direct children of `container_id`, in server order
    async fn browse(&self, container_id: &str) -> Vec<CatalogEntry>;
}
