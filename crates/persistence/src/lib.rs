//! SQLite cache for media files and playlists

pub mod db;
pub mod repository;

pub use db::{init_db, init_memory_db};
pub use repository::{CacheReport, CacheStats, MediaFileRepository, PlaylistRepository};
