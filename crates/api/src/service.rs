use anyhow::Result;
use chrono::Utc;
use nas_catalog_core::{CatalogError, MediaFile, MediaFilter, MediaServer, Settings, ROOT_CONTAINER_ID};
use nas_catalog_persistence::{MediaFileRepository, PlaylistRepository};
use nas_catalog_playlist::{apply_smb_urls, compose, generate_m3u, playlist_file_name, ComposedPlaylists};
use nas_catalog_upnp::{UpnpSession, WalkOptions};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// Outcome of one completed scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub server: String,
    pub items_found: usize,
    pub cached: usize,
    pub duplicates: usize,
    pub containers_browsed: usize,
    pub empty_containers: usize,
    pub containers_skipped: usize,
    /// `false` when nothing was found and the cache was left alone
    pub cache_replaced: bool,
    pub finished_at: i64,
}

/// A stored playlist rendered as M3U
#[derive(Debug, Clone)]
pub struct PlaylistExport {
    pub file_name: String,
    pub content: String,
    /// Playlist paths found in the cache
    pub matched: usize,
    pub expected: usize,
}

/// Shared state behind the API and the CLI commands.
///
/// The current UPnP session is swapped as a whole on reconnect; readers
/// clone the `Arc` and never observe a half-updated session.
pub struct CatalogService {
    settings: Settings,
    pool: SqlitePool,
    media: MediaFileRepository,
    playlists: PlaylistRepository,
    session: RwLock<Option<Arc<UpnpSession>>>,
    scan_lock: Arc<Mutex<()>>,
    last_scan: RwLock<Option<ScanSummary>>,
}

impl CatalogService {
    pub fn new(settings: Settings, pool: SqlitePool) -> Self {
        Self {
            settings,
            media: MediaFileRepository::new(pool.clone()),
            playlists: PlaylistRepository::new(pool.clone()),
            pool,
            session: RwLock::new(None),
            scan_lock: Arc::new(Mutex::new(())),
            last_scan: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn media(&self) -> &MediaFileRepository {
        &self.media
    }

    pub fn playlists(&self) -> &PlaylistRepository {
        &self.playlists
    }

    pub async fn session(&self) -> Option<Arc<UpnpSession>> {
        self.session.read().await.clone()
    }

    /// Publish a session with a selected server
    pub async fn set_session(&self, session: UpnpSession) -> Result<MediaServer, CatalogError> {
        let server = session.selected().cloned().ok_or(CatalogError::NotConnected)?;
        *self.session.write().await = Some(Arc::new(session));
        info!("Connected to UPnP media server: {}", server.name);
        Ok(server)
    }

    pub async fn connected_server(&self) -> Option<MediaServer> {
        self.session().await.and_then(|s| s.selected().cloned())
    }

    /// Discover servers and connect to `server_name` (or the preferred one).
    ///
    /// On failure the previous session stays in place.
    pub async fn connect(&self, server_name: Option<&str>) -> Result<MediaServer, CatalogError> {
        info!("Discovering UPnP media servers...");
        let session = UpnpSession::discover(&self.settings).await.select(server_name)?;
        self.set_session(session).await
    }

    /// Fresh discovery run that leaves the current session alone
    pub async fn discover_servers(&self) -> Vec<MediaServer> {
        UpnpSession::discover(&self.settings).await.servers().to_vec()
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_lock.try_lock().is_err()
    }

    /// Walk the connected server and replace the cached files of the
    /// configured share. Concurrent calls run one after another.
    pub async fn scan(&self) -> Result<ScanSummary> {
        let _guard = self.scan_lock.lock().await;
        self.run_scan().await
    }

    /// Start a scan in a background task unless one is already running.
    ///
    /// Returns `false` when the scan lock is held.
    pub fn spawn_scan(self: &Arc<Self>) -> bool {
        let Ok(guard) = self.scan_lock.clone().try_lock_owned() else {
            return false;
        };

        let service = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = service.run_scan().await {
                error!("Error during media scanning: {:#}", e);
            }
        });
        true
    }

    async fn run_scan(&self) -> Result<ScanSummary> {
        let session = self.session().await.ok_or(CatalogError::NotConnected)?;
        let server = session.browser()?.server().name.clone();

        info!("Scanning media files from UPnP server {}...", server);
        let options = WalkOptions {
            concurrency: self.settings.scan.browse_concurrency,
            max_containers: self.settings.scan.max_containers,
        };
        let snapshot = session
            .walk(ROOT_CONTAINER_ID, self.settings.scan.max_depth, &options)
            .await?;

        let share_name = &self.settings.scan.share_name;
        let mut summary = ScanSummary {
            server,
            items_found: snapshot.len(),
            cached: 0,
            duplicates: 0,
            containers_browsed: snapshot.report.containers_browsed,
            empty_containers: snapshot.report.empty_containers,
            containers_skipped: snapshot.report.containers_skipped,
            cache_replaced: false,
            finished_at: 0,
        };

        // an unreachable server walks to nothing; keep what is cached
        if snapshot.is_empty() {
            warn!(
                "Scan of {} found no media files, keeping cached files of share '{}'",
                summary.server, share_name
            );
        } else {
            let now = Utc::now().timestamp();
            let mut files: Vec<MediaFile> = snapshot
                .items
                .iter()
                .map(|item| MediaFile::from_upnp(item, share_name, now))
                .collect();
            apply_smb_urls(&mut files, &self.settings.smb);

            let report = self.media.cache_media_files(&files, share_name).await?;
            summary.cached = report.cached;
            summary.duplicates = report.duplicates;
            summary.cache_replaced = true;
        }

        summary.finished_at = Utc::now().timestamp();
        info!("Completed scanning: found {} media files", summary.items_found);

        *self.last_scan.write().await = Some(summary.clone());
        Ok(summary)
    }

    pub async fn last_scan(&self) -> Option<ScanSummary> {
        self.last_scan.read().await.clone()
    }

    /// Compose auto and smart playlists over the whole cache, optionally
    /// storing them (replacing earlier versions by name)
    pub async fn generate_playlists(&self, save: bool) -> Result<ComposedPlaylists> {
        let files = self.media.get_media_files(&MediaFilter::default()).await?;
        let composed = compose(&files, Utc::now().timestamp());

        if save {
            for spec in composed.auto.iter().chain(&composed.smart) {
                self.playlists.save_spec(spec).await?;
            }
            info!("Saved {} generated playlist(s)", composed.len());
        }

        Ok(composed)
    }

    /// Render a stored playlist as M3U; `None` when the id is unknown
    pub async fn export_playlist(&self, id: i64) -> Result<Option<PlaylistExport>> {
        let Some(playlist) = self.playlists.get_playlist(id).await? else {
            return Ok(None);
        };

        let wanted: HashSet<&str> = playlist.file_paths.iter().map(String::as_str).collect();
        let files: Vec<MediaFile> = self
            .media
            .get_media_files(&MediaFilter::default())
            .await?
            .into_iter()
            .filter(|f| wanted.contains(f.path.as_str()))
            .collect();

        if files.len() != wanted.len() {
            warn!(
                "Playlist {}: found {} files out of {} expected",
                id,
                files.len(),
                wanted.len()
            );
        }

        Ok(Some(PlaylistExport {
            file_name: playlist_file_name(&playlist.name),
            content: generate_m3u(&playlist, &files, self.settings.smb.is_configured()),
            matched: files.len(),
            expected: wanted.len(),
        }))
    }

    pub async fn database_ok(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nas_catalog_core::{DiscoveredDevice, MediaItem};
    use nas_catalog_persistence::init_memory_db;

    async fn service() -> CatalogService {
        CatalogService::new(Settings::default(), init_memory_db().await.unwrap())
    }

    fn server() -> MediaServer {
        MediaServer {
            name: "Living Room NAS".to_string(),
            udn: "uuid:nas".to_string(),
            base_url: "http://127.0.0.1:1/desc.xml".to_string(),
            content_directory_control_url: "http://127.0.0.1:1/cds".to_string(),
            raw_device_info: DiscoveredDevice {
                location: "http://127.0.0.1:1/desc.xml".to_string(),
                server_header: String::new(),
                search_target: String::new(),
                unique_service_name: "uuid:nas".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_scan_requires_connection() {
        let service = service().await;
        let err = service.scan().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::NotConnected)
        ));
        assert!(service.last_scan().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_keeps_cached_files() {
        let service = service().await;
        let item = MediaItem {
            id: "1".to_string(),
            title: "Holiday.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            resource_url: "http://nas/1".to_string(),
            size_bytes: Some(10),
            duration: None,
            container_path: Vec::new(),
        };
        service
            .media()
            .cache_media_files(&[MediaFile::from_upnp(&item, "UPnP", 0)], "UPnP")
            .await
            .unwrap();

        // nothing listens on port 1, so every Browse fails
        let session = UpnpSession::from_servers(reqwest_client(), vec![server()])
            .select(None)
            .unwrap();
        service.set_session(session).await.unwrap();

        let summary = service.scan().await.unwrap();
        assert_eq!(summary.items_found, 0);
        assert_eq!(summary.cached, 0);
        assert!(!summary.cache_replaced);
        assert_eq!(service.last_scan().await, Some(summary));

        let cached = service.media().get_media_files(&MediaFilter::default()).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].path, "http://nas/1");
    }

    #[tokio::test]
    async fn test_spawn_scan_refuses_while_scanning() {
        let service = Arc::new(service().await);

        let held = service.scan_lock.lock().await;
        assert!(service.is_scanning());
        assert!(!service.spawn_scan());
        drop(held);

        // not connected: the task starts and logs the error
        assert!(service.spawn_scan());
    }

    #[tokio::test]
    async fn test_set_session_rejects_unselected() {
        let service = service().await;
        let session = UpnpSession::from_servers(reqwest_client(), vec![server()]);
        assert!(service.set_session(session.clone()).await.is_err());
        assert!(service.connected_server().await.is_none());

        let selected = session.select(None).unwrap();
        assert_eq!(service.set_session(selected).await.unwrap().name, "Living Room NAS");
        assert!(service.connected_server().await.is_some());
    }

    #[tokio::test]
    async fn test_export_skips_uncached_paths() {
        let service = service().await;
        let item = MediaItem {
            id: "1".to_string(),
            title: "Intro: Part 1.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            resource_url: "http://nas/1".to_string(),
            size_bytes: None,
            duration: None,
            container_path: Vec::new(),
        };
        service
            .media()
            .cache_media_files(&[MediaFile::from_upnp(&item, "UPnP", 0)], "UPnP")
            .await
            .unwrap();
        let playlist = service
            .playlists()
            .create_playlist(
                "Mix: 1",
                None,
                &["http://nas/1".to_string(), "http://nas/gone".to_string()],
            )
            .await
            .unwrap();

        let export = service.export_playlist(playlist.id).await.unwrap().unwrap();
        assert_eq!(export.file_name, "Mix 1.vlc.m3u");
        assert_eq!((export.matched, export.expected), (1, 2));
        assert!(export.content.contains("#EXTINF:-1,Intro. Part 1\nhttp://nas/1"));

        assert!(service.export_playlist(playlist.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generate_and_save_is_repeatable() {
        let service = service().await;
        let files: Vec<MediaFile> = (0..3)
            .map(|i| {
                MediaFile::from_smb(&format!(r"\\nas\media\Movies\clip{}.mp4", i), 1, 0, "media")
            })
            .collect();
        service.media().cache_media_files(&files, "media").await.unwrap();

        let first = service.generate_playlists(true).await.unwrap();
        assert!(!first.is_empty());
        let stored = service.playlists().get_playlists().await.unwrap().len();
        assert_eq!(stored, first.len());

        service.generate_playlists(true).await.unwrap();
        assert_eq!(service.playlists().get_playlists().await.unwrap().len(), stored);
    }

    fn reqwest_client() -> reqwest::Client {
        reqwest::Client::new()
    }
}
