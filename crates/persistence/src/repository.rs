use anyhow::{Context, Result};
use chrono::Utc;
use nas_catalog_core::{FileType, MediaFile, MediaFilter, Playlist, PlaylistSpec};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashSet};

const MEDIA_FILE_COLUMNS: &str =
    "id, path, name, size, modified_time, file_type, share_name, directory, smb_url, source";

/// Outcome of replacing the cached files of one share
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheReport {
    pub cached: usize,
    /// Files dropped because an earlier file had the same path
    pub duplicates: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_files: i64,
    pub shares: BTreeMap<String, i64>,
    pub file_types: BTreeMap<String, i64>,
}

/// Repository for cached media files
#[derive(Clone)]
pub struct MediaFileRepository {
    pool: SqlitePool,
}

impl MediaFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace every cached file of `share_name` with `files`.
    ///
    /// Runs in one transaction. When several files share a path, the first
    /// one wins and the rest are counted as duplicates.
    pub async fn cache_media_files(&self, files: &[MediaFile], share_name: &str) -> Result<CacheReport> {
        let cached_at = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM media_files WHERE share_name = ?")
            .bind(share_name)
            .execute(&mut *tx)
            .await?;

        let mut seen = HashSet::new();
        let mut report = CacheReport::default();

        for file in files {
            if !seen.insert(file.path.as_str()) {
                tracing::debug!("Skipping duplicate path: {}", file.path);
                report.duplicates += 1;
                continue;
            }

            let source = serde_json::to_string(&file.source)?;
            let size = i64::try_from(file.size)
                .with_context(|| format!("Size {} of {} does not fit in the cache", file.size, file.path))?;

            // a path cached under another share moves to this one
            sqlx::query(
                "INSERT INTO media_files
                    (path, name, size, modified_time, file_type, share_name, directory, smb_url, source, cached_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(path) DO UPDATE SET
                    name = excluded.name,
                    size = excluded.size,
                    modified_time = excluded.modified_time,
                    file_type = excluded.file_type,
                    share_name = excluded.share_name,
                    directory = excluded.directory,
                    smb_url = excluded.smb_url,
                    source = excluded.source,
                    cached_at = excluded.cached_at"
            )
            .bind(&file.path)
            .bind(&file.name)
            .bind(size)
            .bind(file.modified_time)
            .bind(file.file_type.as_str())
            .bind(share_name)
            .bind(&file.directory)
            .bind(&file.smb_url)
            .bind(source)
            .bind(cached_at)
            .execute(&mut *tx)
            .await?;

            report.cached += 1;
        }

        tx.commit().await?;

        tracing::info!(
            "Cached {} media files for share '{}' ({} duplicate paths skipped)",
            report.cached,
            share_name,
            report.duplicates
        );
        Ok(report)
    }

    pub async fn get_media_files(&self, filter: &MediaFilter) -> Result<Vec<MediaFile>> {
        let mut sql = format!("SELECT {} FROM media_files WHERE 1 = 1", MEDIA_FILE_COLUMNS);
        if filter.share_name.is_some() {
            sql.push_str(" AND share_name = ?");
        }
        if filter.file_type.is_some() {
            sql.push_str(" AND file_type = ?");
        }
        if filter.search.is_some() {
            sql.push_str(" AND name LIKE ?");
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query(&sql);
        if let Some(share_name) = &filter.share_name {
            query = query.bind(share_name);
        }
        if let Some(file_type) = filter.file_type {
            query = query.bind(file_type.as_str());
        }
        if let Some(search) = &filter.search {
            query = query.bind(format!("%{}%", search));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(media_file_from_row).collect()
    }

    pub async fn get_cache_stats(&self) -> Result<CacheStats> {
        let total_files: i64 = sqlx::query("SELECT COUNT(*) FROM media_files")
            .fetch_one(&self.pool)
            .await?
            .get(0);

        let shares = self.count_by("share_name").await?;
        let file_types = self.count_by("file_type").await?;

        Ok(CacheStats {
            total_files,
            shares,
            file_types,
        })
    }

    async fn count_by(&self, column: &'static str) -> Result<BTreeMap<String, i64>> {
        let rows = sqlx::query(&format!(
            "SELECT {column}, COUNT(*) FROM media_files GROUP BY {column}"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| (r.get(0), r.get(1))).collect())
    }
}

fn media_file_from_row(row: &SqliteRow) -> Result<MediaFile> {
    let file_type: String = row.try_get("file_type")?;
    let source: String = row.try_get("source")?;
    let path: String = row.try_get("path")?;

    Ok(MediaFile {
        id: Some(row.try_get("id")?),
        name: row.try_get("name")?,
        size: row.try_get::<i64, _>("size")?.max(0) as u64,
        modified_time: row.try_get("modified_time")?,
        file_type: file_type.parse().unwrap_or(FileType::Unknown),
        share_name: row.try_get("share_name")?,
        directory: row.try_get("directory")?,
        smb_url: row.try_get("smb_url")?,
        source: serde_json::from_str(&source)
            .with_context(|| format!("Invalid source for cached file {}", path))?,
        path,
    })
}

/// Repository for saved playlists
#[derive(Clone)]
pub struct PlaylistRepository {
    pool: SqlitePool,
}

impl PlaylistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new playlist; fails if the name is taken
    pub async fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
        file_paths: &[String],
    ) -> Result<Playlist> {
        let now = Utc::now().timestamp();
        let paths = serde_json::to_string(file_paths)?;

        let result = sqlx::query(
            "INSERT INTO playlists (name, description, file_paths, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)"
        )
        .bind(name)
        .bind(description)
        .bind(paths)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create playlist '{}'", name))?;

        tracing::info!("Created playlist '{}' with {} files", name, file_paths.len());

        Ok(Playlist {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            description: description.map(str::to_string),
            file_paths: file_paths.to_vec(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Insert or replace a composed playlist by name
    pub async fn save_spec(&self, spec: &PlaylistSpec) -> Result<i64> {
        let now = Utc::now().timestamp();
        let paths = serde_json::to_string(&spec.file_paths)?;

        let row = sqlx::query(
            "INSERT INTO playlists (name, description, file_paths, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                description = excluded.description,
                file_paths = excluded.file_paths,
                updated_at = excluded.updated_at
             RETURNING id"
        )
        .bind(&spec.name)
        .bind(&spec.description)
        .bind(paths)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get(0))
    }

    pub async fn get_playlists(&self) -> Result<Vec<Playlist>> {
        let rows = sqlx::query(
            "SELECT id, name, description, file_paths, created_at, updated_at FROM playlists ORDER BY id"
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(playlist_from_row).collect()
    }

    pub async fn get_playlist(&self, id: i64) -> Result<Option<Playlist>> {
        let row = sqlx::query(
            "SELECT id, name, description, file_paths, created_at, updated_at FROM playlists WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(playlist_from_row).transpose()
    }

    /// Returns `false` when no playlist had that id
    pub async fn delete_playlist(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM playlists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!("Deleted playlist ID {}", id);
        }
        Ok(deleted)
    }
}

fn playlist_from_row(row: &SqliteRow) -> Result<Playlist> {
    let paths: String = row.try_get("file_paths")?;

    Ok(Playlist {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        file_paths: serde_json::from_str(&paths)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;
    use nas_catalog_core::{MediaItem, MediaItemSource};

    fn upnp_file(id: &str, title: &str, mime: &str) -> MediaFile {
        let item = MediaItem {
            id: id.to_string(),
            title: title.to_string(),
            mime_type: mime.to_string(),
            resource_url: format!("http://nas:49000/m/{}", id),
            size_bytes: Some(2048),
            duration: Some("0:03:00".to_string()),
            container_path: vec!["Music".to_string()],
        };
        MediaFile::from_upnp(&item, "UPnP", 1_700_000_000)
    }

    async fn repos() -> (MediaFileRepository, PlaylistRepository) {
        let pool = init_memory_db().await.unwrap();
        (MediaFileRepository::new(pool.clone()), PlaylistRepository::new(pool))
    }

    #[tokio::test]
    async fn test_cache_first_seen_wins_and_counts_duplicates() {
        let (media, _) = repos().await;

        // same id, so same resource URL as the first file
        let files = vec![
            upnp_file("1", "First Title.mp3", "audio/mpeg"),
            upnp_file("2", "Clip.mp4", "video/mp4"),
            upnp_file("1", "Second Title.mp3", "audio/mpeg"),
        ];

        let report = media.cache_media_files(&files, "UPnP").await.unwrap();
        assert_eq!(report, CacheReport { cached: 2, duplicates: 1 });

        let cached = media.get_media_files(&MediaFilter::default()).await.unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].name, "First Title.mp3");
        assert_eq!(cached[0].directory.as_deref(), Some("Music"));
        assert!(cached[0].id.is_some());
        assert!(matches!(
            &cached[0].source,
            MediaItemSource::Upnp { duration: Some(d), .. } if d == "0:03:00"
        ));
    }

    #[tokio::test]
    async fn test_recache_replaces_share_contents() {
        let (media, _) = repos().await;

        media
            .cache_media_files(&[upnp_file("1", "a.mp3", "audio/mpeg"), upnp_file("2", "b.mp3", "audio/mpeg")], "UPnP")
            .await
            .unwrap();
        media
            .cache_media_files(&[MediaFile::from_smb(r"\\nas\media\x.mkv", 5, 10, "media")], "media")
            .await
            .unwrap();
        media
            .cache_media_files(&[upnp_file("3", "c.mp4", "video/mp4")], "UPnP")
            .await
            .unwrap();

        let upnp = media
            .get_media_files(&MediaFilter {
                share_name: Some("UPnP".to_string()),
                ..MediaFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(upnp.len(), 1);
        assert_eq!(upnp[0].name, "c.mp4");

        let stats = media.get_cache_stats().await.unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.shares.get("media"), Some(&1));
        assert_eq!(stats.file_types.get("video"), Some(&2));
    }

    #[tokio::test]
    async fn test_filters() {
        let (media, _) = repos().await;
        media
            .cache_media_files(
                &[
                    upnp_file("1", "Holiday 2023.mp4", "video/mp4"),
                    upnp_file("2", "Holiday Song.mp3", "audio/mpeg"),
                    upnp_file("3", "Birthday.mp4", "video/mp4"),
                ],
                "UPnP",
            )
            .await
            .unwrap();

        let videos = media
            .get_media_files(&MediaFilter {
                file_type: Some(FileType::Video),
                ..MediaFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(videos.len(), 2);

        let holiday_videos = media
            .get_media_files(&MediaFilter {
                file_type: Some(FileType::Video),
                search: Some("Holiday".to_string()),
                ..MediaFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(holiday_videos.len(), 1);
        assert_eq!(holiday_videos[0].name, "Holiday 2023.mp4");
    }

    #[tokio::test]
    async fn test_playlist_crud() {
        let (_, playlists) = repos().await;
        let paths = vec!["http://nas/1".to_string(), "http://nas/2".to_string()];

        let created = playlists
            .create_playlist("Favourites", Some("Best of"), &paths)
            .await
            .unwrap();
        assert_eq!(created.file_paths, paths);

        // names are unique
        assert!(playlists.create_playlist("Favourites", None, &[]).await.is_err());

        let fetched = playlists.get_playlist(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(playlists.get_playlists().await.unwrap().len(), 1);

        assert!(playlists.delete_playlist(created.id).await.unwrap());
        assert!(!playlists.delete_playlist(created.id).await.unwrap());
        assert!(playlists.get_playlist(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_file_rolls_back_the_whole_batch() {
        let (media, _) = repos().await;
        media
            .cache_media_files(&[upnp_file("1", "Kept.mp3", "audio/mpeg")], "UPnP")
            .await
            .unwrap();

        let mut huge = upnp_file("2", "Huge.mkv", "video/x-matroska");
        huge.size = u64::MAX;
        let result = media
            .cache_media_files(&[upnp_file("3", "New.mp3", "audio/mpeg"), huge], "UPnP")
            .await;
        assert!(result.is_err());

        let cached = media.get_media_files(&MediaFilter::default()).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].name, "Kept.mp3");
    }

    #[tokio::test]
    async fn test_save_spec_replaces_by_name() {
        let (_, playlists) = repos().await;
        let mut spec = PlaylistSpec {
            name: "All VIDEO Files".to_string(),
            description: "Auto-generated playlist for all video files".to_string(),
            file_paths: vec!["http://nas/1".to_string()],
        };

        let first = playlists.save_spec(&spec).await.unwrap();
        spec.file_paths.push("http://nas/2".to_string());
        let second = playlists.save_spec(&spec).await.unwrap();

        assert_eq!(first, second);
        let stored = playlists.get_playlist(first).await.unwrap().unwrap();
        assert_eq!(stored.file_paths.len(), 2);
    }
}
