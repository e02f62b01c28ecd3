use nas_catalog_core::{CatalogSnapshot, FileType, MediaFile, PlaylistSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::scoring::{CompatibilityPolicy, DlnaHeuristicPolicy};

/// Window for "Recently Added", in seconds
pub const RECENT_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;

/// Size above which a file counts as large (100 MiB)
pub const LARGE_FILE_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedPlaylists {
    pub auto: Vec<PlaylistSpec>,
    pub smart: Vec<PlaylistSpec>,
}

impl ComposedPlaylists {
    pub fn len(&self) -> usize {
        self.auto.len() + self.smart.len()
    }

    pub fn is_empty(&self) -> bool {
        self.auto.is_empty() && self.smart.is_empty()
    }

    /// Auto playlists followed by smart ones
    pub fn into_all(self) -> Vec<PlaylistSpec> {
        self.auto.into_iter().chain(self.smart).collect()
    }
}

/// Builds auto and smart playlists using a pluggable compatibility policy
pub struct PlaylistComposer {
    policy: Box<dyn CompatibilityPolicy>,
}

impl Default for PlaylistComposer {
    fn default() -> Self {
        Self::new(Box::new(DlnaHeuristicPolicy::default()))
    }
}

impl PlaylistComposer {
    pub fn new(policy: Box<dyn CompatibilityPolicy>) -> Self {
        Self { policy }
    }

    /// Compose playlists over `files`; `now` is the composition time in
    /// unix seconds
    pub fn compose(&self, files: &[MediaFile], now: i64) -> ComposedPlaylists {
        let composed = ComposedPlaylists {
            auto: self.auto_playlists(files),
            smart: self.smart_playlists(files, now),
        };
        debug!(
            "Composed {} auto and {} smart playlist(s) from {} file(s)",
            composed.auto.len(),
            composed.smart.len(),
            files.len()
        );
        composed
    }

    /// One playlist per file type and per top-level directory, each only
    /// when it has more than one member
    pub fn auto_playlists(&self, files: &[MediaFile]) -> Vec<PlaylistSpec> {
        let mut playlists = Vec::new();

        for (file_type, paths) in group_by(files, |f| Some(f.file_type)) {
            if paths.len() > 1 {
                playlists.push(PlaylistSpec {
                    name: format!("All {} Files", file_type.as_str().to_uppercase()),
                    description: format!("Auto-generated playlist for all {} files", file_type),
                    file_paths: paths,
                });
            }
        }

        for (directory, paths) in group_by(files, |f| f.directory.clone()) {
            if paths.len() > 1 {
                playlists.push(PlaylistSpec {
                    name: format!("Directory: {}", directory),
                    description: format!("Auto-generated playlist for directory '{}'", directory),
                    file_paths: paths,
                });
            }
        }

        playlists
    }

    pub fn smart_playlists(&self, files: &[MediaFile], now: i64) -> Vec<PlaylistSpec> {
        let mut playlists = Vec::new();
        let mut push = |name: &str, description: &str, file_paths: Vec<String>| {
            if !file_paths.is_empty() {
                playlists.push(PlaylistSpec {
                    name: name.to_string(),
                    description: description.to_string(),
                    file_paths,
                });
            }
        };

        let recent_threshold = now - RECENT_WINDOW_SECS;
        push(
            "Recently Added",
            "Files added in the last 30 days",
            paths_where(files, |f| f.modified_time > recent_threshold),
        );

        push(
            "Large Files",
            "Files larger than 100MB",
            paths_where(files, |f| f.size > LARGE_FILE_BYTES),
        );

        push(
            "Audio Collection",
            "All audio files",
            paths_where(files, |f| is_collection_member(f, FileType::Audio)),
        );

        push(
            "Video Collection",
            "All video files",
            paths_where(files, |f| is_collection_member(f, FileType::Video)),
        );

        push(
            "UPnP Compatible Videos",
            "Video files optimized for reliable UPnP/DLNA playback in VLC",
            self.policy
                .select(files)
                .into_iter()
                .map(|f| f.path.clone())
                .collect(),
        );

        playlists
    }
}

/// Compose with the default compatibility policy
pub fn compose(files: &[MediaFile], now: i64) -> ComposedPlaylists {
    PlaylistComposer::default().compose(files, now)
}

/// Compose straight from a walk result, treating every item as cached at `now`
pub fn compose_snapshot(snapshot: &CatalogSnapshot, share_name: &str, now: i64) -> ComposedPlaylists {
    let (items, _) = snapshot.deduplicated();
    let files: Vec<MediaFile> = items
        .iter()
        .map(|item| MediaFile::from_upnp(item, share_name, now))
        .collect();
    compose(&files, now)
}

/// Member by MIME-derived type, or by extension when the type is unknown
fn is_collection_member(file: &MediaFile, file_type: FileType) -> bool {
    file.file_type == file_type
        || file
            .extension()
            .map(|ext| FileType::from_extension(&ext) == file_type)
            .unwrap_or(false)
}

fn paths_where<F>(files: &[MediaFile], predicate: F) -> Vec<String>
where
    F: Fn(&MediaFile) -> bool,
{
    files
        .iter()
        .filter(|f| predicate(f))
        .map(|f| f.path.clone())
        .collect()
}

/// Group paths by key, keeping groups in first-seen order
fn group_by<K, F>(files: &[MediaFile], key: F) -> Vec<(K, Vec<String>)>
where
    K: std::hash::Hash + Eq + Clone,
    F: Fn(&MediaFile) -> Option<K>,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<String>)> = Vec::new();

    for file in files {
        let Some(k) = key(file) else { continue };
        let slot = *index.entry(k.clone()).or_insert_with(|| {
            groups.push((k, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(file.path.clone());
    }

    groups
}
