use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// SSDP search target for UPnP media servers
pub const MEDIA_SERVER_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:MediaServer:1";

/// Container id of the ContentDirectory root
pub const ROOT_CONTAINER_ID: &str = "0";

/// MIME types the catalog accepts from DIDL-Lite resources
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/avi",
    "video/x-msvideo",
    "video/quicktime",
    "video/x-ms-wmv",
    "video/x-flv",
    "video/webm",
    "video/x-matroska",
    "audio/mpeg",
    "audio/mp3",
    "audio/flac",
    "audio/wav",
    "audio/aac",
    "audio/ogg",
    "audio/x-ms-wma",
    "audio/mp4",
];

/// Whether a MIME type is in the supported set (exact match, case-insensitive)
pub fn is_supported_mime_type(mime_type: &str) -> bool {
    let mime_type = mime_type.trim();
    SUPPORTED_MIME_TYPES
        .iter()
        .any(|m| m.eq_ignore_ascii_case(mime_type))
}

/// One unique SSDP reply collected during a discovery run
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// URL of the device description XML
    pub location: String,
    pub server_header: String,
    pub search_target: String,
    pub unique_service_name: String,
}

impl DiscoveredDevice {
    /// Identity of a reply within one discovery run
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.location, &self.unique_service_name)
    }
}

/// A UPnP media server exposing a ContentDirectory service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaServer {
    pub name: String,
    pub udn: String,
    /// Location of the device description the server was resolved from
    pub base_url: String,
    /// Absolute ContentDirectory control URL
    pub content_directory_control_url: String,
    pub raw_device_info: DiscoveredDevice,
}

/// A DIDL-Lite container (browsable folder)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub title: String,
    pub class: String,
}

/// A playable DIDL-Lite item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    pub mime_type: String,
    pub resource_url: String,
    pub size_bytes: Option<u64>,
    pub duration: Option<String>,
    /// Titles of the containers between the walk root and this item
    #[serde(default)]
    pub container_path: Vec<String>,
}

impl MediaItem {
    pub fn file_type(&self) -> FileType {
        FileType::from_mime(&self.mime_type)
    }
}

/// One entry of a Browse result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogEntry {
    Container(Container),
    Item(MediaItem),
}

impl CatalogEntry {
    pub fn id(&self) -> &str {
        match self {
            CatalogEntry::Container(c) => &c.id,
            CatalogEntry::Item(i) => &i.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            CatalogEntry::Container(c) => &c.title,
            CatalogEntry::Item(i) => &i.title,
        }
    }
}

/// Counters describing how a catalog walk went
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkReport {
    /// Containers a Browse request was issued for
    pub containers_browsed: usize,
    /// Browsed containers that came back empty (no children or a failed request)
    pub empty_containers: usize,
    /// Containers not browsed because the visit cap was reached
    pub containers_skipped: usize,
}

/// Media items from one full walk, in DFS pre-order.
///
/// Not deduplicated: the same resource URL can show up under several
/// containers. Use [`CatalogSnapshot::deduplicated`] to collapse them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub items: Vec<MediaItem>,
    pub report: WalkReport,
}

impl CatalogSnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keep the first item seen for each resource URL; returns the items and
    /// the number of dropped duplicates
    pub fn deduplicated(&self) -> (Vec<MediaItem>, usize) {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if seen.insert(item.resource_url.as_str()) {
                unique.push(item.clone());
            }
        }
        let dropped = self.items.len() - unique.len();
        (unique, dropped)
    }
}

/// Broad media category derived from a MIME type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Video,
    Audio,
    Unknown,
}

impl FileType {
    /// Classify by MIME prefix, ignoring case
    pub fn from_mime(mime_type: &str) -> Self {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        if mime_type.starts_with("video/") {
            FileType::Video
        } else if mime_type.starts_with("audio/") {
            FileType::Audio
        } else {
            FileType::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Video => "video",
            FileType::Audio => "audio",
            FileType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for invalid file type strings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseFileTypeError;

impl std::fmt::Display for ParseFileTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid file type value")
    }
}

impl std::error::Error for ParseFileTypeError {}

impl FromStr for FileType {
    type Err = ParseFileTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "video" => Ok(FileType::Video),
            "audio" => Ok(FileType::Audio),
            "unknown" => Ok(FileType::Unknown),
            _ => Err(ParseFileTypeError),
        }
    }
}

/// Where a cached media file came from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaItemSource {
    /// Found by browsing a UPnP ContentDirectory
    Upnp {
        item_id: String,
        mime_type: String,
        duration: Option<String>,
    },
    /// Found by walking an SMB share
    Smb { share_path: String },
}

impl MediaItemSource {
    pub fn kind(&self) -> &'static str {
        match self {
            MediaItemSource::Upnp { .. } => "upnp",
            MediaItemSource::Smb { .. } => "smb",
        }
    }
}

/// A cached media file, the unit playlists are built from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: Option<i64>,
    /// Resource URL for UPnP items, UNC path for SMB items
    pub path: String,
    pub name: String,
    pub size: u64,
    /// Unix seconds; the caching time for UPnP items
    pub modified_time: i64,
    pub file_type: FileType,
    pub share_name: String,
    /// Top-level directory used for directory playlists
    pub directory: Option<String>,
    pub smb_url: Option<String>,
    pub source: MediaItemSource,
}

impl MediaFile {
    /// Build a cache record from a browsed UPnP item
    pub fn from_upnp(item: &MediaItem, share_name: &str, cached_at: i64) -> Self {
        Self {
            id: None,
            path: item.resource_url.clone(),
            name: item.title.clone(),
            size: item.size_bytes.unwrap_or(0),
            modified_time: cached_at,
            file_type: item.file_type(),
            share_name: share_name.to_string(),
            directory: item.container_path.first().cloned(),
            smb_url: None,
            source: MediaItemSource::Upnp {
                item_id: item.id.clone(),
                mime_type: item.mime_type.clone(),
                duration: item.duration.clone(),
            },
        }
    }

    /// Build a cache record from an SMB listing entry (`\\host\share\dir\file.ext`)
    pub fn from_smb(
        unc_path: &str,
        size: u64,
        modified_time: i64,
        share_name: &str,
    ) -> Self {
        let name = unc_path
            .rsplit('\\')
            .next()
            .unwrap_or(unc_path)
            .to_string();
        let file_type = extension_of(&name)
            .map(|ext| FileType::from_extension(&ext))
            .unwrap_or(FileType::Unknown);

        Self {
            id: None,
            path: unc_path.to_string(),
            name,
            size,
            modified_time,
            file_type,
            share_name: share_name.to_string(),
            directory: smb_top_level_directory(unc_path),
            smb_url: None,
            source: MediaItemSource::Smb {
                share_path: unc_path.to_string(),
            },
        }
    }

    /// Lowercased extension of the file name, if any
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }

    /// File name without its extension
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(pos) if pos > 0 => &self.name[..pos],
            _ => &self.name,
        }
    }
}

/// Extensions recognised as audio
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "aac", "ogg", "wma", "m4a"];

/// Extensions recognised as video
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v"];

impl FileType {
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            FileType::Video
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            FileType::Audio
        } else {
            FileType::Unknown
        }
    }
}

fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// `\\host\share\dir\...` splits into `["", "", host, share, dir, ...]`;
/// component 3 names the grouping directory when there are more than 3.
fn smb_top_level_directory(unc_path: &str) -> Option<String> {
    let parts: Vec<&str> = unc_path.split('\\').collect();
    if parts.len() > 3 && !parts[3].is_empty() {
        Some(parts[3].to_string())
    } else {
        None
    }
}

/// A playlist definition produced by the composer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSpec {
    pub name: String,
    pub description: String,
    pub file_paths: Vec<String>,
}

/// A stored playlist
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub file_paths: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Query filter for cached media files
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFilter {
    pub share_name: Option<String>,
    pub file_type: Option<FileType>,
    /// Substring of the file name
    pub search: Option<String>,
}
