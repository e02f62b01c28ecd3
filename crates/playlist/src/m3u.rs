/// M3U playlist writer and reader
///
/// Output is tuned for VLC: extended M3U with `#EXTINF:-1,<title>` entries
/// and a comment block explaining how to open the file in VLC rather than
/// the system default player.

use nas_catalog_core::{MediaFile, Playlist, PlaylistSpec};
use std::collections::HashMap;
use tracing::debug;

/// MIME type for serving M3U downloads
pub const M3U_CONTENT_TYPE: &str = "audio/x-mpegurl";

const VLC_HINT: &[&str] = &[
    "# ",
    "# TO OPEN IN VLC:",
    "# • Right-click this file → Open With → VLC",
    "# • OR drag this file into VLC window",
    "# • OR use Terminal: open -a VLC filename.m3u",
    "# (Double-clicking opens Apple Music, not VLC!)",
];

/// The parts of a playlist the writer needs
#[derive(Debug, Clone, Copy)]
pub struct M3uPlaylist<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub file_paths: &'a [String],
}

impl<'a> From<&'a Playlist> for M3uPlaylist<'a> {
    fn from(playlist: &'a Playlist) -> Self {
        Self {
            name: &playlist.name,
            description: playlist.description.as_deref(),
            file_paths: &playlist.file_paths,
        }
    }
}

impl<'a> From<&'a PlaylistSpec> for M3uPlaylist<'a> {
    fn from(spec: &'a PlaylistSpec) -> Self {
        Self {
            name: &spec.name,
            description: Some(spec.description.as_str()),
            file_paths: &spec.file_paths,
        }
    }
}

/// Render `playlist` as M3U.
///
/// Paths missing from `files` are skipped. When `prefer_smb` is set and a
/// file has an SMB URL, that URL is written instead of the UPnP one.
pub fn generate_m3u<'a>(
    playlist: impl Into<M3uPlaylist<'a>>,
    files: &[MediaFile],
    prefer_smb: bool,
) -> String {
    let playlist = playlist.into();
    let mut lines: Vec<String> = vec!["#EXTM3U".to_string(), format!("#PLAYLIST:{}", playlist.name)];

    if let Some(description) = playlist.description.filter(|d| !d.is_empty()) {
        lines.push(format!("# {}", description));
    }
    lines.extend(VLC_HINT.iter().map(|l| l.to_string()));
    lines.push(String::new());

    let lookup: HashMap<&str, &MediaFile> = files.iter().map(|f| (f.path.as_str(), f)).collect();

    for path in playlist.file_paths {
        let Some(file) = lookup.get(path.as_str()) else {
            debug!("Skipping {}: not in cache", path);
            continue;
        };

        lines.push(format!("#EXTINF:-1,{}", sanitize_title(file.stem())));

        let url = match (&file.smb_url, prefer_smb) {
            (Some(smb_url), true) => smb_url.as_str(),
            _ => file.path.as_str(),
        };
        lines.push(url.to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Make a title safe for an `#EXTINF` line
pub fn sanitize_title(title: &str) -> String {
    let sanitized = title
        .replace(" - ", " • ")
        .replace(',', ";")
        .replace(':', ".")
        .replace('#', "No.");
    let sanitized = sanitized.trim();

    if sanitized.is_empty() {
        "Unknown Title".to_string()
    } else {
        sanitized.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M3uEntry {
    /// Title from the preceding `#EXTINF`, if there was one
    pub title: Option<String>,
    pub url: String,
}

/// Read entries back from M3U text, pairing each `#EXTINF` with the next
/// URL line
pub fn parse_m3u(content: &str) -> Vec<M3uEntry> {
    let mut entries = Vec::new();
    let mut title: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if let Some(info) = line.strip_prefix("#EXTINF:") {
            title = info.split_once(',').map(|(_, t)| t.trim().to_string());
        } else if line.is_empty() || line.starts_with('#') {
            continue;
        } else {
            entries.push(M3uEntry {
                title: title.take(),
                url: line.to_string(),
            });
        }
    }

    entries
}

/// Download file name for a playlist: alphanumerics, spaces, `-` and `_`
/// are kept, with a `.vlc.m3u` suffix
pub fn playlist_file_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let safe = safe.trim_end();

    if safe.is_empty() {
        "playlist.vlc.m3u".to_string()
    } else {
        format!("{}.vlc.m3u", safe)
    }
}
