//! Playlist composition and M3U serialization
//!
//! - [`compose`] groups cached media files into auto and smart playlists
//! - [`CompatibilityPolicy`] ranks videos for UPnP playback in VLC
//! - [`generate_m3u`] / [`parse_m3u`] write and read VLC-friendly M3U
//! - [`to_smb_url`] maps UPnP resource URLs onto an SMB share

pub mod composer;
pub mod m3u;
pub mod scoring;
pub mod smb;

pub use composer::{compose, compose_snapshot, ComposedPlaylists, PlaylistComposer};
pub use m3u::{
    generate_m3u, parse_m3u, playlist_file_name, sanitize_title, M3uEntry, M3uPlaylist, M3U_CONTENT_TYPE,
};
pub use scoring::{CompatibilityPolicy, DlnaHeuristicPolicy, ScoreWeights, ScoringContext};
pub use smb::{apply_smb_urls, to_smb_url};
