/// SMB URLs for cached UPnP items
///
/// VLC plays SMB shares more reliably than some UPnP servers. The mapping
/// assumes the media sits directly in a `Media` share on the configured
/// host and reuses the file name from the UPnP resource URL.

use nas_catalog_core::{MediaFile, MediaItemSource, SmbSettings};
use tracing::debug;

/// Map a UPnP resource URL onto the SMB share, if SMB is configured
pub fn to_smb_url(upnp_url: &str, smb: &SmbSettings) -> Option<String> {
    if !smb.is_configured() || upnp_url.is_empty() {
        return None;
    }

    let last_segment = upnp_url.rsplit('/').next().unwrap_or(upnp_url);
    let file_name = last_segment.split('?').next().unwrap_or(last_segment);
    if file_name.is_empty() {
        return None;
    }

    let decoded = urlencoding::decode(file_name)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| file_name.to_string());
    let encoded = urlencoding::encode(&decoded);

    let auth = if smb.password.is_empty() {
        format!("{}@", smb.username)
    } else {
        format!("{}:{}@", smb.username, smb.password)
    };

    Some(format!("smb://{}{}/Media/{}", auth, smb.hostname, encoded))
}

/// Fill in `smb_url` for every UPnP-sourced file
pub fn apply_smb_urls(files: &mut [MediaFile], smb: &SmbSettings) {
    if !smb.is_configured() {
        return;
    }

    for file in files.iter_mut() {
        if let MediaItemSource::Upnp { .. } = file.source {
            file.smb_url = to_smb_url(&file.path, smb);
            if let Some(url) = &file.smb_url {
                debug!("Generated SMB URL for {}: {}", file.name, url);
            }
        }
    }
}
