/// DIDL-Lite parsing for ContentDirectory Browse results
///
/// Elements are matched by namespace and local name, so any prefix the
/// server picks is accepted. Unqualified elements are accepted too, since
/// some embedded servers omit the namespace declarations.

use nas_catalog_core::{is_supported_mime_type, CatalogEntry, Container, MediaItem};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use tracing::debug;

use crate::error::BrowseError;

pub const DIDL_NS: &[u8] = b"urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/";
pub const DC_NS: &[u8] = b"http://purl.org/dc/elements/1.1/";
pub const UPNP_NS: &[u8] = b"urn:schemas-upnp-org:metadata-1-0/upnp/";

/// Entry being assembled between its start and end tags
enum Pending {
    Container(Container),
    Item {
        id: String,
        title: Option<String>,
        res: Option<Resource>,
    },
}

#[derive(Default)]
struct Resource {
    url: String,
    protocol_info: String,
    size: Option<u64>,
    duration: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Title,
    Class,
    Res,
}

/// Parse a DIDL-Lite document into catalog entries, in document order.
///
/// Items are kept only when their first `res` has a non-empty URL and a
/// supported MIME type (third field of `protocolInfo`).
pub fn parse_didl(xml: &str) -> Result<Vec<CatalogEntry>, BrowseError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut pending: Option<Pending> = None;
    let mut field = Field::None;
    let mut text = String::new();

    loop {
        let (ns, event) = reader.read_resolved_event().map_err(BrowseError::xml)?;

        match event {
            Event::Start(e) => {
                match e.local_name().as_ref() {
                    b"container" if pending.is_none() && in_ns(&ns, DIDL_NS) => {
                        pending = Some(Pending::Container(Container {
                            id: attribute(&e, b"id")?.unwrap_or_default(),
                            title: String::new(),
                            class: String::new(),
                        }));
                    }
                    b"item" if pending.is_none() && in_ns(&ns, DIDL_NS) => {
                        pending = Some(Pending::Item {
                            id: attribute(&e, b"id")?.unwrap_or_default(),
                            title: None,
                            res: None,
                        });
                    }
                    b"title" if pending.is_some() && in_ns(&ns, DC_NS) => field = Field::Title,
                    b"class" if pending.is_some() && in_ns(&ns, UPNP_NS) => field = Field::Class,
                    b"res" if in_ns(&ns, DIDL_NS) => {
                        if let Some(Pending::Item { res: res @ None, .. }) = pending.as_mut() {
                            *res = Some(resource_attributes(&e)?);
                            field = Field::Res;
                        }
                    }
                    _ => {}
                }
                text.clear();
            }
            Event::Empty(e) => match e.local_name().as_ref() {
                b"container" if pending.is_none() && in_ns(&ns, DIDL_NS) => {
                    entries.push(CatalogEntry::Container(Container {
                        id: attribute(&e, b"id")?.unwrap_or_default(),
                        title: "Unknown".to_string(),
                        class: String::new(),
                    }));
                }
                b"res" if in_ns(&ns, DIDL_NS) => {
                    // an empty res still counts as the first one
                    if let Some(Pending::Item { res: res @ None, .. }) = pending.as_mut() {
                        *res = Some(resource_attributes(&e)?);
                    }
                }
                _ => {}
            },
            Event::Text(e) => {
                if field != Field::None {
                    text.push_str(&e.unescape().map_err(BrowseError::xml)?);
                }
            }
            Event::CData(e) => {
                if field != Field::None {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                let value = text.trim().to_string();

                match (field, pending.as_mut()) {
                    (Field::Title, Some(Pending::Container(c))) if name.as_ref() == b"title" => {
                        c.title = value
                    }
                    (Field::Title, Some(Pending::Item { title, .. })) if name.as_ref() == b"title" => {
                        *title = Some(value)
                    }
                    (Field::Class, Some(Pending::Container(c))) if name.as_ref() == b"class" => {
                        c.class = value
                    }
                    (Field::Res, Some(Pending::Item { res: Some(res), .. })) if name.as_ref() == b"res" => {
                        res.url = value
                    }
                    _ => {}
                }

                if matches!(name.as_ref(), b"title" | b"class" | b"res") {
                    field = Field::None;
                }

                match name.as_ref() {
                    b"container" | b"item" if in_ns(&ns, DIDL_NS) => {
                        if let Some(entry) = pending.take().and_then(finish) {
                            entries.push(entry);
                        }
                    }
                    _ => {}
                }

                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

fn finish(pending: Pending) -> Option<CatalogEntry> {
    match pending {
        Pending::Container(mut container) => {
            if container.title.is_empty() {
                container.title = "Unknown".to_string();
            }
            Some(CatalogEntry::Container(container))
        }
        Pending::Item { id, title, res } => {
            let title = title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Unknown".to_string());

            let Some(res) = res else {
                debug!("Dropping item '{}': no res element", title);
                return None;
            };

            let mime_type = mime_from_protocol_info(&res.protocol_info);
            if res.url.is_empty() {
                debug!("Dropping item '{}': empty resource URL", title);
                return None;
            }
            if mime_type.is_empty() || !is_supported_mime_type(&mime_type) {
                debug!("Dropping item '{}': unsupported MIME type '{}'", title, mime_type);
                return None;
            }

            Some(CatalogEntry::Item(MediaItem {
                id,
                title,
                mime_type,
                resource_url: res.url,
                size_bytes: res.size,
                duration: res.duration,
                container_path: Vec::new(),
            }))
        }
    }
}

/// `http-get:*:video/mp4:*` -> `video/mp4`
pub fn mime_from_protocol_info(protocol_info: &str) -> String {
    protocol_info
        .split(':')
        .nth(2)
        .map(|mime| mime.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn in_ns(resolved: &ResolveResult, expected: &[u8]) -> bool {
    match resolved {
        ResolveResult::Bound(Namespace(ns)) => *ns == expected,
        ResolveResult::Unbound => true,
        ResolveResult::Unknown(_) => false,
    }
}

fn attribute(e: &BytesStart, key: &[u8]) -> Result<Option<String>, BrowseError> {
    for attr in e.attributes() {
        let attr = attr.map_err(BrowseError::xml)?;
        if attr.key.local_name().as_ref() == key {
            let value = attr.unescape_value().map_err(BrowseError::xml)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn resource_attributes(e: &BytesStart) -> Result<Resource, BrowseError> {
    Ok(Resource {
        url: String::new(),
        protocol_info: attribute(e, b"protocolInfo")?.unwrap_or_default(),
        size: attribute(e, b"size")?.and_then(|s| s.trim().parse().ok()),
        duration: attribute(e, b"duration")?.filter(|d| !d.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn didl(body: &str) -> String {
        format!(
            r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">{}</DIDL-Lite>"#,
            body
        )
    }

    #[test]
    fn test_mime_from_protocol_info() {
        assert_eq!(mime_from_protocol_info("http-get:*:video/mp4:*"), "video/mp4");
        assert_eq!(
            mime_from_protocol_info("http-get:*:audio/mpeg:DLNA.ORG_PN=MP3;DLNA.ORG_OP=01"),
            "audio/mpeg"
        );
        assert_eq!(mime_from_protocol_info("http-get:*"), "");
        assert_eq!(mime_from_protocol_info(""), "");
    }

    #[test]
    fn test_parse_containers_and_items_in_document_order() {
        let xml = didl(
            r#"<container id="1" parentID="0" restricted="1">
                 <dc:title>Movies</dc:title>
                 <upnp:class>object.container.storageFolder</upnp:class>
               </container>
               <item id="10" parentID="0" restricted="1">
                 <dc:title>Holiday</dc:title>
                 <upnp:class>object.item.videoItem</upnp:class>
                 <res protocolInfo="http-get:*:video/mp4:*" size="1048576" duration="0:42:00.000">http://nas:49000/m/10.mp4</res>
                 <res protocolInfo="http-get:*:video/x-matroska:*">http://nas:49000/m/10.mkv</res>
               </item>
               <container id="2" parentID="0"><dc:title>Music</dc:title></container>"#,
        );

        let entries = parse_didl(&xml).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(
            entries[0],
            CatalogEntry::Container(Container {
                id: "1".to_string(),
                title: "Movies".to_string(),
                class: "object.container.storageFolder".to_string(),
            })
        );

        match &entries[1] {
            CatalogEntry::Item(item) => {
                assert_eq!(item.id, "10");
                assert_eq!(item.title, "Holiday");
                assert_eq!(item.mime_type, "video/mp4");
                assert_eq!(item.resource_url, "http://nas:49000/m/10.mp4");
                assert_eq!(item.size_bytes, Some(1_048_576));
                assert_eq!(item.duration.as_deref(), Some("0:42:00.000"));
                assert!(item.container_path.is_empty());
            }
            other => panic!("expected item, got {:?}", other),
        }

        assert_eq!(entries[2].title(), "Music");
    }

    #[test]
    fn test_unsupported_or_incomplete_items_are_dropped() {
        let xml = didl(
            r#"<item id="1"><dc:title>Cover</dc:title><res protocolInfo="http-get:*:image/jpeg:*">http://nas/c.jpg</res></item>
               <item id="2"><dc:title>No URL</dc:title><res protocolInfo="http-get:*:video/mp4:*"></res></item>
               <item id="3"><dc:title>No MIME</dc:title><res>http://nas/3.mp4</res></item>
               <item id="4"><dc:title>No res</dc:title></item>
               <item id="5"><dc:title>Song</dc:title><res protocolInfo="http-get:*:audio/flac:*">http://nas/5.flac</res></item>"#,
        );

        let entries = parse_didl(&xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id(), "5");
    }

    #[test]
    fn test_custom_prefixes_and_escaped_urls() {
        let xml = r#"<d:DIDL-Lite xmlns:d="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:t="http://purl.org/dc/elements/1.1/">
            <d:item id="7"><t:title>Tom &amp; Jerry</t:title>
              <d:res protocolInfo="http-get:*:video/avi:*" size="oops">http://nas/get?id=7&amp;fmt=avi</d:res>
            </d:item>
          </d:DIDL-Lite>"#;

        let entries = parse_didl(xml).unwrap();
        match &entries[0] {
            CatalogEntry::Item(item) => {
                assert_eq!(item.title, "Tom & Jerry");
                assert_eq!(item.resource_url, "http://nas/get?id=7&fmt=avi");
                assert_eq!(item.size_bytes, None);
            }
            other => panic!("expected item, got {:?}", other),
        }
    }

    #[test]
    fn test_foreign_namespace_title_is_ignored() {
        let xml = didl(
            r#"<item id="1" xmlns:x="urn:example:other"><x:title>Wrong</x:title>
                 <res protocolInfo="http-get:*:audio/mpeg:*">http://nas/1.mp3</res></item>"#,
        );
        let entries = parse_didl(&xml).unwrap();
        assert_eq!(entries[0].title(), "Unknown");
    }

    #[test]
    fn test_malformed_didl_is_error() {
        assert!(parse_didl("<DIDL-Lite><item></DIDL-Lite>").is_err());
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_didl(&didl("")).unwrap().is_empty());
    }

    #[test]
    fn test_uppercase_mime_is_normalized() {
        let xml = didl(
            r#"<item id="7"><dc:title>Clip</dc:title>
                 <res protocolInfo="http-get:*:Video/MP4:*">http://nas/m/7.mp4</res>
               </item>"#,
        );

        let entries = parse_didl(&xml).unwrap();
        match &entries[0] {
            CatalogEntry::Item(item) => {
                assert_eq!(item.mime_type, "video/mp4");
                assert_eq!(item.file_type(), nas_catalog_core::FileType::Video);
            }
            other => panic!("expected item, got {:?}", other),
        }
    }
}
