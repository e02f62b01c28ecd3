//! REST API against a loopback ContentDirectory server and an in-memory cache

use axum::routing::{get, post};
use axum::Router;
use nas_catalog_api::{ApiServer, CatalogService, GeneratedPlaylistsResponse, ServerInfo};
use nas_catalog_core::{DiscoveredDevice, MediaFile, Playlist, Settings};
use nas_catalog_persistence::{init_memory_db, CacheStats};
use nas_catalog_upnp::{resolve, UpnpSession};
use reqwest::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;

const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
    <friendlyName>Test NAS</friendlyName>
    <UDN>uuid:test-nas</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
        <controlURL>/cds</controlURL>
      </service>
    </serviceList>
  </device>
</root>"#;

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn container(id: &str, title: &str) -> String {
    format!(
        r#"<container id="{}"><dc:title>{}</dc:title><upnp:class>object.container</upnp:class></container>"#,
        id, title
    )
}

fn item(id: &str, title: &str, mime: &str) -> String {
    format!(
        r#"<item id="{id}"><dc:title>{title}</dc:title><upnp:class>object.item</upnp:class><res protocolInfo="http-get:*:{mime}:*" size="4096">http://127.0.0.1:1/media/{id}</res></item>"#
    )
}

fn browse_response(entries: &[String]) -> String {
    let didl = format!(
        r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">{}</DIDL-Lite>"#,
        entries.concat()
    );
    format!(
        r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
<s:Body><u:BrowseResponse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">
<Result>{}</Result><NumberReturned>{}</NumberReturned><TotalMatches>{}</TotalMatches><UpdateID>1</UpdateID>
</u:BrowseResponse></s:Body></s:Envelope>"#,
        escape(&didl),
        entries.len(),
        entries.len()
    )
}

async fn cds(body: String) -> String {
    if body.contains("<ObjectID>0</ObjectID>") {
        browse_response(&[container("1", "Movies"), container("2", "Music")])
    } else if body.contains("<ObjectID>1</ObjectID>") {
        browse_response(&[
            item("v1", "Holiday.mp4", "video/mp4"),
            item("v2", "Trip.mkv", "video/x-matroska"),
        ])
    } else if body.contains("<ObjectID>2</ObjectID>") {
        browse_response(&[item("a1", "Song.mp3", "audio/mpeg")])
    } else {
        browse_response(&[])
    }
}

async fn start_media_server() -> SocketAddr {
    let app = Router::new()
        .route("/desc.xml", get(|| async { DESCRIPTION }))
        .route("/cds", post(cds));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connected_session(media_addr: SocketAddr) -> UpnpSession {
    let client = reqwest::Client::new();
    let device = DiscoveredDevice {
        location: format!("http://{}/desc.xml", media_addr),
        server_header: "Linux UPnP/1.0 test".to_string(),
        search_target: "urn:schemas-upnp-org:device:MediaServer:1".to_string(),
        unique_service_name: "uuid:test-nas".to_string(),
    };
    let server = resolve(&client, &device).await.expect("server should resolve");
    UpnpSession::from_servers(client, vec![server]).select(None).unwrap()
}

async fn start_api() -> (Arc<CatalogService>, ApiServer, String) {
    let pool = init_memory_db().await.unwrap();
    let service = Arc::new(CatalogService::new(Settings::default(), pool));
    let mut api = ApiServer::new("127.0.0.1:0".parse().unwrap(), service.clone());
    api.start().await.unwrap();
    let base = format!("http://{}", api.addr());
    (service, api, base)
}

#[tokio::test]
async fn health_reflects_connection_state() {
    let media_addr = start_media_server().await;
    let (service, _api, base) = start_api().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let detailed: serde_json::Value = client
        .get(format!("{}/health/detailed", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detailed["status"], "degraded");
    assert_eq!(detailed["upnp_error"], "No UPnP server connected");

    let resp = client.post(format!("{}/scan", base)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    service.set_session(connected_session(media_addr).await).await.unwrap();

    let resp = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let info: ServerInfo = client
        .get(format!("{}/upnp/server", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info.name, "Test NAS");
    assert_eq!(info.content_directory_url, format!("http://{}/cds", media_addr));

    let root: serde_json::Value = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert_eq!(root["upnp_connected"], true);
    assert_eq!(root["upnp_server"], "Test NAS");
}

#[tokio::test]
async fn scan_then_query_media_and_playlists() {
    let media_addr = start_media_server().await;
    let (service, _api, base) = start_api().await;
    let client = reqwest::Client::new();

    service.set_session(connected_session(media_addr).await).await.unwrap();
    let summary = service.scan().await.unwrap();
    assert_eq!(summary.cached, 3);
    assert_eq!(summary.containers_browsed, 3);

    let videos: Vec<MediaFile> = client
        .get(format!("{}/media?file_type=video", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(videos.len(), 2);
    assert_eq!(videos[0].name, "Holiday.mp4");
    assert_eq!(videos[0].directory.as_deref(), Some("Movies"));

    let resp = client.get(format!("{}/media?file_type=image", base)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let stats: CacheStats = client
        .get(format!("{}/stats", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.shares.get("UPnP"), Some(&3));

    let body = serde_json::json!({
        "name": "Road Trip",
        "description": "For the car",
        "file_paths": [videos[1].path, videos[0].path],
    });
    let resp = client.post(format!("{}/playlists", base)).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let playlist: Playlist = resp.json().await.unwrap();

    let resp = client.post(format!("{}/playlists", base)).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = client
        .get(format!("{}/playlists/{}/download", base, playlist.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "audio/x-mpegurl");
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"Road Trip.vlc.m3u\""
    );
    let m3u = resp.text().await.unwrap();
    assert!(m3u.starts_with("#EXTM3U\n#PLAYLIST:Road Trip\n# For the car\n"));
    let trip = m3u.find("#EXTINF:-1,Trip").unwrap();
    let holiday = m3u.find("#EXTINF:-1,Holiday").unwrap();
    assert!(trip < holiday);

    let resp = client.get(format!("{}/playlists/9999", base)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let generated: GeneratedPlaylistsResponse = client
        .get(format!("{}/playlists/auto/generate?save=true", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(generated.auto_playlists.iter().any(|p| p.name == "All VIDEO Files"));
    assert!(generated.smart_playlists.iter().any(|p| p.name == "Recently Added"));
    assert_eq!(generated.total, generated.auto_playlists.len() + generated.smart_playlists.len());

    let playlists: Vec<Playlist> = client
        .get(format!("{}/playlists", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(playlists.len(), 1 + generated.total);

    let resp = client
        .delete(format!("{}/playlists/{}", base, playlist.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = client
        .delete(format!("{}/playlists/{}", base, playlist.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn background_scan_is_accepted() {
    let media_addr = start_media_server().await;
    let (service, _api, base) = start_api().await;
    service.set_session(connected_session(media_addr).await).await.unwrap();

    let resp = reqwest::Client::new()
        .post(format!("{}/scan", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    for _ in 0..50 {
        if service.last_scan().await.is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert_eq!(service.last_scan().await.map(|s| s.cached), Some(3));
}

#[tokio::test]
async fn cross_origin_requests_are_allowed() {
    let (_service, _api, base) = start_api().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/stats", base))
        .header("Origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("{}/playlists", base))
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();
    assert!(preflight.status().is_success());
    assert!(preflight.headers().contains_key("access-control-allow-methods"));
}
