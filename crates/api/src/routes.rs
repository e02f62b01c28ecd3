/// Route handlers for the catalog API

use crate::service::CatalogService;
use crate::types::*;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use nas_catalog_core::{CatalogError, FileType, MediaFilter};
use nas_catalog_playlist::M3U_CONTENT_TYPE;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CatalogService>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/health/detailed", get(detailed_health_check))
        .route("/scan", post(trigger_scan))
        .route("/upnp/server", get(get_server_info))
        .route("/upnp/discover", get(discover_servers))
        .route("/upnp/reconnect", post(reconnect))
        .route("/media", get(list_media))
        .route("/stats", get(get_stats))
        .route("/playlists", get(list_playlists).post(create_playlist))
        .route("/playlists/auto/generate", get(generate_playlists))
        .route("/playlists/:id", get(get_playlist).delete(delete_playlist))
        .route("/playlists/:id/download", get(download_playlist))
        // browser front-ends may run on any origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(status: StatusCode, error: &str, details: Option<String>) -> Response {
    let response = ErrorResponse {
        error: error.to_string(),
        details,
    };
    (status, Json(response)).into_response()
}

fn internal_error(context: &str, e: anyhow::Error) -> Response {
    error!("{}: {:#}", context, e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, context, Some(format!("{:#}", e)))
}

fn catalog_error_status(e: &CatalogError) -> StatusCode {
    match e {
        CatalogError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
        CatalogError::NoServersDiscovered | CatalogError::ServerNotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::Config(_) => StatusCode::BAD_REQUEST,
    }
}

fn message(text: impl Into<String>) -> Json<MessageResponse> {
    Json(MessageResponse { message: text.into() })
}

/// GET / - Server information
async fn root(State(state): State<AppState>) -> Response {
    let server = state.service.connected_server().await;

    Json(RootResponse {
        message: "NAS Media Catalog Server (UPnP)".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        upnp_connected: server.is_some(),
        upnp_server: server.map(|s| s.name),
    })
    .into_response()
}

/// GET /health - Fails with 503 unless a UPnP server is connected
async fn health_check(State(state): State<AppState>) -> Response {
    if state.service.session().await.is_none() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "UPnP server not connected", None);
    }
    if !state.service.database_ok().await {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Database unavailable", None);
    }

    Json(HealthResponse {
        status: "healthy".to_string(),
        upnp_connected: true,
        database: "connected".to_string(),
    })
    .into_response()
}

/// GET /health/detailed - Always 200, reports degraded state in the body
async fn detailed_health_check(State(state): State<AppState>) -> Response {
    let service = &state.service;
    let server = service.connected_server().await;
    let database = if service.database_ok().await { "connected" } else { "unavailable" };

    Json(DetailedHealthResponse {
        status: if server.is_some() { "healthy" } else { "degraded" }.to_string(),
        upnp_connected: server.is_some(),
        database: database.to_string(),
        timestamp: Utc::now().timestamp(),
        upnp_error: server.is_none().then(|| "No UPnP server connected".to_string()),
        upnp_server: server.as_ref().map(ServerInfo::from),
        scanning: service.is_scanning(),
        last_scan: service.last_scan().await,
    })
    .into_response()
}

/// POST /scan - Start a scan in the background
async fn trigger_scan(State(state): State<AppState>) -> Response {
    info!("POST /scan");

    if state.service.session().await.is_none() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "UPnP server not connected", None);
    }
    if !state.service.spawn_scan() {
        return error_response(StatusCode::CONFLICT, "A scan is already running", None);
    }

    (StatusCode::ACCEPTED, message("UPnP media scan started in background")).into_response()
}

/// GET /upnp/server - The connected server
async fn get_server_info(State(state): State<AppState>) -> Response {
    match state.service.connected_server().await {
        Some(server) => Json(ServerInfo::from(&server)).into_response(),
        None => error_response(StatusCode::SERVICE_UNAVAILABLE, "UPnP server not connected", None),
    }
}

/// GET /upnp/discover - Run a fresh discovery
async fn discover_servers(State(state): State<AppState>) -> Response {
    debug!("GET /upnp/discover");

    let servers: Vec<ServerInfo> = state
        .service
        .discover_servers()
        .await
        .iter()
        .map(ServerInfo::from)
        .collect();

    Json(DiscoverResponse {
        count: servers.len(),
        servers,
    })
    .into_response()
}

/// POST /upnp/reconnect - Rediscover and reconnect, optionally by name
async fn reconnect(State(state): State<AppState>, Query(query): Query<ReconnectQuery>) -> Response {
    info!("POST /upnp/reconnect: {:?}", query.server_name);

    let name = query.server_name.as_deref().filter(|n| !n.is_empty());
    match state.service.connect(name).await {
        Ok(server) => Json(ReconnectResponse {
            message: "Successfully reconnected to UPnP server".to_string(),
            server: ServerInfo::from(&server),
        })
        .into_response(),
        Err(e) => {
            error!("Failed to reconnect: {}", e);
            error_response(catalog_error_status(&e), "Failed to reconnect", Some(e.to_string()))
        }
    }
}

/// GET /media - Cached media files with optional filters
async fn list_media(State(state): State<AppState>, Query(query): Query<MediaQuery>) -> Response {
    debug!("GET /media: {:?}", query);

    let file_type = match query.file_type.as_deref().map(str::parse::<FileType>).transpose() {
        Ok(file_type) => file_type,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid file_type", Some(e.to_string()));
        }
    };

    let filter = MediaFilter {
        share_name: query.share_name,
        file_type,
        search: query.search.filter(|s| !s.is_empty()),
    };

    match state.service.media().get_media_files(&filter).await {
        Ok(files) => Json(files).into_response(),
        Err(e) => internal_error("Failed to get media files", e),
    }
}

/// GET /stats - Cache statistics
async fn get_stats(State(state): State<AppState>) -> Response {
    match state.service.media().get_cache_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => internal_error("Failed to get cache stats", e),
    }
}

/// POST /playlists - Create a playlist
async fn create_playlist(
    State(state): State<AppState>,
    Json(req): Json<CreatePlaylistRequest>,
) -> Response {
    info!("POST /playlists: {}", req.name);

    let repo = state.service.playlists();
    match repo.get_playlists().await {
        Ok(existing) if existing.iter().any(|p| p.name == req.name) => {
            return error_response(
                StatusCode::CONFLICT,
                "Playlist already exists",
                Some(req.name),
            );
        }
        Ok(_) => {}
        Err(e) => return internal_error("Failed to create playlist", e),
    }

    match repo
        .create_playlist(&req.name, req.description.as_deref(), &req.file_paths)
        .await
    {
        Ok(playlist) => (StatusCode::CREATED, Json(playlist)).into_response(),
        Err(e) => internal_error("Failed to create playlist", e),
    }
}

/// GET /playlists
async fn list_playlists(State(state): State<AppState>) -> Response {
    match state.service.playlists().get_playlists().await {
        Ok(playlists) => Json(playlists).into_response(),
        Err(e) => internal_error("Failed to get playlists", e),
    }
}

/// GET /playlists/:id
async fn get_playlist(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.service.playlists().get_playlist(id).await {
        Ok(Some(playlist)) => Json(playlist).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Playlist not found", None),
        Err(e) => internal_error("Failed to get playlist", e),
    }
}

/// DELETE /playlists/:id
async fn delete_playlist(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    info!("DELETE /playlists/{}", id);

    match state.service.playlists().delete_playlist(id).await {
        Ok(true) => message("Playlist deleted successfully").into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Playlist not found", None),
        Err(e) => internal_error("Failed to delete playlist", e),
    }
}

/// GET /playlists/:id/download - The playlist as a VLC-friendly M3U file
async fn download_playlist(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    debug!("GET /playlists/{}/download", id);

    match state.service.export_playlist(id).await {
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Playlist not found", None),
        Ok(Some(export)) if export.matched == 0 => error_response(
            StatusCode::NOT_FOUND,
            "No media files found for this playlist",
            None,
        ),
        Ok(Some(export)) => (
            [
                (header::CONTENT_TYPE, M3U_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", export.file_name),
                ),
            ],
            export.content,
        )
            .into_response(),
        Err(e) => internal_error("Failed to download playlist", e),
    }
}

/// GET /playlists/auto/generate - Compose playlists from the cache
async fn generate_playlists(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
) -> Response {
    info!("GET /playlists/auto/generate (save: {})", query.save);

    match state.service.generate_playlists(query.save).await {
        Ok(composed) => Json(GeneratedPlaylistsResponse {
            total: composed.len(),
            auto_playlists: composed.auto,
            smart_playlists: composed.smart,
        })
        .into_response(),
        Err(e) => internal_error("Failed to generate playlists", e),
    }
}
