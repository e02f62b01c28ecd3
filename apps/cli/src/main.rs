use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nas_catalog_api::{ApiServer, CatalogService};
use nas_catalog_core::Settings;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// NAS Media Catalog - cache UPnP media and build VLC playlists
#[derive(Parser, Debug)]
#[command(name = "nas-catalog", author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "debug,sqlx=warn"; RUST_LOG wins when set
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to a media server and serve the REST API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Skip the startup scan even if enabled in the config
        #[arg(long)]
        no_scan: bool,
    },
    /// List media servers on the local network
    Discover,
    /// Walk a media server and refresh the cache
    Scan {
        /// Server name (substring, case-insensitive)
        #[arg(long)]
        server: Option<String>,
        /// Maximum container depth
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Compose auto and smart playlists from the cache
    Playlists {
        /// Store them in the database
        #[arg(long)]
        save: bool,
    },
    /// Write a stored playlist as M3U
    Export {
        id: i64,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) if !path.exists() => {
            anyhow::bail!("Config file {} does not exist", path.display())
        }
        Some(path) => Some(path.clone()),
        None => Settings::default_config_path(),
    };
    let mut settings = Settings::load(config_path.as_deref())?;

    let level = cli.log_level.clone().unwrap_or_else(|| settings.log_level.clone());
    let _log_guard = init_logging(&level, cli.log_file.as_deref())?;

    tracing::info!("Starting NAS Media Catalog v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        tracing::debug!("Config path: {}", path.display());
    }

    if let Command::Scan { depth: Some(depth), .. } = &cli.command {
        settings.scan.max_depth = *depth;
    }

    let db_path = settings.database_path()?;
    tracing::info!("Database path: {}", db_path.display());
    let pool = nas_catalog_persistence::init_db(&db_path).await?;
    let service = Arc::new(CatalogService::new(settings, pool));

    match cli.command {
        Command::Serve { host, port, no_scan } => serve(service, host, port, no_scan).await,
        Command::Discover => discover(&service).await,
        Command::Scan { server, .. } => scan(&service, server).await,
        Command::Playlists { save } => playlists(&service, save).await,
        Command::Export { id, output } => export(&service, id, output.as_deref()).await,
    }
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().context("Log file path has no file name")?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn serve(
    service: Arc<CatalogService>,
    host: Option<String>,
    port: Option<u16>,
    no_scan: bool,
) -> Result<()> {
    let settings = service.settings();
    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let server_name = Some(settings.upnp.server_name.as_str()).filter(|n| !n.is_empty());
    match service.connect(server_name).await {
        Ok(server) => {
            tracing::info!("UPnP media server connection successful: {}", server.name);
            if settings.scan.auto_scan_on_startup && !no_scan {
                tracing::info!("Starting automatic media scan...");
                service.spawn_scan();
            }
        }
        // keep serving; POST /upnp/reconnect can recover
        Err(e) => tracing::error!("Failed to establish UPnP connection: {}", e),
    }

    let mut server = ApiServer::new(addr, service.clone());
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    server.stop().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn discover(service: &CatalogService) -> Result<()> {
    let servers = service.discover_servers().await;
    if servers.is_empty() {
        println!("No UPnP media servers found");
        return Ok(());
    }

    for server in &servers {
        println!("{}", server.name);
        println!("  UDN:               {}", server.udn);
        println!("  Description:       {}", server.base_url);
        println!("  ContentDirectory:  {}", server.content_directory_control_url);
    }
    println!("{} server(s)", servers.len());
    Ok(())
}

async fn scan(service: &CatalogService, server: Option<String>) -> Result<()> {
    let configured = &service.settings().upnp.server_name;
    let name = server.as_deref().or(Some(configured.as_str())).filter(|n| !n.is_empty());

    let connected = service.connect(name).await?;
    println!("Scanning {}...", connected.name);

    let summary = service.scan().await?;
    println!(
        "Cached {} media files ({} duplicates skipped)",
        summary.cached, summary.duplicates
    );
    println!(
        "Containers: {} browsed, {} empty, {} skipped",
        summary.containers_browsed, summary.empty_containers, summary.containers_skipped
    );
    Ok(())
}

async fn playlists(service: &CatalogService, save: bool) -> Result<()> {
    let composed = service.generate_playlists(save).await?;

    for (kind, specs) in [("auto", &composed.auto), ("smart", &composed.smart)] {
        for spec in specs {
            println!("[{}] {} ({} files)", kind, spec.name, spec.file_paths.len());
        }
    }
    println!(
        "{} playlist(s){}",
        composed.len(),
        if save { " saved" } else { "" }
    );
    Ok(())
}

async fn export(service: &CatalogService, id: i64, output: Option<&Path>) -> Result<()> {
    let export = service
        .export_playlist(id)
        .await?
        .with_context(|| format!("Playlist {} not found", id))?;

    if export.matched < export.expected {
        tracing::warn!(
            "{} of {} playlist entries are not in the cache",
            export.expected - export.matched,
            export.expected
        );
    }

    match output {
        Some(path) => {
            tokio::fs::write(path, &export.content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{}", export.content),
    }
    Ok(())
}
