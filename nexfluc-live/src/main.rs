//! nexfluc-live - Live transcript insight service
//!
//! Accepts partial/committed transcript events and conversation messages per
//! session, and publishes debounced entity graphs and insight records over
//! HTTP REST + SSE.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nexfluc_common::config::{default_config_path, load_toml_config, resolve_root_folder};
use nexfluc_common::events::EventBus;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nexfluc_live::config::{
    resolve_provider_keys, write_default_config, Pipeline, ProviderChains,
};
use nexfluc_live::db::{init_database_pool, DATABASE_FILE};
use nexfluc_live::AppState;

/// Command-line arguments for nexfluc-live
#[derive(Parser, Debug)]
#[command(name = "nexfluc-live")]
#[command(about = "Live transcript to knowledge graph and insight service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5780", env = "NEXFLUC_LIVE_PORT")]
    port: u16,

    /// Root folder for the database
    #[arg(short, long, env = "NEXFLUC_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file (default: ~/.config/nexfluc/nexfluc-live.toml)
    #[arg(short, long, env = "NEXFLUC_LIVE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| default_config_path("nexfluc-live"));
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path).context("Failed to load TOML config")?,
        None => Default::default(),
    };

    // RUST_LOG overrides the TOML level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "nexfluc_live={level},nexfluc_common={level},tower_http=info",
                    level = toml_config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting nexfluc-live on port {}", args.port);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => {
            info!("Config file: {}", path.display());
            write_default_config(path);
        }
        None => warn!("No config directory available, using compiled defaults"),
    }

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = root_folder.join(DATABASE_FILE);
    info!("Database: {}", db_path.display());

    let db_pool = init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    let settings = toml_config.pipeline.clone();
    let keys = resolve_provider_keys(&toml_config).context("Provider configuration")?;
    let chains = ProviderChains::from_keys(&keys, &settings)?;
    let pipeline = Pipeline::new(chains, &settings);

    let event_bus = EventBus::new(100);
    let state = AppState::new(db_pool, event_bus, pipeline, &settings);
    let app = nexfluc_live::build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
