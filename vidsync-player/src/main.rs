//! vidsync-player - Main entry point
//!
//! Plays local video files through an mpv-compatible engine and keeps a
//! group of devices in step: one primary broadcasts its state, subordinates
//! follow it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidsync_common::config::ConfigStore;

use vidsync_player::api::{self, AppContext};
use vidsync_player::engine::{EngineOptions, MpvEngine};
use vidsync_player::playback::{ControllerSettings, PlaybackController};
use vidsync_player::sync::{SyncRole, SyncService, SyncSettings};

/// Command-line arguments for vidsync-player
#[derive(Parser, Debug)]
#[command(name = "vidsync-player")]
#[command(about = "Synchronized video player")]
#[command(version)]
struct Args {
    /// Config file (overrides VIDSYNC_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP port (overrides the config file)
    #[arg(short, long, env = "VIDSYNC_PORT")]
    port: Option<u16>,

    /// Media directory (overrides the config file)
    #[arg(short, long, env = "VIDSYNC_MEDIA_DIR")]
    media_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let store = Arc::new(
        ConfigStore::open(args.config.as_deref()).context("Failed to load configuration")?,
    );
    // CLI overrides apply to this run only and are never written back
    let mut config = store.get();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(media_dir) = args.media_dir {
        config.media_dir = media_dir;
    }

    // Initialize tracing
    let default_filter = format!(
        "vidsync_player={},vidsync_common={},tower_http=info",
        config.logging.level, config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vidsync-player v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", store.path().display());
    info!("Media directory: {}", config.media_dir.display());

    tokio::fs::create_dir_all(&config.media_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.media_dir.display()))?;

    // Playback controller with its poll task
    let engine = MpvEngine::new(EngineOptions::from(&config.engine));
    let controller = PlaybackController::spawn(
        Box::new(engine),
        ControllerSettings {
            initial_volume: config.volume,
            loop_playback: config.loop_playback,
            ..ControllerSettings::default()
        },
    );

    // Sync coordinator in the configured role
    let sync = Arc::new(SyncService::new(
        Arc::clone(&controller),
        SyncSettings::from_config(&config),
    ));
    let role = SyncRole::from_config(&config);
    if let Err(e) = sync.apply_role(role.clone()).await {
        warn!("Sync role {} unavailable, continuing disabled: {}", role, e);
    }

    let ctx = AppContext::new(
        Arc::clone(&controller),
        Arc::clone(&sync),
        store,
        config.media_dir.clone(),
    );
    let app = api::create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sync.shutdown().await;
    controller.shutdown().await;

    info!("Shutdown complete");
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
            Ok(mut stream) => {
                stream.recv().await;
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
