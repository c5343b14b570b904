//! HTTP API
//!
//! Thin JSON layer over the playback controller, the sync role switch and
//! the media library. Control endpoints answer `{success, message}`; on the
//! primary, successful control operations are relayed to subordinates.

pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use vidsync_common::config::ConfigStore;

use crate::playback::PlaybackController;
use crate::sync::SyncService;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub controller: Arc<PlaybackController>,
    pub sync: Arc<SyncService>,
    pub config: Arc<ConfigStore>,
    pub media_dir: PathBuf,
    pub hostname: String,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(
        controller: Arc<PlaybackController>,
        sync: Arc<SyncService>,
        config: Arc<ConfigStore>,
        media_dir: PathBuf,
    ) -> Self {
        Self {
            controller,
            sync,
            config,
            media_dir,
            hostname: local_hostname(),
            started_at: Instant::now(),
        }
    }
}

/// Build the router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/health", get(handlers::health))
        .route("/api/status", get(handlers::status))
        // Playback control
        .route("/api/play", post(handlers::play))
        .route("/api/pause", post(handlers::pause))
        .route("/api/stop", post(handlers::stop))
        .route("/api/seek", post(handlers::seek))
        .route("/api/skip", post(handlers::skip))
        .route("/api/volume", post(handlers::set_volume))
        // Media library
        .route("/api/files", get(handlers::list_files))
        .route("/api/files/:name", delete(handlers::delete_file))
        // Sync role
        .route("/api/sync/primary", post(handlers::sync_primary))
        .route("/api/sync/subordinate", post(handlers::sync_subordinate))
        .route("/api/sync/disabled", post(handlers::sync_disabled))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Node name of this device, "unknown" if it cannot be read
pub fn local_hostname() -> String {
    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
