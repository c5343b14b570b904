//! HTTP request handlers

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};
use vidsync_common::config::{SyncMode, TomlConfig};
use vidsync_common::{Lifecycle, SyncCommand};

use super::AppContext;
use crate::error::{Error, Result};
use crate::media::{self, MediaFile};
use crate::sync::SyncError;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    /// Seconds since startup
    uptime: f64,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    state: Lifecycle,
    current_file: Option<String>,
    position: f64,
    duration: f64,
    volume: u8,
    sync_mode: SyncMode,
    hostname: String,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_position: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<u8>,
}

impl ControlResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            new_position: None,
            volume: None,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayRequest {
    file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SeekRequest {
    #[serde(default)]
    position: f64,
}

#[derive(Debug, Deserialize)]
pub struct SkipRequest {
    #[serde(default = "default_skip_seconds")]
    seconds: f64,
}

impl Default for SkipRequest {
    fn default() -> Self {
        Self {
            seconds: default_skip_seconds(),
        }
    }
}

fn default_skip_seconds() -> f64 {
    30.0
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    #[serde(default = "default_volume_level")]
    level: f64,
}

impl Default for VolumeRequest {
    fn default() -> Self {
        Self {
            level: default_volume_level(),
        }
    }
}

fn default_volume_level() -> f64 {
    100.0
}

#[derive(Debug, Default, Deserialize)]
pub struct SubordinateRequest {
    #[serde(default)]
    primary_address: Option<String>,
}

/// Parse an optional JSON body
///
/// An empty body or `null` yields the defaults; anything else must
/// deserialize into `T` or the request is rejected with 400.
fn body<T: DeserializeOwned + Default>(bytes: &[u8]) -> Result<T> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::BadRequest(format!("invalid JSON body: {}", e)))?;
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(|e| Error::BadRequest(format!("invalid request: {}", e)))
}

// ============================================================================
// Helpers
// ============================================================================

/// Relay a successful local operation; no-op unless this device is primary
async fn relay(ctx: &AppContext, command: SyncCommand) {
    ctx.sync.relay(&command).await;
}

/// Persist a configuration change; failures are logged, not returned
fn persist<F>(ctx: &AppContext, change: F)
where
    F: FnOnce(&mut TomlConfig),
{
    if let Err(e) = ctx.config.update(change) {
        warn!(
            "Failed to save configuration to {}: {}",
            ctx.config.path().display(),
            e
        );
    }
}

// ============================================================================
// Health and Status
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: ctx.started_at.elapsed().as_secs_f64(),
        timestamp: Utc::now(),
    })
}

/// GET /api/status
pub async fn status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    let state = ctx.controller.state().await;
    let role = ctx.sync.role().await;

    Json(StatusResponse {
        state: state.lifecycle,
        current_file: state
            .current_file
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
        position: state.position,
        duration: state.duration,
        volume: state.volume,
        sync_mode: role.mode(),
        hostname: ctx.hostname.clone(),
    })
}

// ============================================================================
// Playback Control
// ============================================================================

/// POST /api/play - play a file from the media directory, or resume
pub async fn play(
    State(ctx): State<AppContext>,
    request: Bytes,
) -> Result<Json<ControlResponse>> {
    let request: PlayRequest = body(&request)?;

    match request.file.filter(|f| !f.trim().is_empty()) {
        Some(file) => {
            let name = media::sanitize_name(&file)
                .ok_or_else(|| Error::BadRequest(format!("invalid file name: {}", file)))?;
            let path = media::resolve_basename(&ctx.media_dir, &name)
                .await
                .ok_or_else(|| Error::NotFound(format!("File not found: {}", name)))?;

            ctx.controller.play(&path).await?;
            relay(&ctx, SyncCommand::Play { file: name.clone() }).await;
            Ok(ControlResponse::ok(format!("Playing {}", name)))
        }
        None => {
            ctx.controller.resume().await?;
            relay(&ctx, SyncCommand::Resume).await;
            Ok(ControlResponse::ok("Resumed playback"))
        }
    }
}

/// POST /api/pause - toggle pause
pub async fn pause(State(ctx): State<AppContext>) -> Result<Json<ControlResponse>> {
    ctx.controller.pause().await?;
    relay(&ctx, SyncCommand::Pause).await;
    Ok(ControlResponse::ok("Toggled pause"))
}

/// POST /api/stop
pub async fn stop(State(ctx): State<AppContext>) -> Json<ControlResponse> {
    ctx.controller.stop().await;
    relay(&ctx, SyncCommand::Stop).await;
    ControlResponse::ok("Stopped playback")
}

/// POST /api/seek - absolute seek in seconds
pub async fn seek(
    State(ctx): State<AppContext>,
    request: Bytes,
) -> Result<Json<ControlResponse>> {
    let position = body::<SeekRequest>(&request)?.position;
    ctx.controller.seek(position).await?;

    let position = position.max(0.0);
    relay(&ctx, SyncCommand::Seek { position }).await;
    Ok(ControlResponse::ok(format!("Seeked to {}s", position)))
}

/// POST /api/skip - relative seek, default 30s forward
pub async fn skip(
    State(ctx): State<AppContext>,
    request: Bytes,
) -> Result<Json<ControlResponse>> {
    let seconds = body::<SkipRequest>(&request)?.seconds;
    let new_position = ctx.controller.skip(seconds).await?;

    relay(
        &ctx,
        SyncCommand::Seek {
            position: new_position,
        },
    )
    .await;

    let mut response = ControlResponse::ok(format!("Skipped {}s", seconds));
    response.new_position = Some(new_position);
    Ok(response)
}

/// POST /api/volume - set and persist volume (0-100)
pub async fn set_volume(
    State(ctx): State<AppContext>,
    request: Bytes,
) -> Result<Json<ControlResponse>> {
    let level = body::<VolumeRequest>(&request)?.level;
    if !level.is_finite() {
        return Err(Error::BadRequest(format!("invalid volume level: {}", level)));
    }
    let level = ctx
        .controller
        .set_volume(level.clamp(0.0, 100.0).round() as i64)
        .await?;
    persist(&ctx, |config| config.volume = level);

    let mut response = ControlResponse::ok(format!("Volume set to {}%", level));
    response.volume = Some(level);
    Ok(response)
}

// ============================================================================
// Media Library
// ============================================================================

/// GET /api/files
pub async fn list_files(State(ctx): State<AppContext>) -> Result<Json<Vec<MediaFile>>> {
    Ok(Json(media::list_media_files(&ctx.media_dir).await?))
}

/// DELETE /api/files/:name
pub async fn delete_file(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
) -> Result<Json<ControlResponse>> {
    let name = media::sanitize_name(&name)
        .ok_or_else(|| Error::BadRequest(format!("invalid file name: {}", name)))?;

    if !media::delete_media_file(&ctx.media_dir, &name).await? {
        return Err(Error::NotFound(format!("File not found: {}", name)));
    }
    info!("Deleted {}", name);
    Ok(ControlResponse::ok(format!("File {} deleted", name)))
}

// ============================================================================
// Sync Role
// ============================================================================

/// POST /api/sync/primary
pub async fn sync_primary(State(ctx): State<AppContext>) -> Result<Json<ControlResponse>> {
    ctx.sync.set_primary().await?;
    persist(&ctx, |config| config.sync_mode = SyncMode::Primary);
    Ok(ControlResponse::ok("Device set as sync primary"))
}

/// POST /api/sync/subordinate - follow the primary at `primary_address`
pub async fn sync_subordinate(
    State(ctx): State<AppContext>,
    request: Bytes,
) -> Result<Json<ControlResponse>> {
    let address = body::<SubordinateRequest>(&request)?
        .primary_address
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| SyncError::ConfigurationMissing("primary_address is required".to_string()))?;

    ctx.sync.set_subordinate(&address).await?;
    persist(&ctx, |config| {
        config.sync_mode = SyncMode::Subordinate;
        config.primary_address = address.clone();
    });
    Ok(ControlResponse::ok(format!(
        "Device set as sync subordinate to {}",
        address
    )))
}

/// POST /api/sync/disabled
pub async fn sync_disabled(State(ctx): State<AppContext>) -> Json<ControlResponse> {
    ctx.sync.set_disabled().await;
    persist(&ctx, |config| config.sync_mode = SyncMode::Disabled);
    ControlResponse::ok("Sync disabled")
}
