//! Error types for vidsync-player
//!
//! Component errors (`EngineError`, `PlaybackError`, `SyncError`) convert
//! into [`Error`], which the HTTP layer renders as `{success, message}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::playback::PlaybackError;
use crate::sync::SyncError;

/// Main error type for vidsync-player
#[derive(Error, Debug)]
pub enum Error {
    /// Playback control failures
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// Sync role and channel failures
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or incomplete request
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Result type alias using vidsync-player Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) | Error::Playback(PlaybackError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Error::BadRequest(_)
            | Error::Playback(PlaybackError::InvalidArgument(_))
            | Error::Sync(SyncError::ConfigurationMissing(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
