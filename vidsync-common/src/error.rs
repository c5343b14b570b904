//! Common error types for vidsync

use thiserror::Error;

/// Common result type for vidsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by vidsync crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON encode/decode error on the sync wire
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
