//! Engine Process Adapter
//!
//! Drives an out-of-process, mpv-compatible media engine:
//! - [`options`] turns declarative output/acceleration settings into an
//!   argument list, probing for a connected display when asked to
//! - [`ipc`] is the request/response control channel over a Unix socket
//! - [`process`] owns the subprocess and implements [`EngineBackend`]
//!
//! The controller only ever talks to the [`EngineBackend`] trait, so tests
//! can substitute an in-memory engine.

pub mod ipc;
pub mod options;
pub mod process;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;

pub use ipc::ControlChannel;
pub use options::{build_args, probe_display_connected, EngineOptions};
pub use process::MpvEngine;

/// Failures surfaced by the adapter
///
/// Connection-level failures (`ChannelUnavailable`) are kept distinct from
/// the engine refusing a command (`CommandRejected`).
#[derive(Error, Debug)]
pub enum EngineError {
    /// Control socket missing, refused, or no engine running
    #[error("Control channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Engine answered with a non-success status
    #[error("Command rejected by engine: {0}")]
    CommandRejected(String),

    /// Response could not be read or parsed
    #[error("Control channel protocol error: {0}")]
    Protocol(String),

    /// Round trip did not complete in time
    #[error("Control channel timed out after {0}ms")]
    Timeout(u64),

    /// Engine process could not be started or exited during startup
    #[error("Failed to start engine: {0}")]
    Spawn(String),

    /// Waiting on or killing the engine process failed
    #[error("Engine process error: {0}")]
    Process(String),
}

/// Typed control-channel request
#[derive(Debug, Clone, PartialEq)]
pub enum EngineRequest {
    TogglePause,
    Quit,
    /// Absolute seek in seconds
    Seek(f64),
    SetVolume(u8),
    SetSpeed(f64),
    GetProperty(&'static str),
}

impl EngineRequest {
    /// `command` array as sent on the wire
    pub fn to_command(&self) -> Vec<Value> {
        match self {
            EngineRequest::TogglePause => vec![json!("cycle"), json!("pause")],
            EngineRequest::Quit => vec![json!("quit")],
            EngineRequest::Seek(position) => {
                vec![json!("seek"), json!(position), json!("absolute")]
            }
            EngineRequest::SetVolume(level) => {
                vec![json!("set_property"), json!("volume"), json!(level)]
            }
            EngineRequest::SetSpeed(speed) => {
                vec![json!("set_property"), json!("speed"), json!(speed)]
            }
            EngineRequest::GetProperty(name) => vec![json!("get_property"), json!(name)],
        }
    }
}

/// Seam between the playback controller and a concrete engine
#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// Start the engine on `file` with the given initial volume
    ///
    /// Any previous instance must have been terminated by the caller.
    async fn launch(&mut self, file: &Path, volume: u8) -> Result<(), EngineError>;

    /// Issue one request; returns the response `data` (Null when absent)
    async fn send(&self, request: EngineRequest) -> Result<Value, EngineError>;

    /// Quit, then terminate the process, then remove the control socket
    async fn terminate(&mut self) -> Result<(), EngineError>;

    /// True once a launched engine process has exited on its own
    fn has_exited(&mut self) -> bool;
}
