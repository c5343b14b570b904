//! Synchronization wire protocol
//!
//! Messages travel over a persistent TCP connection, one JSON object per
//! line. The primary sends `sync` snapshots and `command` relays; the
//! subordinate only ever sends `heartbeat`.
//!
//! ```text
//! {"type":"sync","data":{"lifecycle":"playing","current_file":"/v/a.mp4",...}}
//! {"type":"command","data":{"command":"seek","position":12.5}}
//! {"type":"heartbeat"}
//! ```

use serde::{Deserialize, Serialize};

use crate::Result;

/// Playback lifecycle state
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Stopped => write!(f, "stopped"),
            Lifecycle::Playing => write!(f, "playing"),
            Lifecycle::Paused => write!(f, "paused"),
        }
    }
}

/// Point-in-time copy of the primary's playback state
///
/// Built fresh for every broadcast tick and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    #[serde(alias = "state")]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub current_file: Option<String>,
    #[serde(default)]
    pub position: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default = "default_volume")]
    pub volume: u8,
    /// Seconds since the Unix epoch on the primary when the snapshot was taken
    #[serde(default)]
    pub timestamp: f64,
}

fn default_volume() -> u8 {
    100
}

/// Discrete command relayed from the primary for immediate effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum SyncCommand {
    /// Play a file; subordinates resolve `file` by basename in their own media dir
    Play { file: String },
    Pause,
    Resume,
    Stop,
    Seek { position: f64 },
}

impl SyncCommand {
    /// Command verb as it appears on the wire
    pub fn verb(&self) -> &'static str {
        match self {
            SyncCommand::Play { .. } => "play",
            SyncCommand::Pause => "pause",
            SyncCommand::Resume => "resume",
            SyncCommand::Stop => "stop",
            SyncCommand::Seek { .. } => "seek",
        }
    }
}

/// Envelope for every message on the sync channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum SyncMessage {
    Sync(SyncSnapshot),
    Command(SyncCommand),
    Heartbeat,
}

impl SyncMessage {
    /// Encode as a single JSON line (without the trailing newline)
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one received line
    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}
