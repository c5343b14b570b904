//! Engine control channel
//!
//! One short-lived Unix-socket connection per request. The request is a
//! single JSON line `{"command": [verb, args...]}`; the engine answers with a
//! JSON line `{"error": "success", "data": ...}`. Unsolicited event lines the
//! engine may interleave are skipped.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::trace;

use super::EngineError;

/// Handle on an engine's control socket path
#[derive(Debug, Clone)]
pub struct ControlChannel {
    path: PathBuf,
}

impl ControlChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if a connection to the socket can be opened right now
    pub async fn is_connectable(&self) -> bool {
        UnixStream::connect(&self.path).await.is_ok()
    }

    /// Send one command and wait for its response, bounded by `timeout`
    pub async fn request(&self, command: Vec<Value>, timeout: Duration) -> Result<Value, EngineError> {
        if !self.path.exists() {
            return Err(EngineError::ChannelUnavailable(format!(
                "socket {} does not exist",
                self.path.display()
            )));
        }

        match tokio::time::timeout(timeout, self.round_trip(command)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(timeout.as_millis() as u64)),
        }
    }

    async fn round_trip(&self, command: Vec<Value>) -> Result<Value, EngineError> {
        let stream = UnixStream::connect(&self.path).await.map_err(|e| {
            EngineError::ChannelUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let (read_half, mut write_half) = stream.into_split();

        let mut request = json!({ "command": command }).to_string();
        trace!("engine <- {}", request);
        request.push('\n');
        write_half
            .write_all(request.as_bytes())
            .await
            .map_err(|e| EngineError::ChannelUnavailable(format!("write failed: {}", e)))?;

        let mut lines = BufReader::new(read_half).lines();
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|e| EngineError::Protocol(format!("read failed: {}", e)))?
                .ok_or_else(|| {
                    EngineError::Protocol("connection closed before response".to_string())
                })?;

            if line.trim().is_empty() {
                continue;
            }
            trace!("engine -> {}", line);

            let response: Value = serde_json::from_str(&line)
                .map_err(|e| EngineError::Protocol(format!("invalid response: {}", e)))?;
            if response.get("event").is_some() {
                continue;
            }
            return parse_response(&response);
        }
    }
}

/// Map a decoded response to its data or a rejection
pub fn parse_response(response: &Value) -> Result<Value, EngineError> {
    match response.get("error").and_then(Value::as_str) {
        Some("success") => Ok(response.get("data").cloned().unwrap_or(Value::Null)),
        Some(other) => Err(EngineError::CommandRejected(other.to_string())),
        None => Err(EngineError::CommandRejected(
            "response carried no status".to_string(),
        )),
    }
}
