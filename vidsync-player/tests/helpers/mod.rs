//! Shared test fixtures: an in-memory engine and media directories

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use vidsync_player::engine::{EngineBackend, EngineError, EngineRequest};
use vidsync_player::playback::{ControllerSettings, PlaybackController};

#[derive(Debug, Default)]
struct FakeState {
    launches: Vec<(PathBuf, u8)>,
    requests: Vec<EngineRequest>,
    running: bool,
    exited: bool,
    reject_commands: bool,
    time_pos: f64,
    duration: f64,
    terminations: usize,
}

/// Engine double that records every request
///
/// Clones share state, so a test keeps one clone while the controller owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Values returned for `time-pos` and `duration`
    pub fn set_progress(&self, time_pos: f64, duration: f64) {
        self.with(|s| {
            s.time_pos = time_pos;
            s.duration = duration;
        });
    }

    /// Make the running engine look like it exited on its own
    pub fn simulate_exit(&self) {
        self.with(|s| s.exited = true);
    }

    pub fn reject_commands(&self, reject: bool) {
        self.with(|s| s.reject_commands = reject);
    }

    pub fn launches(&self) -> Vec<(PathBuf, u8)> {
        self.with(|s| s.launches.clone())
    }

    /// Requests other than property reads
    pub fn commands(&self) -> Vec<EngineRequest> {
        self.with(|s| {
            s.requests
                .iter()
                .filter(|r| !matches!(r, EngineRequest::GetProperty(_)))
                .cloned()
                .collect()
        })
    }

    pub fn clear_commands(&self) {
        self.with(|s| s.requests.clear());
    }

    pub fn is_running(&self) -> bool {
        self.with(|s| s.running)
    }

    pub fn terminations(&self) -> usize {
        self.with(|s| s.terminations)
    }
}

#[async_trait]
impl EngineBackend for FakeEngine {
    async fn launch(&mut self, file: &Path, volume: u8) -> Result<(), EngineError> {
        self.with(|s| {
            s.launches.push((file.to_path_buf(), volume));
            s.running = true;
            s.exited = false;
            s.time_pos = 0.0;
            s.duration = 0.0;
        });
        Ok(())
    }

    async fn send(&self, request: EngineRequest) -> Result<Value, EngineError> {
        self.with(|s| {
            if !s.running || s.exited {
                return Err(EngineError::ChannelUnavailable("engine not running".into()));
            }
            if s.reject_commands {
                return Err(EngineError::CommandRejected("error running command".into()));
            }
            let reply = match &request {
                EngineRequest::GetProperty(name) if *name == "time-pos" => json!(s.time_pos),
                EngineRequest::GetProperty(name) if *name == "duration" => json!(s.duration),
                EngineRequest::Seek(position) => {
                    s.time_pos = *position;
                    Value::Null
                }
                _ => Value::Null,
            };
            s.requests.push(request);
            Ok(reply)
        })
    }

    async fn terminate(&mut self) -> Result<(), EngineError> {
        self.with(|s| {
            if s.running {
                s.terminations += 1;
            }
            s.running = false;
            s.exited = false;
        });
        Ok(())
    }

    fn has_exited(&mut self) -> bool {
        self.with(|s| s.running && s.exited)
    }
}

/// Controller over a fake engine, without the background poll
pub fn fake_controller(settings: ControllerSettings) -> (Arc<PlaybackController>, FakeEngine) {
    let engine = FakeEngine::new();
    let controller = PlaybackController::new(Box::new(engine.clone()), settings);
    (controller, engine)
}

/// Temporary media directory containing `names`
pub fn media_dir_with(names: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in names {
        std::fs::write(dir.path().join(name), b"not really a video").unwrap();
    }
    dir
}

/// Poll `condition` every 20ms until it holds or `timeout` passes
pub async fn wait_for<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
