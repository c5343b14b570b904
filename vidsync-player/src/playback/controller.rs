//! Playback Controller
//!
//! Owns the canonical [`PlaybackState`] and the engine handle behind one
//! async mutex, so API handlers, the poll task and the sync receive loop
//! never observe a half-applied update.
//!
//! State machine:
//! ```text
//! Stopped --play--> Playing <--pause/resume--> Paused
//! Playing|Paused --stop--> Stopped
//! any --engine exit / end of stream--> Stopped
//! ```
//!
//! Engine failures are returned as [`PlaybackError`] values and never leave
//! the controller in an unusable state; `stop` always reaches Stopped.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use vidsync_common::{Lifecycle, SyncSnapshot};

use super::monitor::spawn_poll_task;
use super::state::PlaybackState;
use crate::engine::{EngineBackend, EngineError, EngineRequest};
use crate::task::TaskHandle;

const MONITOR_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Playback operation failures
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Requested media path does not exist
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Engine could not be reached or refused the command
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Argument outside the accepted range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Controller tuning
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub initial_volume: u8,
    /// Seek back to 0 at end of stream instead of stopping
    pub loop_playback: bool,
    pub poll_interval: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            initial_volume: 100,
            loop_playback: false,
            poll_interval: Duration::from_millis(500),
        }
    }
}

struct Inner {
    state: PlaybackState,
    engine: Box<dyn EngineBackend>,
}

/// Drives the engine and exposes normalized playback state
pub struct PlaybackController {
    inner: Mutex<Inner>,
    settings: ControllerSettings,
    monitor: StdMutex<Option<TaskHandle>>,
}

impl PlaybackController {
    /// Create a controller without a poll task
    pub fn new(engine: Box<dyn EngineBackend>, settings: ControllerSettings) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: PlaybackState::new(settings.initial_volume),
                engine,
            }),
            settings,
            monitor: StdMutex::new(None),
        })
    }

    /// Create a controller and start its position poll task
    pub fn spawn(engine: Box<dyn EngineBackend>, settings: ControllerSettings) -> Arc<Self> {
        let controller = Self::new(engine, settings);
        controller.start_monitoring();
        controller
    }

    /// Start the poll task if it is not already running
    pub fn start_monitoring(self: &Arc<Self>) {
        let mut monitor = match self.monitor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if monitor.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        *monitor = Some(spawn_poll_task(
            Arc::downgrade(self),
            self.settings.poll_interval,
        ));
    }

    /// Stop the poll task and playback
    pub async fn shutdown(&self) {
        let task = match self.monitor.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.stop(MONITOR_STOP_TIMEOUT).await;
        }
        self.stop().await;
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    async fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().await
    }

    // ------------------------------------------------------------------
    // Control operations
    // ------------------------------------------------------------------

    /// Play `path` from the beginning, replacing any current playback
    pub async fn play(&self, path: &Path) -> Result<(), PlaybackError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            warn!("File not found: {}", path.display());
            return Err(PlaybackError::NotFound(path.to_path_buf()));
        }

        let mut inner = self.lock().await;
        Self::stop_locked(&mut inner).await;

        let volume = inner.state.volume;
        inner.engine.launch(path, volume).await?;
        inner.state.start(path.to_path_buf());

        info!("Playing {}", path.display());
        Ok(())
    }

    /// Toggle pause
    ///
    /// The lifecycle flips on command success without querying the engine.
    pub async fn pause(&self) -> Result<(), PlaybackError> {
        let mut inner = self.lock().await;
        Self::toggle_pause_locked(&mut inner).await
    }

    /// Resume if paused; success without a command if already playing
    pub async fn resume(&self) -> Result<(), PlaybackError> {
        let mut inner = self.lock().await;
        if inner.state.lifecycle == Lifecycle::Playing {
            return Ok(());
        }
        Self::toggle_pause_locked(&mut inner).await
    }

    /// Stop playback; always ends in Stopped
    ///
    /// Termination errors are logged, never returned.
    pub async fn stop(&self) {
        let mut inner = self.lock().await;
        Self::stop_locked(&mut inner).await;
    }

    /// Absolute seek in seconds
    ///
    /// The cached position is updated immediately as a hint; the next poll
    /// replaces it with the engine's value.
    pub async fn seek(&self, position: f64) -> Result<(), PlaybackError> {
        let mut inner = self.lock().await;
        Self::seek_locked(&mut inner, position).await.map(|_| ())
    }

    /// Relative seek; returns the new position
    pub async fn skip(&self, seconds: f64) -> Result<f64, PlaybackError> {
        let mut inner = self.lock().await;
        let target = inner.state.position + seconds;
        Self::seek_locked(&mut inner, target).await
    }

    /// Set volume (clamped to 0-100); returns the applied level
    ///
    /// With no engine running only the cached level changes, which the next
    /// launch picks up.
    pub async fn set_volume(&self, level: i64) -> Result<u8, PlaybackError> {
        let level = level.clamp(0, 100) as u8;
        let mut inner = self.lock().await;

        if inner.state.lifecycle != Lifecycle::Stopped {
            inner.engine.send(EngineRequest::SetVolume(level)).await?;
        }
        inner.state.volume = level;
        debug!("Volume set to {}", level);
        Ok(level)
    }

    /// Adjust playback rate; only used by drift correction
    pub(crate) async fn set_playback_speed(&self, speed: f64) -> Result<(), PlaybackError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PlaybackError::InvalidArgument(format!(
                "playback speed must be positive, got {}",
                speed
            )));
        }

        let mut inner = self.lock().await;
        inner.engine.send(EngineRequest::SetSpeed(speed)).await?;
        inner.state.playback_speed = speed;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Copy of the full state, after checking for engine exit
    pub async fn state(&self) -> PlaybackState {
        let mut inner = self.lock().await;
        Self::detect_exit_locked(&mut inner).await;
        inner.state.clone()
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        self.state().await.lifecycle
    }

    pub async fn position(&self) -> f64 {
        self.lock().await.state.position
    }

    pub async fn duration(&self) -> f64 {
        self.lock().await.state.duration
    }

    pub async fn volume(&self) -> u8 {
        self.lock().await.state.volume
    }

    pub async fn current_file(&self) -> Option<PathBuf> {
        self.lock().await.state.current_file.clone()
    }

    /// Fresh snapshot for the sync channel
    pub async fn snapshot(&self) -> SyncSnapshot {
        self.state().await.to_snapshot()
    }

    // ------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------

    /// One iteration of the position poll
    ///
    /// While playing, engine-reported position and duration overwrite the
    /// cached values. At end of stream the file either loops or playback
    /// stops with the title kept.
    pub async fn poll_once(&self) {
        let mut inner = self.lock().await;
        if Self::detect_exit_locked(&mut inner).await {
            return;
        }
        if inner.state.lifecycle != Lifecycle::Playing {
            return;
        }

        match inner.engine.send(EngineRequest::GetProperty("time-pos")).await {
            Ok(value) => {
                if let Some(position) = value.as_f64() {
                    inner.state.position = position.max(0.0);
                }
            }
            Err(e) => debug!("time-pos unavailable: {}", e),
        }

        match inner.engine.send(EngineRequest::GetProperty("duration")).await {
            Ok(value) => {
                if let Some(duration) = value.as_f64() {
                    inner.state.duration = duration.max(0.0);
                }
            }
            Err(e) => debug!("duration unavailable: {}", e),
        }

        if !inner.state.at_end_of_stream() {
            return;
        }

        if self.settings.loop_playback {
            match inner.engine.send(EngineRequest::Seek(0.0)).await {
                Ok(_) => {
                    info!("End of stream, looping");
                    inner.state.position = 0.0;
                }
                Err(e) => warn!("Loop seek failed: {}", e),
            }
        } else {
            info!("End of stream");
            inner.state.finish();
        }
    }

    // ------------------------------------------------------------------
    // Lock-held helpers
    // ------------------------------------------------------------------

    async fn stop_locked(inner: &mut Inner) {
        if let Err(e) = inner.engine.terminate().await {
            warn!("Engine termination incomplete: {}", e);
        }
        if inner.state.lifecycle != Lifecycle::Stopped || inner.state.current_file.is_some() {
            info!("Playback stopped");
        }
        inner.state.reset();
    }

    async fn toggle_pause_locked(inner: &mut Inner) -> Result<(), PlaybackError> {
        inner.engine.send(EngineRequest::TogglePause).await?;
        inner.state.lifecycle = match inner.state.lifecycle {
            Lifecycle::Playing => Lifecycle::Paused,
            Lifecycle::Paused => Lifecycle::Playing,
            Lifecycle::Stopped => Lifecycle::Stopped,
        };
        debug!("Pause toggled, now {}", inner.state.lifecycle);
        Ok(())
    }

    async fn seek_locked(inner: &mut Inner, position: f64) -> Result<f64, PlaybackError> {
        if !position.is_finite() {
            return Err(PlaybackError::InvalidArgument(format!(
                "seek position must be finite, got {}",
                position
            )));
        }
        let position = position.max(0.0);

        inner.engine.send(EngineRequest::Seek(position)).await?;
        inner.state.position = position;
        debug!("Seeked to {:.2}s", position);
        Ok(position)
    }

    /// Move to Stopped if the engine died while playing or paused
    ///
    /// Returns true if a transition happened.
    async fn detect_exit_locked(inner: &mut Inner) -> bool {
        if inner.state.lifecycle == Lifecycle::Stopped || !inner.engine.has_exited() {
            return false;
        }

        info!("Engine process exited, playback stopped");
        if let Err(e) = inner.engine.terminate().await {
            debug!("Cleanup after engine exit: {}", e);
        }
        inner.state.reset();
        true
    }
}
