//! Playback state

use std::path::PathBuf;
use vidsync_common::time::unix_timestamp;
use vidsync_common::{Lifecycle, SyncSnapshot};

/// Canonical in-process view of playback
///
/// Only the [`PlaybackController`](super::PlaybackController) mutates this;
/// everyone else receives copies.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub lifecycle: Lifecycle,
    pub current_file: Option<PathBuf>,
    /// Seconds
    pub position: f64,
    /// Seconds, 0 when unknown
    pub duration: f64,
    /// 0-100
    pub volume: u8,
    pub playback_speed: f64,
}

impl PlaybackState {
    pub fn new(volume: u8) -> Self {
        Self {
            lifecycle: Lifecycle::Stopped,
            current_file: None,
            position: 0.0,
            duration: 0.0,
            volume: volume.min(100),
            playback_speed: 1.0,
        }
    }

    /// Enter Playing for a freshly launched file
    pub(crate) fn start(&mut self, file: PathBuf) {
        self.lifecycle = Lifecycle::Playing;
        self.current_file = Some(file);
        self.position = 0.0;
        self.duration = 0.0;
        self.playback_speed = 1.0;
    }

    /// Explicit stop or detected engine exit: everything cleared
    pub(crate) fn reset(&mut self) {
        self.lifecycle = Lifecycle::Stopped;
        self.current_file = None;
        self.position = 0.0;
        self.duration = 0.0;
        self.playback_speed = 1.0;
    }

    /// End of stream without looping
    ///
    /// Unlike [`reset`](Self::reset) the title stays visible: `current_file`
    /// is kept until the next explicit stop or play.
    pub(crate) fn finish(&mut self) {
        let file = self.current_file.take();
        self.reset();
        self.current_file = file;
    }

    /// True when the stream has reached its last second
    pub fn at_end_of_stream(&self) -> bool {
        self.duration > 0.0 && self.position >= self.duration - 1.0
    }

    /// Copy for the sync channel
    pub fn to_snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            lifecycle: self.lifecycle,
            current_file: self
                .current_file
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            position: self.position,
            duration: self.duration,
            volume: self.volume,
            timestamp: unix_timestamp(),
        }
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(100)
    }
}
