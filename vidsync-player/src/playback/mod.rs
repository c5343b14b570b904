//! Playback control
//!
//! [`PlaybackController`] is the single owner of playback state; a
//! background poll keeps position and duration current while playing.

pub mod controller;
mod monitor;
pub mod state;

pub use controller::{ControllerSettings, PlaybackController, PlaybackError};
pub use state::PlaybackState;
