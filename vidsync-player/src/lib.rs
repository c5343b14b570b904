//! vidsync-player library
//!
//! Video playback controller with primary/subordinate synchronization.
//! The binary (`main.rs`) wires these modules together; integration tests
//! drive them directly.

pub mod api;
pub mod engine;
pub mod error;
pub mod media;
pub mod playback;
pub mod sync;
pub mod task;

pub use error::{Error, Result};
pub use playback::{PlaybackController, PlaybackState};
pub use sync::{SyncRole, SyncService};
