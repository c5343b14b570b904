//! # vidsync Common Library
//!
//! Shared code for the vidsync player service and its peers:
//! - Synchronization wire protocol (`SyncMessage`, `SyncSnapshot`, `SyncCommand`)
//! - Playback lifecycle enum shared by both ends of the wire
//! - TOML configuration loading, defaults and persistence
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod protocol;
pub mod time;

pub use error::{Error, Result};
pub use protocol::{Lifecycle, SyncCommand, SyncMessage, SyncSnapshot};
