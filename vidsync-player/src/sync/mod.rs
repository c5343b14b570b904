//! Sync Coordinator
//!
//! Keeps subordinate devices converged with one primary:
//! - [`primary`] accepts subordinate connections, broadcasts snapshots while
//!   playing and relays discrete commands
//! - [`subordinate`] holds one connection to the primary, reconnecting after
//!   failures, and feeds what it receives into the local controller
//! - [`drift`] decides how far a subordinate is off and what to do about it
//! - [`service`] owns whichever of the above is active and switches roles
//!
//! The wire format is newline-delimited JSON ([`vidsync_common::SyncMessage`]).

pub mod drift;
pub mod primary;
mod registry;
pub mod service;
pub mod subordinate;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use vidsync_common::config::{SyncMode, TomlConfig};
use vidsync_common::time::millis_to_duration;

pub use drift::{plan_corrections, Correction, FileCheck};
pub use primary::PrimaryCoordinator;
pub use service::SyncService;
pub use subordinate::SubordinateCoordinator;

/// Longest accepted line on the sync channel
pub(crate) const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Sync coordinator failures
#[derive(Error, Debug)]
pub enum SyncError {
    /// Subordinate role requested without a primary address
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    /// Primary could not listen on its sync port
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Peer went away or an I/O operation failed
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Line framing or message encoding failed
    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<tokio_util::codec::LinesCodecError> for SyncError {
    fn from(err: tokio_util::codec::LinesCodecError) -> Self {
        match err {
            tokio_util::codec::LinesCodecError::Io(e) => SyncError::ConnectionLost(e.to_string()),
            other => SyncError::Codec(other.to_string()),
        }
    }
}

impl From<vidsync_common::Error> for SyncError {
    fn from(err: vidsync_common::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}

/// Active synchronization role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRole {
    Primary,
    Subordinate { primary_address: String },
    Disabled,
}

impl SyncRole {
    /// Role as stored in configuration
    pub fn mode(&self) -> SyncMode {
        match self {
            SyncRole::Primary => SyncMode::Primary,
            SyncRole::Subordinate { .. } => SyncMode::Subordinate,
            SyncRole::Disabled => SyncMode::Disabled,
        }
    }

    /// Role described by a loaded configuration
    pub fn from_config(config: &TomlConfig) -> Self {
        match config.sync_mode {
            SyncMode::Primary => SyncRole::Primary,
            SyncMode::Subordinate => SyncRole::Subordinate {
                primary_address: config.primary_address.clone(),
            },
            SyncMode::Disabled => SyncRole::Disabled,
        }
    }
}

impl std::fmt::Display for SyncRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mode())
    }
}

/// Timing and addressing for every coordinator role
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Interface the primary listens on
    pub bind_address: String,
    /// Primary listen port, and the default port subordinates dial
    pub sync_port: u16,
    pub broadcast_interval: Duration,
    pub reconnect_backoff: Duration,
    /// Subordinate sends a heartbeat after this long without traffic
    pub heartbeat_interval: Duration,
    /// Upper bound on every single send
    pub send_timeout: Duration,
    pub connect_timeout: Duration,
    /// How long a role switch waits for the old coordinator's tasks
    pub shutdown_timeout: Duration,
    /// Where relayed and synced file names are resolved
    pub media_dir: PathBuf,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            sync_port: 8765,
            broadcast_interval: Duration::from_millis(500),
            reconnect_backoff: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(5),
            send_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(2),
            media_dir: PathBuf::from("."),
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            bind_address: config.sync.bind_address.clone(),
            sync_port: config.sync_port,
            broadcast_interval: millis_to_duration(config.sync.broadcast_interval_ms),
            reconnect_backoff: millis_to_duration(config.sync.reconnect_backoff_ms),
            heartbeat_interval: millis_to_duration(config.sync.heartbeat_interval_ms),
            media_dir: config.media_dir.clone(),
            ..Self::default()
        }
    }

    pub fn listen_address(&self) -> String {
        match self.bind_address.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.sync_port).to_string(),
            Err(_) => format!("{}:{}", self.bind_address, self.sync_port),
        }
    }
}

/// Normalize a configured primary address into `host:port`
///
/// Accepts a full socket address, a bare IP, `host:port` or a bare host
/// name; anything without a port gets `default_port`.
pub fn parse_primary_address(address: &str, default_port: u16) -> Result<String, SyncError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(SyncError::ConfigurationMissing(
            "primary address is required for subordinate mode".to_string(),
        ));
    }

    if let Ok(socket) = address.parse::<SocketAddr>() {
        return Ok(socket.to_string());
    }
    if let Ok(ip) = address.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port).to_string());
    }
    if let Some((host, port)) = address.rsplit_once(':') {
        if !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok() {
            return Ok(address.to_string());
        }
    }
    Ok(format!("{}:{}", address, default_port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primary_address() {
        assert_eq!(
            parse_primary_address("192.168.1.10", 8765).unwrap(),
            "192.168.1.10:8765"
        );
        assert_eq!(
            parse_primary_address("192.168.1.10:9000", 8765).unwrap(),
            "192.168.1.10:9000"
        );
        assert_eq!(
            parse_primary_address("primary.local", 8765).unwrap(),
            "primary.local:8765"
        );
        assert_eq!(
            parse_primary_address("primary.local:9000", 8765).unwrap(),
            "primary.local:9000"
        );
        assert_eq!(parse_primary_address("::1", 8765).unwrap(), "[::1]:8765");
        assert_eq!(
            parse_primary_address(" 10.0.0.2 ", 8765).unwrap(),
            "10.0.0.2:8765"
        );
    }

    #[test]
    fn test_empty_primary_address_is_configuration_missing() {
        assert!(matches!(
            parse_primary_address("", 8765),
            Err(SyncError::ConfigurationMissing(_))
        ));
        assert!(matches!(
            parse_primary_address("   ", 8765),
            Err(SyncError::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn test_role_from_config() {
        let mut config = TomlConfig::default();
        assert_eq!(SyncRole::from_config(&config), SyncRole::Disabled);

        config.sync_mode = SyncMode::Subordinate;
        config.primary_address = "10.0.0.1".to_string();
        assert_eq!(
            SyncRole::from_config(&config),
            SyncRole::Subordinate {
                primary_address: "10.0.0.1".to_string()
            }
        );
        assert_eq!(SyncRole::Primary.to_string(), "primary");
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = TomlConfig::default();
        config.sync_port = 9999;
        config.sync.reconnect_backoff_ms = 250;

        let settings = SyncSettings::from_config(&config);
        assert_eq!(settings.sync_port, 9999);
        assert_eq!(settings.reconnect_backoff, Duration::from_millis(250));
        assert_eq!(settings.broadcast_interval, Duration::from_millis(500));
        assert_eq!(settings.listen_address(), "0.0.0.0:9999");
    }
}
