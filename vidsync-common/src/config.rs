//! Configuration loading, defaults and persistence
//!
//! A single TOML file holds everything a device needs at startup: the HTTP
//! port, the media directory, engine options and the synchronization role.
//! Every field has a built-in default, so a missing or partial file still
//! yields a working configuration.
//!
//! # Config File Resolution Priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`VIDSYNC_CONFIG`)
//! 3. Platform config directory (`~/.config/vidsync/config.toml` on Linux)
//!
//! The API layer persists volume and sync-role changes back to the same file
//! through [`ConfigStore`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "VIDSYNC_CONFIG";

/// Synchronization role as stored in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Primary,
    Subordinate,
    #[default]
    Disabled,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Primary => write!(f, "primary"),
            SyncMode::Subordinate => write!(f, "subordinate"),
            SyncMode::Disabled => write!(f, "disabled"),
        }
    }
}

/// How the engine decides between rendered and headless output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Probe for a connected display at launch time
    #[default]
    Auto,
    Rendered,
    Headless,
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP API port
    pub port: u16,

    /// Directory holding the playable media files
    pub media_dir: PathBuf,

    /// Volume applied at startup (0-100)
    pub volume: u8,

    /// Restart from the beginning at end of stream instead of stopping
    pub loop_playback: bool,

    /// Synchronization role at startup
    pub sync_mode: SyncMode,

    /// Primary to follow when `sync_mode = "subordinate"` (host or host:port)
    pub primary_address: String,

    /// TCP port of the sync channel
    pub sync_port: u16,

    pub engine: EngineConfig,
    pub sync: SyncTimingConfig,
    pub logging: LoggingConfig,
}

/// Playback engine launch options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable (mpv-compatible)
    pub binary: String,
    pub hardware_accel: bool,
    /// DRM connector for rendered output
    pub display_output: String,
    pub display_mode: DisplayMode,
    pub drm_mode: String,
    /// Audio device passed to the engine; empty means engine default
    pub audio_device: String,
    /// Channel layout, e.g. `stereo`; empty means engine default
    pub audio_channels: String,
    /// Output sample rate in Hz; 0 means engine default
    pub audio_samplerate: u32,
    /// Directory where control sockets are created
    pub socket_dir: PathBuf,
    /// Additional arguments appended before the file name
    pub extra_args: Vec<String>,
}

/// Sync channel timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncTimingConfig {
    /// Address the primary listens on
    pub bind_address: String,
    pub broadcast_interval_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub heartbeat_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

fn default_media_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("videos"))
        .unwrap_or_else(|| PathBuf::from("./videos"))
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            media_dir: default_media_dir(),
            volume: 100,
            loop_playback: false,
            sync_mode: SyncMode::Disabled,
            primary_address: String::new(),
            sync_port: 8765,
            engine: EngineConfig::default(),
            sync: SyncTimingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "mpv".to_string(),
            hardware_accel: true,
            display_output: "HDMI-A-1".to_string(),
            display_mode: DisplayMode::Auto,
            drm_mode: "1920x1080".to_string(),
            audio_device: String::new(),
            audio_channels: "stereo".to_string(),
            audio_samplerate: 48000,
            socket_dir: std::env::temp_dir(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for SyncTimingConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            broadcast_interval_ms: 500,
            reconnect_backoff_ms: 5000,
            heartbeat_interval_ms: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: TomlConfig = toml::from_str(content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from a file, falling back to defaults when the file is missing
    ///
    /// A missing file is not an error: defaults are used and written out so
    /// the user has something to edit. A file that exists but does not parse
    /// is an error.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            let config = Self::default();
            if let Err(e) = config.save(path) {
                warn!("Could not write default config to {}: {}", path.display(), e);
            }
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write to `path` via a temporary file and rename
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, self.to_toml_string()?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Expand a leading `~` in `media_dir` and clamp the volume
    pub fn normalize(&mut self) {
        self.media_dir = expand_home(&self.media_dir);
        self.volume = self.volume.min(100);
    }

    /// Reject values that cannot work at runtime
    pub fn validate(&self) -> Result<()> {
        if self.engine.binary.trim().is_empty() {
            return Err(Error::Config("engine.binary must not be empty".to_string()));
        }
        if self.sync.broadcast_interval_ms == 0 {
            return Err(Error::Config(
                "sync.broadcast_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.sync.heartbeat_interval_ms == 0 {
            return Err(Error::Config(
                "sync.heartbeat_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve the config file path
///
/// Priority: CLI argument, then `VIDSYNC_CONFIG`, then the platform default.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    default_config_path()
}

/// Platform default config file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("vidsync").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("./vidsync.toml"))
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Loaded configuration plus the file it came from
///
/// Reads are cheap clones; updates apply a closure and write the file.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: RwLock<TomlConfig>,
}

impl ConfigStore {
    pub fn new(path: PathBuf, config: TomlConfig) -> Self {
        Self {
            path,
            config: RwLock::new(config),
        }
    }

    /// Resolve, load (or create) and wrap the configuration
    pub fn open(cli_arg: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_arg);
        let config = TomlConfig::load_or_create(&path)?;
        Ok(Self::new(path, config))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current configuration
    pub fn get(&self) -> TomlConfig {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply `change` and persist the result
    ///
    /// The in-memory value is updated even if the write fails; the write
    /// error is returned so callers can report it.
    pub fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut TomlConfig),
    {
        let snapshot = {
            let mut guard = match self.config.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            change(&mut guard);
            guard.clone()
        };
        snapshot.save(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.sync_port, 8765);
        assert_eq!(config.volume, 100);
        assert_eq!(config.sync_mode, SyncMode::Disabled);
        assert_eq!(config.engine.binary, "mpv");
        assert_eq!(config.sync.broadcast_interval_ms, 500);
        assert_eq!(config.sync.reconnect_backoff_ms, 5000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            port = 9000
            sync_mode = "subordinate"
            primary_address = "10.0.0.5"

            [engine]
            hardware_accel = false
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.sync_mode, SyncMode::Subordinate);
        assert_eq!(config.primary_address, "10.0.0.5");
        assert!(!config.engine.hardware_accel);
        assert_eq!(config.engine.display_output, "HDMI-A-1");
        assert_eq!(config.sync_port, 8765);
    }

    #[test]
    fn test_volume_is_clamped() {
        let config = TomlConfig::from_toml_str("volume = 250").unwrap();
        assert_eq!(config.volume, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(TomlConfig::from_toml_str("[engine]\nbinary = \"\"").is_err());
        assert!(TomlConfig::from_toml_str("[sync]\nbroadcast_interval_ms = 0").is_err());
        assert!(TomlConfig::from_toml_str("sync_mode = \"leader\"").is_err());
    }

    #[test]
    fn test_expand_home() {
        let plain = PathBuf::from("/srv/videos");
        assert_eq!(expand_home(&plain), plain);

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/videos")), home.join("videos"));
        }
    }

    #[test]
    fn test_display_of_sync_mode() {
        assert_eq!(SyncMode::Primary.to_string(), "primary");
        assert_eq!(SyncMode::Subordinate.to_string(), "subordinate");
        assert_eq!(SyncMode::Disabled.to_string(), "disabled");
    }
}
