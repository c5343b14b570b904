//! Engine invocation arguments
//!
//! Output selection is declarative: the configuration says which connector,
//! whether hardware decoding is wanted and whether to probe for a display;
//! [`build_args`] turns that into the engine's command line.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;
use vidsync_common::config::{DisplayMode, EngineConfig};

const TVSERVICE_TIMEOUT: Duration = Duration::from_secs(2);
const DRM_SYSFS_DIR: &str = "/sys/class/drm";

/// Launch options for the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub binary: String,
    pub hardware_accel: bool,
    pub display_output: String,
    pub display_mode: DisplayMode,
    pub drm_mode: String,
    pub audio_device: Option<String>,
    pub audio_channels: Option<String>,
    pub audio_samplerate: Option<u32>,
    pub socket_dir: PathBuf,
    pub extra_args: Vec<String>,
    /// Upper bound on waiting for the control socket after spawn
    pub ready_timeout: Duration,
    /// Time allowed between polite termination and kill
    pub terminate_grace: Duration,
    /// Round-trip timeout for commands
    pub command_timeout: Duration,
    /// Round-trip timeout for property reads
    pub property_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EngineOptions {
    fn from(config: &EngineConfig) -> Self {
        let audio_device = Some(config.audio_device.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let audio_channels = Some(config.audio_channels.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Self {
            binary: config.binary.clone(),
            hardware_accel: config.hardware_accel,
            display_output: config.display_output.clone(),
            display_mode: config.display_mode,
            drm_mode: config.drm_mode.clone(),
            audio_device,
            audio_channels,
            audio_samplerate: Some(config.audio_samplerate).filter(|&rate| rate > 0),
            socket_dir: config.socket_dir.clone(),
            extra_args: config.extra_args.clone(),
            ready_timeout: Duration::from_millis(1000),
            terminate_grace: Duration::from_millis(500),
            command_timeout: Duration::from_millis(1000),
            property_timeout: Duration::from_millis(500),
        }
    }
}

/// Build the full engine command line (excluding the binary itself)
///
/// `display_connected` selects rendered (DRM) output or headless null output.
pub fn build_args(
    options: &EngineOptions,
    display_connected: bool,
    volume: u8,
    socket_path: &Path,
    file: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    if display_connected {
        if options.hardware_accel {
            args.push("--hwdec=auto-copy".to_string());
        }
        args.push("--vo=drm".to_string());
        args.push(format!("--drm-mode={}", options.drm_mode));
        args.push(format!("--drm-connector={}", options.display_output));
    } else {
        args.extend(
            ["--vo=null", "--ao=null", "--no-video"]
                .iter()
                .map(|s| s.to_string()),
        );
    }

    args.extend(
        [
            "--fullscreen",
            "--no-border",
            "--no-osc",
            "--no-osd-bar",
            "--no-input-default-bindings",
            "--no-input-cursor",
            "--cursor-autohide=no",
            "--no-terminal",
            "--really-quiet",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    args.push(format!("--volume={}", volume.min(100)));
    args.push("--video-sync=display-resample".to_string());
    if let Some(channels) = &options.audio_channels {
        args.push(format!("--audio-channels={}", channels));
    }
    if let Some(rate) = options.audio_samplerate {
        args.push(format!("--audio-samplerate={}", rate));
    }
    if let Some(device) = &options.audio_device {
        args.push(format!("--audio-device={}", device));
    }

    args.push(format!("--input-ipc-server={}", socket_path.display()));
    args.extend(options.extra_args.iter().cloned());

    // Keep the file from being parsed as an option
    args.push("--".to_string());
    args.push(file.display().to_string());
    args
}

/// Decide whether to render, honoring a configured override
pub async fn resolve_display(options: &EngineOptions) -> bool {
    match options.display_mode {
        DisplayMode::Rendered => true,
        DisplayMode::Headless => false,
        DisplayMode::Auto => probe_display_connected(&options.display_output).await,
    }
}

/// Probe whether a display is attached to the output's connector family
///
/// Tries `tvservice -s` first (Raspberry Pi firmware), then DRM sysfs
/// status files. If neither source can be read, a display is assumed.
pub async fn probe_display_connected(display_output: &str) -> bool {
    if let Some(connected) = probe_tvservice().await {
        if connected {
            return true;
        }
    }

    let family = connector_family(display_output);
    match probe_drm_sysfs(Path::new(DRM_SYSFS_DIR), family) {
        Some(connected) => connected,
        None => {
            debug!("Display probe inconclusive, assuming a display is connected");
            true
        }
    }
}

async fn probe_tvservice() -> Option<bool> {
    let output = tokio::time::timeout(
        TVSERVICE_TIMEOUT,
        Command::new("tvservice").arg("-s").kill_on_drop(true).output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).contains("HDMI"))
}

/// `HDMI-A-1` → `HDMI`
fn connector_family(display_output: &str) -> &str {
    display_output
        .split('-')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("HDMI")
}

/// Scan `<dir>/card*-<family>-*/status` for a `connected` connector
///
/// Returns `None` when the directory cannot be read at all.
fn probe_drm_sysfs(dir: &Path, family: &str) -> Option<bool> {
    let entries = std::fs::read_dir(dir).ok()?;
    let needle = format!("-{}-", family);

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("card") || !name.contains(&needle) {
            continue;
        }
        if let Ok(status) = std::fs::read_to_string(entry.path().join("status")) {
            if status.trim() == "connected" {
                return Some(true);
            }
        }
    }
    Some(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options() -> EngineOptions {
        EngineOptions::default()
    }

    #[test]
    fn test_rendered_args_with_hwdec() {
        let args = build_args(
            &options(),
            true,
            75,
            Path::new("/tmp/s.sock"),
            Path::new("/videos/a.mp4"),
        );

        assert!(args.contains(&"--hwdec=auto-copy".to_string()));
        assert!(args.contains(&"--vo=drm".to_string()));
        assert!(args.contains(&"--drm-connector=HDMI-A-1".to_string()));
        assert!(args.contains(&"--drm-mode=1920x1080".to_string()));
        assert!(args.contains(&"--volume=75".to_string()));
        assert!(args.contains(&"--input-ipc-server=/tmp/s.sock".to_string()));
        assert!(!args.contains(&"--vo=null".to_string()));
        assert_eq!(args.last().unwrap(), "/videos/a.mp4");
    }

    #[test]
    fn test_rendered_args_without_hwdec() {
        let mut opts = options();
        opts.hardware_accel = false;
        let args = build_args(&opts, true, 100, Path::new("/s"), Path::new("/a.mp4"));
        assert!(!args.iter().any(|a| a.starts_with("--hwdec")));
        assert!(args.contains(&"--vo=drm".to_string()));
    }

    #[test]
    fn test_headless_args() {
        let args = build_args(&options(), false, 100, Path::new("/s"), Path::new("/a.mp4"));
        assert!(args.contains(&"--vo=null".to_string()));
        assert!(args.contains(&"--ao=null".to_string()));
        assert!(args.contains(&"--no-video".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--drm")));
        assert!(!args.iter().any(|a| a.starts_with("--hwdec")));
    }

    #[test]
    fn test_optional_audio_device_and_extra_args() {
        let mut opts = options();
        opts.audio_device = Some("alsa/hdmi:CARD=vc4hdmi0,DEV=0".to_string());
        opts.extra_args = vec!["--loop-file=no".to_string()];
        let args = build_args(&opts, false, 100, Path::new("/s"), Path::new("/a.mp4"));

        assert!(args.contains(&"--audio-device=alsa/hdmi:CARD=vc4hdmi0,DEV=0".to_string()));
        let extra = args.iter().position(|a| a == "--loop-file=no").unwrap();
        let sep = args.iter().position(|a| a == "--").unwrap();
        assert!(extra < sep);
    }

    #[test]
    fn test_volume_clamped_in_args() {
        let args = build_args(&options(), false, 200, Path::new("/s"), Path::new("/a.mp4"));
        assert!(args.contains(&"--volume=100".to_string()));
    }

    #[test]
    fn test_empty_audio_device_in_config_is_none() {
        let config = EngineConfig::default();
        assert_eq!(EngineOptions::from(&config).audio_device, None);
    }

    #[test]
    fn test_hdmi_audio_format_defaults() {
        let args = build_args(&options(), true, 100, Path::new("/s"), Path::new("/a.mp4"));
        assert!(args.contains(&"--audio-channels=stereo".to_string()));
        assert!(args.contains(&"--audio-samplerate=48000".to_string()));

        let mut config = EngineConfig::default();
        config.audio_channels = " ".to_string();
        config.audio_samplerate = 0;
        let opts = EngineOptions::from(&config);
        let args = build_args(&opts, true, 100, Path::new("/s"), Path::new("/a.mp4"));
        assert!(!args.iter().any(|a| a.starts_with("--audio-channels")));
        assert!(!args.iter().any(|a| a.starts_with("--audio-samplerate")));
    }

    #[test]
    fn test_connector_family() {
        assert_eq!(connector_family("HDMI-A-1"), "HDMI");
        assert_eq!(connector_family("DSI-1"), "DSI");
        assert_eq!(connector_family(""), "HDMI");
    }

    #[test]
    fn test_drm_sysfs_probe() {
        let dir = TempDir::new().unwrap();
        let hdmi = dir.path().join("card1-HDMI-A-1");
        std::fs::create_dir_all(&hdmi).unwrap();
        std::fs::write(hdmi.join("status"), "disconnected\n").unwrap();

        assert_eq!(probe_drm_sysfs(dir.path(), "HDMI"), Some(false));

        std::fs::write(hdmi.join("status"), "connected\n").unwrap();
        assert_eq!(probe_drm_sysfs(dir.path(), "HDMI"), Some(true));
        assert_eq!(probe_drm_sysfs(dir.path(), "DSI"), Some(false));
        assert_eq!(probe_drm_sysfs(&dir.path().join("missing"), "HDMI"), None);
    }

    #[tokio::test]
    async fn test_display_mode_override() {
        let mut opts = options();
        opts.display_mode = DisplayMode::Headless;
        assert!(!resolve_display(&opts).await);
        opts.display_mode = DisplayMode::Rendered;
        assert!(resolve_display(&opts).await);
    }
}
