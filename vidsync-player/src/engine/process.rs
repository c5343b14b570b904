//! Engine subprocess ownership
//!
//! [`MpvEngine`] launches one engine process per played file, attached to a
//! freshly named control socket, and tears it down in escalating steps:
//! IPC `quit`, then SIGTERM, then SIGKILL, each followed by the grace period.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::ipc::ControlChannel;
use super::options::{build_args, resolve_display, EngineOptions};
use super::{EngineBackend, EngineError, EngineRequest};

const READY_POLL_STEP: Duration = Duration::from_millis(50);

static SOCKET_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// mpv-compatible engine driven over its JSON IPC socket
pub struct MpvEngine {
    options: EngineOptions,
    child: Option<Child>,
    channel: Option<ControlChannel>,
}

impl MpvEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            child: None,
            channel: None,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Control socket of the running engine, if any
    pub fn socket_path(&self) -> Option<&Path> {
        self.channel.as_ref().map(ControlChannel::path)
    }

    fn next_socket_path(&self) -> PathBuf {
        let seq = SOCKET_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        self.options
            .socket_dir
            .join(format!("vidsync-{}-{}.sock", std::process::id(), seq))
    }

    /// Poll until the control socket accepts connections
    ///
    /// Running out of time is not an error: the engine may still be coming
    /// up and callers tolerate early command failures. Exiting is an error.
    async fn wait_until_ready(&mut self, channel: &ControlChannel) -> Result<(), EngineError> {
        let deadline = Instant::now() + self.options.ready_timeout;
        loop {
            if channel.is_connectable().await {
                debug!("Engine control socket ready at {}", channel.path().display());
                return Ok(());
            }

            if let Some(child) = self.child.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(EngineError::Spawn(format!(
                        "engine exited during startup ({})",
                        status
                    )));
                }
            }

            if Instant::now() >= deadline {
                debug!(
                    "Engine control socket not connectable after {}ms, continuing",
                    self.options.ready_timeout.as_millis()
                );
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_STEP).await;
        }
    }
}

/// Wait up to `grace` for `child` to exit
async fn wait_for_exit(child: &mut Child, grace: Duration) -> Result<Option<ExitStatus>, EngineError> {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => Ok(Some(status)),
        Ok(Err(e)) => Err(EngineError::Process(format!("wait failed: {}", e))),
        Err(_) => Ok(None),
    }
}

fn send_sigterm(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        debug!(
            "SIGTERM to {} failed: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

/// Reap an engine that was already asked to quit
async fn reap(child: &mut Child, grace: Duration) -> Result<(), EngineError> {
    if let Some(status) = wait_for_exit(child, grace).await? {
        debug!("Engine exited with {}", status);
        return Ok(());
    }

    if let Some(pid) = child.id() {
        debug!("Engine {} still running after quit, sending SIGTERM", pid);
        send_sigterm(pid);
        if let Some(status) = wait_for_exit(child, grace).await? {
            debug!("Engine exited with {}", status);
            return Ok(());
        }
    }

    warn!(
        "Engine ignored quit and SIGTERM for {}ms each, killing",
        grace.as_millis()
    );
    child
        .kill()
        .await
        .map_err(|e| EngineError::Process(format!("kill failed: {}", e)))
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed control socket {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove control socket {}: {}", path.display(), e),
    }
}

#[async_trait]
impl EngineBackend for MpvEngine {
    async fn launch(&mut self, file: &Path, volume: u8) -> Result<(), EngineError> {
        if self.child.is_some() || self.channel.is_some() {
            if let Err(e) = self.terminate().await {
                warn!("Previous engine did not terminate cleanly: {}", e);
            }
        }

        let socket_path = self.next_socket_path();
        remove_socket_file(&socket_path);

        let display_connected = resolve_display(&self.options).await;
        if !display_connected {
            info!("No display detected - running engine headless");
        }
        let args = build_args(&self.options, display_connected, volume, &socket_path, file);
        debug!("Launching {} {:?}", self.options.binary, args);

        let child = Command::new(&self.options.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {}", self.options.binary, e)))?;

        info!(
            "Engine started (pid {:?}) for {}",
            child.id(),
            file.display()
        );
        self.child = Some(child);

        let channel = ControlChannel::new(socket_path);
        self.channel = Some(channel.clone());

        if let Err(e) = self.wait_until_ready(&channel).await {
            if let Err(cleanup) = self.terminate().await {
                debug!("Cleanup after failed start: {}", cleanup);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn send(&self, request: EngineRequest) -> Result<Value, EngineError> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| EngineError::ChannelUnavailable("engine not running".to_string()))?;

        let timeout = match request {
            EngineRequest::GetProperty(_) => self.options.property_timeout,
            _ => self.options.command_timeout,
        };
        channel.request(request.to_command(), timeout).await
    }

    async fn terminate(&mut self) -> Result<(), EngineError> {
        let mut result = Ok(());
        let channel = self.channel.take();

        if let Some(channel) = &channel {
            if let Err(e) = channel
                .request(EngineRequest::Quit.to_command(), self.options.command_timeout)
                .await
            {
                debug!("Quit request not delivered: {}", e);
            }
        }

        if let Some(mut child) = self.child.take() {
            result = reap(&mut child, self.options.terminate_grace).await;
        }

        if let Some(channel) = &channel {
            remove_socket_file(channel.path());
        }
        result
    }

    fn has_exited(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(Some(_))),
            None => false,
        }
    }
}

impl Drop for MpvEngine {
    fn drop(&mut self) {
        // The child itself is killed by kill_on_drop
        if let Some(channel) = &self.channel {
            remove_socket_file(channel.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options_in(dir: &Path) -> EngineOptions {
        let mut options = EngineOptions::default();
        options.socket_dir = dir.to_path_buf();
        options.display_mode = vidsync_common::config::DisplayMode::Headless;
        options.ready_timeout = Duration::from_millis(200);
        options.terminate_grace = Duration::from_millis(200);
        options
    }

    #[test]
    fn test_socket_paths_are_unique() {
        let dir = TempDir::new().unwrap();
        let engine = MpvEngine::new(options_in(dir.path()));
        let a = engine.next_socket_path();
        let b = engine.next_socket_path();
        assert_ne!(a, b);
        assert!(a.starts_with(dir.path()));
        assert!(a.to_string_lossy().ends_with(".sock"));
    }

    #[tokio::test]
    async fn test_send_without_engine_is_channel_unavailable() {
        let dir = TempDir::new().unwrap();
        let engine = MpvEngine::new(options_in(dir.path()));
        let result = engine.send(EngineRequest::TogglePause).await;
        assert!(matches!(result, Err(EngineError::ChannelUnavailable(_))));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let mut options = options_in(dir.path());
        options.binary = "/nonexistent/vidsync-engine".to_string();
        let mut engine = MpvEngine::new(options);

        let result = engine.launch(Path::new("/tmp/a.mp4"), 50).await;
        assert!(matches!(result, Err(EngineError::Spawn(_))));
        assert!(!engine.has_exited());
        assert!(engine.socket_path().is_none());
    }

    #[tokio::test]
    async fn test_terminate_without_engine_is_ok() {
        let dir = TempDir::new().unwrap();
        let mut engine = MpvEngine::new(options_in(dir.path()));
        assert!(engine.terminate().await.is_ok());
    }

    #[tokio::test]
    async fn test_engine_that_exits_immediately_fails_launch() {
        let dir = TempDir::new().unwrap();
        let mut options = options_in(dir.path());
        // `false` ignores its arguments and exits non-zero
        options.binary = "false".to_string();
        options.ready_timeout = Duration::from_secs(3);
        let mut engine = MpvEngine::new(options);

        let result = engine.launch(Path::new("/tmp/a.mp4"), 50).await;
        assert!(matches!(result, Err(EngineError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_engine_without_socket_gets_sigterm_before_kill() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("terminated");
        let script = dir.path().join("stubborn-engine.sh");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\ntrap 'echo term > \"{}\"; exit 0' TERM\nwhile true; do sleep 0.05; done\n",
                marker.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut options = options_in(dir.path());
        options.binary = script.display().to_string();
        options.terminate_grace = Duration::from_millis(500);
        let mut engine = MpvEngine::new(options);

        // The control socket never appears, so quit cannot be delivered
        engine.launch(Path::new("/tmp/a.mp4"), 50).await.unwrap();
        assert!(engine.terminate().await.is_ok());

        assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "term");
        assert!(!engine.has_exited());
    }
}
