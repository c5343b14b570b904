//! Subordinate role
//!
//! A single task owns the one connection to the primary. Any failure closes
//! it, waits out the reconnect backoff and dials again, until shutdown.

use futures::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, info, trace, warn};
use vidsync_common::{SyncCommand, SyncMessage};

use super::{drift, SyncError, SyncSettings, MAX_LINE_LENGTH};
use crate::media::resolve_basename;
use crate::playback::PlaybackController;
use crate::task::{ShutdownSignal, TaskHandle};

/// Running subordinate connection loop
pub struct SubordinateCoordinator {
    primary_address: String,
    connected: Arc<AtomicBool>,
    task: Option<TaskHandle>,
}

impl SubordinateCoordinator {
    /// Start following the primary at `primary_address` (`host:port`)
    ///
    /// Never fails: an unreachable primary is retried in the background.
    pub fn start(
        controller: Arc<PlaybackController>,
        primary_address: String,
        settings: &SyncSettings,
    ) -> Self {
        let connected = Arc::new(AtomicBool::new(false));
        let task = {
            let address = primary_address.clone();
            let connected = Arc::clone(&connected);
            let settings = settings.clone();
            TaskHandle::spawn("sync-subordinate", move |shutdown| {
                connection_loop(address, controller, settings, connected, shutdown)
            })
        };
        info!("Sync subordinate following {}", primary_address);

        Self {
            primary_address,
            connected,
            task: Some(task),
        }
    }

    pub fn primary_address(&self) -> &str {
        &self.primary_address
    }

    /// True while a connection to the primary is open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Stop the loop and close the connection
    pub async fn shutdown(mut self, timeout: Duration) {
        if let Some(task) = self.task.take() {
            task.stop(timeout).await;
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("Sync subordinate for {} stopped", self.primary_address);
    }
}

async fn connection_loop(
    address: String,
    controller: Arc<PlaybackController>,
    settings: SyncSettings,
    connected: Arc<AtomicBool>,
    mut shutdown: ShutdownSignal,
) {
    loop {
        let attempt = tokio::select! {
            _ = shutdown.wait() => break,
            attempt = tokio::time::timeout(settings.connect_timeout, TcpStream::connect(&address)) => attempt,
        };

        match attempt {
            Ok(Ok(stream)) => {
                info!("Connected to primary {}", address);
                connected.store(true, Ordering::SeqCst);
                let outcome = run_session(stream, &controller, &settings, &mut shutdown).await;
                connected.store(false, Ordering::SeqCst);
                match outcome {
                    Ok(()) => break,
                    Err(e) => warn!("Lost connection to primary {}: {}", address, e),
                }
            }
            Ok(Err(e)) => warn!("Cannot reach primary {}: {}", address, e),
            Err(_) => warn!(
                "Connecting to primary {} timed out after {}ms",
                address,
                settings.connect_timeout.as_millis()
            ),
        }

        debug!(
            "Reconnecting to {} in {}ms",
            address,
            settings.reconnect_backoff.as_millis()
        );
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(settings.reconnect_backoff) => {}
        }
    }
    debug!("Sync subordinate loop exiting");
}

/// Serve one connection; `Ok` only when shutdown was requested
async fn run_session(
    stream: TcpStream,
    controller: &PlaybackController,
    settings: &SyncSettings,
    shutdown: &mut ShutdownSignal,
) -> Result<(), SyncError> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay failed: {}", e);
    }
    let (read, write) = stream.into_split();
    let mut reader = FramedRead::new(read, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut writer = FramedWrite::new(write, LinesCodec::new());

    loop {
        let next = tokio::select! {
            _ = shutdown.wait() => return Ok(()),
            next = tokio::time::timeout(settings.heartbeat_interval, reader.next()) => next,
        };

        match next {
            Err(_) => {
                let line = SyncMessage::Heartbeat.to_line()?;
                match tokio::time::timeout(settings.send_timeout, writer.send(line)).await {
                    Ok(Ok(())) => trace!("Heartbeat sent"),
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => {
                        return Err(SyncError::ConnectionLost("heartbeat send timed out".to_string()))
                    }
                }
            }
            Ok(None) => {
                return Err(SyncError::ConnectionLost("closed by primary".to_string()));
            }
            Ok(Some(Err(LinesCodecError::MaxLineLengthExceeded))) => {
                warn!("Skipping oversized line from primary");
            }
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(Some(Ok(line))) => handle_line(&line, controller, &settings.media_dir).await,
        }
    }
}

async fn handle_line(line: &str, controller: &PlaybackController, media_dir: &Path) {
    match SyncMessage::from_line(line) {
        Ok(SyncMessage::Sync(snapshot)) => {
            drift::correct(controller, &snapshot, media_dir).await;
        }
        Ok(SyncMessage::Command(command)) => {
            execute_command(controller, command, media_dir).await;
        }
        Ok(SyncMessage::Heartbeat) => trace!("Heartbeat from primary"),
        Err(e) => warn!("Skipping malformed sync message: {}", e),
    }
}

/// Run a relayed command locally; never relayed further
pub async fn execute_command(
    controller: &PlaybackController,
    command: SyncCommand,
    media_dir: &Path,
) {
    info!("Received {} command from primary", command.verb());
    let result = match &command {
        SyncCommand::Play { file } => match resolve_basename(media_dir, file).await {
            Some(path) => controller.play(&path).await,
            None => {
                warn!("{} not found in {}", file, media_dir.display());
                return;
            }
        },
        SyncCommand::Pause => controller.pause().await,
        SyncCommand::Resume => controller.resume().await,
        SyncCommand::Stop => {
            controller.stop().await;
            Ok(())
        }
        SyncCommand::Seek { position } => controller.seek(*position).await,
    };

    if let Err(e) = result {
        warn!("Relayed {} failed: {}", command.verb(), e);
    }
}
