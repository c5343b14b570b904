//! Primary role
//!
//! Listens for subordinates, sends each one the current state as soon as it
//! connects, then pushes a fresh snapshot every broadcast interval while
//! playing. Discrete commands are relayed on demand through [`relay`].
//!
//! [`relay`]: PrimaryCoordinator::relay

use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, trace, warn};
use vidsync_common::{Lifecycle, SyncCommand, SyncMessage};

use super::registry::SubordinateRegistry;
use super::{SyncError, SyncSettings, MAX_LINE_LENGTH};
use crate::playback::PlaybackController;
use crate::task::{ShutdownSignal, TaskHandle};

/// Running primary: listener, broadcast loop and connected subordinates
pub struct PrimaryCoordinator {
    controller: Arc<PlaybackController>,
    registry: Arc<SubordinateRegistry>,
    local_addr: SocketAddr,
    send_timeout: Duration,
    accept_task: Option<TaskHandle>,
    broadcast_task: Option<TaskHandle>,
}

impl PrimaryCoordinator {
    /// Bind the sync port and start accepting and broadcasting
    pub async fn start(
        controller: Arc<PlaybackController>,
        settings: &SyncSettings,
    ) -> Result<Self, SyncError> {
        let address = settings.listen_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| SyncError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| SyncError::Bind {
            address: address.clone(),
            source,
        })?;
        info!("Sync primary listening on {}", local_addr);

        let registry = Arc::new(SubordinateRegistry::new());

        let accept_task = {
            let controller = Arc::clone(&controller);
            let registry = Arc::clone(&registry);
            let send_timeout = settings.send_timeout;
            TaskHandle::spawn("sync-accept", move |shutdown| {
                accept_loop(listener, controller, registry, send_timeout, shutdown)
            })
        };

        let broadcast_task = {
            let controller = Arc::clone(&controller);
            let registry = Arc::clone(&registry);
            let interval = settings.broadcast_interval;
            let send_timeout = settings.send_timeout;
            TaskHandle::spawn("sync-broadcast", move |mut shutdown| async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = ticker.tick() => {
                            broadcast_once(&controller, &registry, send_timeout).await;
                        }
                    }
                }
                debug!("Sync broadcast loop exiting");
            })
        };

        Ok(Self {
            controller,
            registry,
            local_addr,
            send_timeout: settings.send_timeout,
            accept_task: Some(accept_task),
            broadcast_task: Some(broadcast_task),
        })
    }

    /// Address actually bound (useful when configured with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn subordinate_count(&self) -> usize {
        self.registry.len().await
    }

    /// Run one broadcast tick now; returns the number of deliveries
    pub async fn broadcast_tick(&self) -> usize {
        broadcast_once(&self.controller, &self.registry, self.send_timeout).await
    }

    /// Send `command` to every subordinate; returns the number of deliveries
    pub async fn relay(&self, command: &SyncCommand) -> usize {
        if self.registry.is_empty().await {
            return 0;
        }
        let line = match SyncMessage::Command(command.clone()).to_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode {} command: {}", command.verb(), e);
                return 0;
            }
        };

        let delivered = self.registry.send_all(&line, self.send_timeout).await;
        debug!("Relayed {} to {} subordinate(s)", command.verb(), delivered);
        delivered
    }

    /// Stop both loops, close every connection and release the port
    pub async fn shutdown(mut self, timeout: Duration) {
        if let Some(task) = self.broadcast_task.take() {
            task.stop(timeout).await;
        }
        if let Some(task) = self.accept_task.take() {
            task.stop(timeout).await;
        }
        self.registry.clear().await;
        info!("Sync primary on {} stopped", self.local_addr);
    }
}

async fn broadcast_once(
    controller: &PlaybackController,
    registry: &SubordinateRegistry,
    send_timeout: Duration,
) -> usize {
    if registry.is_empty().await {
        return 0;
    }

    let snapshot = controller.snapshot().await;
    if snapshot.lifecycle != Lifecycle::Playing {
        return 0;
    }

    match SyncMessage::Sync(snapshot).to_line() {
        Ok(line) => {
            let delivered = registry.send_all(&line, send_timeout).await;
            trace!("Broadcast snapshot to {} subordinate(s)", delivered);
            delivered
        }
        Err(e) => {
            warn!("Failed to encode snapshot: {}", e);
            0
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    controller: Arc<PlaybackController>,
    registry: Arc<SubordinateRegistry>,
    send_timeout: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut readers = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            Some(_) = readers.join_next(), if !readers.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Some((id, reader)) =
                        register(stream, peer, &controller, &registry, send_timeout).await
                    {
                        let registry = Arc::clone(&registry);
                        let signal = shutdown.clone();
                        readers.spawn(read_loop(id, peer, reader, registry, signal));
                    }
                }
                Err(e) => {
                    warn!("Sync accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    readers.shutdown().await;
    debug!("Sync accept loop exiting");
}

type LineReader = FramedRead<tokio::net::tcp::OwnedReadHalf, LinesCodec>;

/// Add a fresh connection and send it the current state
async fn register(
    stream: TcpStream,
    peer: SocketAddr,
    controller: &PlaybackController,
    registry: &SubordinateRegistry,
    send_timeout: Duration,
) -> Option<(u64, LineReader)> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay failed for {}: {}", peer, e);
    }
    let (read, write) = stream.into_split();
    let reader = FramedRead::new(read, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let writer = FramedWrite::new(write, LinesCodec::new());

    let id = registry.insert(peer, writer).await;

    let snapshot = controller.snapshot().await;
    match SyncMessage::Sync(snapshot).to_line() {
        Ok(line) => {
            if !registry.send_to(id, &line, send_timeout).await {
                return None;
            }
        }
        Err(e) => warn!("Failed to encode initial snapshot: {}", e),
    }
    Some((id, reader))
}

/// Drain what a subordinate sends until it disconnects
async fn read_loop(
    id: u64,
    peer: SocketAddr,
    mut reader: LineReader,
    registry: Arc<SubordinateRegistry>,
    mut shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            _ = shutdown.wait() => return,
            next = reader.next() => match next {
                Some(Ok(line)) => match SyncMessage::from_line(&line) {
                    Ok(SyncMessage::Heartbeat) => trace!("Heartbeat from {}", peer),
                    Ok(other) => debug!("Ignoring unexpected message from {}: {:?}", peer, other),
                    Err(e) => debug!("Malformed line from {}: {}", peer, e),
                },
                Some(Err(e)) => {
                    debug!("Read from {} failed: {}", peer, e);
                    break;
                }
                None => break,
            }
        }
    }
    registry.remove(id).await;
}
