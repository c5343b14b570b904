//! Cancellable background tasks
//!
//! Every long-running loop in the player (position poll, broadcast, accept,
//! subordinate receive) is spawned through [`TaskHandle::spawn`] so that its
//! owner can stop it deterministically and wait for it to release its
//! resources.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Receiving side of a task's shutdown request
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested (or the owner is gone)
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Owner side of a spawned loop
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `task` with a fresh shutdown signal
    pub fn spawn<F, Fut>(name: &'static str, task: F) -> Self
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, rx) = watch::channel(false);
        let handle = tokio::spawn(task(ShutdownSignal { rx }));
        debug!("Task '{}' started", name);
        Self {
            name,
            shutdown_tx,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request shutdown and wait up to `timeout` for the task to exit
    ///
    /// A task that misses the deadline is aborted; either way it has
    /// finished when this returns. Returns false if it had to be aborted.
    pub async fn stop(mut self, timeout: Duration) -> bool {
        let _ = self.shutdown_tx.send(true);

        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(())) => {
                debug!("Task '{}' stopped", self.name);
                true
            }
            Ok(Err(e)) => {
                warn!("Task '{}' ended abnormally: {}", self.name, e);
                true
            }
            Err(_) => {
                warn!(
                    "Task '{}' did not stop within {}ms, aborting",
                    self.name,
                    timeout.as_millis()
                );
                self.handle.abort();
                let _ = (&mut self.handle).await;
                false
            }
        }
    }
}
