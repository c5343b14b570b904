//! Role switching
//!
//! [`SyncService`] owns at most one coordinator. A role change always tears
//! the old coordinator down completely (listener closed, tasks joined)
//! before the new one starts, so switching back to primary can rebind the
//! same port.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use vidsync_common::SyncCommand;

use super::primary::PrimaryCoordinator;
use super::subordinate::SubordinateCoordinator;
use super::{parse_primary_address, SyncError, SyncRole, SyncSettings};
use crate::playback::PlaybackController;

enum Active {
    Disabled,
    Primary(PrimaryCoordinator),
    Subordinate(SubordinateCoordinator),
}

impl Active {
    fn role(&self) -> SyncRole {
        match self {
            Active::Disabled => SyncRole::Disabled,
            Active::Primary(_) => SyncRole::Primary,
            Active::Subordinate(sub) => SyncRole::Subordinate {
                primary_address: sub.primary_address().to_string(),
            },
        }
    }
}

pub struct SyncService {
    controller: Arc<PlaybackController>,
    settings: SyncSettings,
    active: Mutex<Active>,
}

impl SyncService {
    /// Service with sync disabled
    pub fn new(controller: Arc<PlaybackController>, settings: SyncSettings) -> Self {
        Self {
            controller,
            settings,
            active: Mutex::new(Active::Disabled),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Switch to `role`
    pub async fn apply_role(&self, role: SyncRole) -> Result<(), SyncError> {
        match role {
            SyncRole::Primary => self.set_primary().await,
            SyncRole::Subordinate { primary_address } => {
                self.set_subordinate(&primary_address).await
            }
            SyncRole::Disabled => {
                self.set_disabled().await;
                Ok(())
            }
        }
    }

    /// Become the primary
    ///
    /// If the port cannot be bound the service is left disabled.
    pub async fn set_primary(&self) -> Result<(), SyncError> {
        let mut active = self.active.lock().await;
        self.teardown(&mut active).await;

        let primary = PrimaryCoordinator::start(Arc::clone(&self.controller), &self.settings).await?;
        *active = Active::Primary(primary);
        info!("Sync mode: primary");
        Ok(())
    }

    /// Follow the primary at `primary_address`
    ///
    /// An empty address is rejected before the current role is touched.
    pub async fn set_subordinate(&self, primary_address: &str) -> Result<(), SyncError> {
        let address = parse_primary_address(primary_address, self.settings.sync_port)?;

        let mut active = self.active.lock().await;
        self.teardown(&mut active).await;

        *active = Active::Subordinate(SubordinateCoordinator::start(
            Arc::clone(&self.controller),
            address,
            &self.settings,
        ));
        info!("Sync mode: subordinate");
        Ok(())
    }

    pub async fn set_disabled(&self) {
        let mut active = self.active.lock().await;
        self.teardown(&mut active).await;
        info!("Sync mode: disabled");
    }

    pub async fn role(&self) -> SyncRole {
        self.active.lock().await.role()
    }

    /// Relay `command` if primary; returns the number of deliveries
    pub async fn relay(&self, command: &SyncCommand) -> usize {
        match &*self.active.lock().await {
            Active::Primary(primary) => primary.relay(command).await,
            _ => 0,
        }
    }

    /// Broadcast tick on demand; 0 unless primary
    pub async fn broadcast_now(&self) -> usize {
        match &*self.active.lock().await {
            Active::Primary(primary) => primary.broadcast_tick().await,
            _ => 0,
        }
    }

    /// Bound sync address while primary
    pub async fn primary_local_addr(&self) -> Option<SocketAddr> {
        match &*self.active.lock().await {
            Active::Primary(primary) => Some(primary.local_addr()),
            _ => None,
        }
    }

    pub async fn subordinate_count(&self) -> usize {
        match &*self.active.lock().await {
            Active::Primary(primary) => primary.subordinate_count().await,
            _ => 0,
        }
    }

    /// Whether a subordinate is currently connected to its primary
    pub async fn is_connected(&self) -> bool {
        match &*self.active.lock().await {
            Active::Subordinate(sub) => sub.is_connected(),
            _ => false,
        }
    }

    /// Stop whatever coordinator is running
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        self.teardown(&mut active).await;
    }

    async fn teardown(&self, active: &mut Active) {
        let timeout = self.settings.shutdown_timeout;
        match std::mem::replace(active, Active::Disabled) {
            Active::Disabled => {}
            Active::Primary(primary) => primary.shutdown(timeout).await,
            Active::Subordinate(sub) => sub.shutdown(timeout).await,
        }
    }
}
