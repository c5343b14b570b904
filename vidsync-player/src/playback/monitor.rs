//! Position poll task
//!
//! Refreshes position and duration from the engine on a fixed interval and
//! drives end-of-stream handling. Holds only a weak reference so the task
//! never keeps a dropped controller alive.

use std::sync::Weak;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::controller::PlaybackController;
use crate::task::TaskHandle;

pub(super) fn spawn_poll_task(
    controller: Weak<PlaybackController>,
    poll_interval: Duration,
) -> TaskHandle {
    TaskHandle::spawn("playback-poll", move |mut shutdown| async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    let Some(controller) = controller.upgrade() else {
                        break;
                    };
                    controller.poll_once().await;
                }
            }
        }
        debug!("Playback poll task exiting");
    })
}
