//! Drift correction on a subordinate
//!
//! Each snapshot from the primary is compared against local state and turned
//! into an ordered list of [`Correction`]s. Planning is pure; only
//! [`apply_corrections`] touches the controller.
//!
//! | condition (primary playing)   | action                       |
//! |-------------------------------|------------------------------|
//! | drift > 1.0s                  | seek to primary + 0.2s       |
//! | 0.2s < drift <= 1.0s          | speed 1.05 behind, 0.95 ahead|
//! | drift <= 0.2s                 | speed 1.0                    |
//! | volume differs by more than 5 | adopt primary volume         |

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vidsync_common::{Lifecycle, SyncSnapshot};

use crate::media::{resolve_basename, sanitize_name};
use crate::playback::{PlaybackController, PlaybackState};

/// Drift beyond which the subordinate jumps instead of adjusting speed
pub const SEEK_THRESHOLD: f64 = 1.0;
/// Drift within which playback runs at normal speed
pub const SPEED_THRESHOLD: f64 = 0.2;
/// Added to the primary position on a corrective seek to cover seek latency
pub const SEEK_LEAD: f64 = 0.2;
pub const CATCH_UP_SPEED: f64 = 1.05;
pub const SLOW_DOWN_SPEED: f64 = 0.95;
/// Largest tolerated volume difference
pub const VOLUME_TOLERANCE: u8 = 5;

/// One corrective action, applied in order
#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    Play(PathBuf),
    Resume,
    Pause,
    Stop,
    Seek(f64),
    SetSpeed(f64),
    SetVolume(u8),
}

/// Outcome of matching the primary's file against the local library
#[derive(Debug, Clone, PartialEq)]
pub enum FileCheck {
    /// Same file (by name), or the primary reports none
    Unchanged,
    /// File that exists locally and must be (re)launched
    Switch(PathBuf),
    /// Different file that is not in the local media directory
    Missing(String),
}

/// Compare the snapshot's file with the local one by basename
///
/// Devices keep their libraries in different directories, so only the file
/// name is meaningful across the wire. A stopped subordinate still showing
/// the primary's file (end of stream keeps the title) has no engine left, so
/// it is relaunched whenever the primary is playing or paused.
pub async fn check_file(snapshot: &SyncSnapshot, local: &PlaybackState, media_dir: &Path) -> FileCheck {
    let Some(remote) = snapshot.current_file.as_deref() else {
        return FileCheck::Unchanged;
    };
    let Some(remote_name) = sanitize_name(remote) else {
        return FileCheck::Unchanged;
    };

    let local_name = local
        .current_file
        .as_deref()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str());
    let needs_engine =
        local.lifecycle == Lifecycle::Stopped && snapshot.lifecycle != Lifecycle::Stopped;
    if local_name == Some(remote_name.as_str()) && !needs_engine {
        return FileCheck::Unchanged;
    }

    match resolve_basename(media_dir, &remote_name).await {
        Some(path) => FileCheck::Switch(path),
        None => FileCheck::Missing(remote_name),
    }
}

/// Decide how to bring `local` in line with `snapshot`
///
/// A missing file yields no corrections at all. After a planned file switch
/// the remaining steps assume the local engine starts playing from 0.
pub fn plan_corrections(
    snapshot: &SyncSnapshot,
    local: &PlaybackState,
    file: FileCheck,
) -> Vec<Correction> {
    let mut plan = Vec::new();
    let mut local = local.clone();

    match file {
        FileCheck::Unchanged => {}
        FileCheck::Missing(_) => return plan,
        FileCheck::Switch(path) => {
            plan.push(Correction::Play(path.clone()));
            local.start(path);
        }
    }

    match (snapshot.lifecycle, local.lifecycle) {
        (Lifecycle::Playing, l) if l != Lifecycle::Playing => plan.push(Correction::Resume),
        (Lifecycle::Paused, l) if l != Lifecycle::Paused => plan.push(Correction::Pause),
        (Lifecycle::Stopped, l) if l != Lifecycle::Stopped => plan.push(Correction::Stop),
        _ => {}
    }

    if snapshot.lifecycle == Lifecycle::Playing {
        let drift = (snapshot.position - local.position).abs();
        if drift > SEEK_THRESHOLD {
            plan.push(Correction::Seek(snapshot.position + SEEK_LEAD));
        } else if drift > SPEED_THRESHOLD {
            let speed = if local.position < snapshot.position {
                CATCH_UP_SPEED
            } else {
                SLOW_DOWN_SPEED
            };
            plan.push(Correction::SetSpeed(speed));
        } else {
            plan.push(Correction::SetSpeed(1.0));
        }
    }

    if snapshot.volume.abs_diff(local.volume) > VOLUME_TOLERANCE {
        plan.push(Correction::SetVolume(snapshot.volume));
    }

    plan
}

/// Apply `plan` to the controller in order
///
/// A failed file switch abandons the rest of the plan; other failures are
/// logged and the next correction is still attempted.
pub async fn apply_corrections(controller: &PlaybackController, plan: &[Correction]) {
    for correction in plan {
        let result = match correction {
            Correction::Play(path) => {
                info!("Sync: switching to {}", path.display());
                if let Err(e) = controller.play(path).await {
                    warn!("Sync: failed to play {}: {}", path.display(), e);
                    return;
                }
                Ok(())
            }
            Correction::Resume => controller.resume().await,
            Correction::Pause => controller.pause().await,
            Correction::Stop => {
                controller.stop().await;
                Ok(())
            }
            Correction::Seek(position) => {
                debug!("Sync: seeking to {:.2}s", position);
                controller.seek(*position).await
            }
            Correction::SetSpeed(speed) => controller.set_playback_speed(*speed).await,
            Correction::SetVolume(level) => controller
                .set_volume(i64::from(*level))
                .await
                .map(|_| ()),
        };

        if let Err(e) = result {
            warn!("Sync: {:?} failed: {}", correction, e);
        }
    }
}

/// Check, plan and apply one snapshot; returns the applied plan
pub async fn correct(
    controller: &PlaybackController,
    snapshot: &SyncSnapshot,
    media_dir: &Path,
) -> Vec<Correction> {
    let local = controller.state().await;
    let file = check_file(snapshot, &local, media_dir).await;
    if let FileCheck::Missing(name) = &file {
        warn!("Sync: {} not found in {}", name, media_dir.display());
    }

    let plan = plan_corrections(snapshot, &local, file);
    if !plan.is_empty() {
        debug!("Sync corrections: {:?}", plan);
    }
    apply_corrections(controller, &plan).await;
    plan
}
