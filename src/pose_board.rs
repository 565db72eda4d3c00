// src/pose_board.rs - Single owner of the visualised pose
//! The visualised pose has two possible writers: the live feed and a playback
//! run. [`PoseBoard`] is the only place that pose is written; a writer that does
//! not currently own the board is refused, so the two never interleave.
//!
//! Ownership belongs to the live feed by default. A playback run takes it with
//! [`PoseBoard::acquire_playback`] and gives it back when the returned guard is
//! dropped, whichever way the run ends.

use crate::joints::Pose;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseWriter {
    LiveFeed,
    Playback,
}

/// What the renderer sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualPose {
    pub pose: Pose,
    pub owner: PoseWriter,
    /// Bumped on every accepted write.
    pub revision: u64,
}

struct BoardInner {
    owner: Mutex<PoseWriter>,
    publish: watch::Sender<VisualPose>,
}

#[derive(Clone)]
pub struct PoseBoard {
    inner: Arc<BoardInner>,
}

impl Default for PoseBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseBoard {
    pub fn new() -> Self {
        let (publish, _) = watch::channel(VisualPose {
            pose: Pose::new(),
            owner: PoseWriter::LiveFeed,
            revision: 0,
        });
        Self {
            inner: Arc::new(BoardInner {
                owner: Mutex::new(PoseWriter::LiveFeed),
                publish,
            }),
        }
    }

    fn owner_lock(&self) -> MutexGuard<'_, PoseWriter> {
        // The guarded value is a plain enum; a poisoned lock still holds a valid one.
        self.inner.owner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn owner(&self) -> PoseWriter {
        *self.owner_lock()
    }

    /// Merge `pose` into the visualised pose if `writer` owns the board.
    /// Returns whether the write was accepted.
    pub fn apply(&self, writer: PoseWriter, pose: &Pose) -> bool {
        let owner = self.owner_lock();
        if *owner != writer {
            return false;
        }
        self.inner.publish.send_modify(|visual| {
            visual.pose.merge(pose);
            visual.owner = writer;
            visual.revision += 1;
        });
        true
    }

    /// Hand the board to a playback run. `None` if a run already holds it.
    pub fn acquire_playback(&self) -> Option<OwnershipGuard> {
        let mut owner = self.owner_lock();
        if *owner == PoseWriter::Playback {
            return None;
        }
        *owner = PoseWriter::Playback;
        tracing::debug!("Playback took ownership of the visual pose");
        Some(OwnershipGuard { board: self.clone() })
    }

    pub fn current(&self) -> VisualPose {
        self.inner.publish.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VisualPose> {
        self.inner.publish.subscribe()
    }
}

/// Returns the board to the live feed on drop.
pub struct OwnershipGuard {
    board: PoseBoard,
}

impl Drop for OwnershipGuard {
    fn drop(&mut self) {
        *self.board.owner_lock() = PoseWriter::LiveFeed;
        tracing::debug!("Visual pose handed back to the live feed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joints::JointName;

    fn yaw(angle: f64) -> Pose {
        [(JointName::NeckYaw, angle)].into_iter().collect()
    }

    #[test]
    fn test_feed_owns_by_default() {
        let board = PoseBoard::new();
        assert_eq!(board.owner(), PoseWriter::LiveFeed);
        assert!(board.apply(PoseWriter::LiveFeed, &yaw(5.0)));
        assert!(!board.apply(PoseWriter::Playback, &yaw(9.0)));
        assert_eq!(board.current().pose.get(JointName::NeckYaw), Some(5.0));
        assert_eq!(board.current().revision, 1);
    }

    #[test]
    fn test_playback_suppresses_feed_until_guard_drops() {
        let board = PoseBoard::new();
        let guard = board.acquire_playback().unwrap();
        assert!(board.acquire_playback().is_none());
        assert!(!board.apply(PoseWriter::LiveFeed, &yaw(1.0)));
        assert!(board.apply(PoseWriter::Playback, &yaw(2.0)));
        drop(guard);
        assert_eq!(board.owner(), PoseWriter::LiveFeed);
        assert!(board.apply(PoseWriter::LiveFeed, &yaw(3.0)));
        assert_eq!(board.current().pose.get(JointName::NeckYaw), Some(3.0));
    }

    #[tokio::test]
    async fn test_subscribers_see_accepted_writes() {
        let board = PoseBoard::new();
        let mut rx = board.subscribe();
        board.apply(PoseWriter::LiveFeed, &yaw(7.0));
        rx.changed().await.unwrap();
        let visual = rx.borrow_and_update().clone();
        assert_eq!(visual.owner, PoseWriter::LiveFeed);
        assert_eq!(visual.pose.get(JointName::NeckYaw), Some(7.0));
    }
}
