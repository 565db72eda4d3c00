// src/motion/transmitter.rs - Fire-and-forget pose transmission
use crate::backend::RobotBackend;
use crate::joints::Pose;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Counters from one transmitter's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransmitStats {
    pub sent: usize,
    pub failures: usize,
}

/// Hands poses to the actuator without making the caller wait on the robot.
///
/// The slot holds only the newest pose. One task sends whatever is newest when
/// the previous write returns, so a slow robot skips intermediate poses instead
/// of falling behind. `None` in the slot tells the task to stop.
pub struct Transmitter {
    slot: watch::Sender<Option<Pose>>,
    failures: Arc<AtomicUsize>,
    sent: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl Transmitter {
    pub fn spawn(backend: Arc<dyn RobotBackend>) -> Self {
        let (slot, mut latest) = watch::channel::<Option<Pose>>(None);
        let failures = Arc::new(AtomicUsize::new(0));
        let sent = Arc::new(AtomicUsize::new(0));
        let task = {
            let failures = failures.clone();
            let sent = sent.clone();
            tokio::spawn(async move {
                while latest.changed().await.is_ok() {
                    let Some(pose) = latest.borrow_and_update().clone() else {
                        break;
                    };
                    match backend.set_positions(&pose).await {
                        Ok(()) => {
                            sent.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            let count = failures.fetch_add(1, Ordering::SeqCst) + 1;
                            tracing::warn!("Pose transmission failed ({} so far): {}", count, e);
                        }
                    }
                }
            })
        };
        Self { slot, failures, sent, task }
    }

    /// Replace whatever is waiting with `pose`.
    pub fn send(&self, pose: Pose) {
        self.slot.send_replace(Some(pose));
    }

    /// Let the newest pose go out, then stop. Gives up after `grace`.
    pub async fn finish(self, grace: Duration) -> TransmitStats {
        let Transmitter { slot, failures, sent, task } = self;
        drop(slot);
        settle(task, grace).await;
        TransmitStats {
            sent: sent.load(Ordering::SeqCst),
            failures: failures.load(Ordering::SeqCst),
        }
    }

    /// Drop the pose still waiting and return once a write already in flight
    /// has come back (or `grace` has passed). Nothing reaches the robot from
    /// this transmitter afterwards.
    pub async fn halt(self, grace: Duration) -> TransmitStats {
        self.slot.send_replace(None);
        self.finish(grace).await
    }
}

async fn settle(mut task: JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Transmitter task ended abnormally: {}", e),
        Err(_) => {
            tracing::warn!("Robot still busy after {:?}, abandoning pose transmission", grace);
            task.abort();
        }
    }
}
