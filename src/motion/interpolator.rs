// src/motion/interpolator.rs
/// Eased pose interpolation.
///
/// An [`Interpolation`] describes one segment between two poses: `steps + 1`
/// intermediate poses (both endpoints included) shaped by a smoothstep curve so
/// that chained segments meet with zero velocity. The segment can be sampled
/// directly ([`Interpolation::pose_at`], [`Interpolation::poses`]) or consumed as
/// a timed stream that waits `duration / steps` between poses.
use crate::joints::{JointName, Pose};
use crate::kinematics::KinematicTable;
use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Smoothstep: zero slope at both ends.
pub fn ease(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn blend(a: f64, b: f64, e: f64) -> f64 {
    if a == b {
        a
    } else {
        a * (1.0 - e) + b * e
    }
}

#[derive(Debug, Clone)]
pub struct Interpolation {
    table: Arc<KinematicTable>,
    from: Pose,
    to: Pose,
    joints: Vec<JointName>,
    steps: u32,
    duration: Duration,
}

impl Interpolation {
    pub fn new(table: Arc<KinematicTable>, from: &Pose, to: &Pose, steps: u32, duration: Duration) -> Self {
        let joints = from.joint_union(to).into_iter().collect();
        Self {
            table,
            from: from.clone(),
            to: to.clone(),
            joints,
            steps,
            duration,
        }
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Number of poses the segment emits.
    pub fn len(&self) -> usize {
        self.steps as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn step_interval(&self) -> Duration {
        if self.steps == 0 {
            Duration::ZERO
        } else {
            self.duration / self.steps
        }
    }

    /// Eased progress at `step`; a zero-step segment is already complete.
    pub fn progress(&self, step: u32) -> f64 {
        if self.steps == 0 {
            return 1.0;
        }
        ease(step.min(self.steps) as f64 / self.steps as f64)
    }

    /// Joints missing on one side are taken as 0° on that side only.
    pub fn pose_at(&self, step: u32) -> Pose {
        let e = self.progress(step);
        self.joints
            .iter()
            .map(|joint| {
                let a = self.from.get(*joint).unwrap_or(0.0);
                let b = self.to.get(*joint).unwrap_or(0.0);
                (*joint, self.table.clamp(*joint, blend(a, b, e)))
            })
            .collect()
    }

    pub fn poses(&self) -> impl Iterator<Item = Pose> + '_ {
        (0..=self.steps).map(move |step| self.pose_at(step))
    }

    /// Timed sequence: the only suspension is the sleep between two poses.
    pub fn into_stream(self) -> impl Stream<Item = Pose> {
        stream! {
            let interval = self.step_interval();
            for step in 0..=self.steps {
                if step > 0 {
                    tokio::time::sleep(interval).await;
                }
                yield self.pose_at(step);
            }
        }
    }
}

/// Builds segments at a fixed step rate.
#[derive(Debug, Clone)]
pub struct Interpolator {
    table: Arc<KinematicTable>,
    step_rate_hz: f64,
}

impl Interpolator {
    pub fn new(table: Arc<KinematicTable>, step_rate_hz: f64) -> Self {
        Self { table, step_rate_hz }
    }

    pub fn table(&self) -> &Arc<KinematicTable> {
        &self.table
    }

    /// At least one step for any non-zero duration.
    pub fn steps_for(&self, duration: Duration) -> u32 {
        if duration.is_zero() || !(self.step_rate_hz > 0.0) {
            return 0;
        }
        let steps = (duration.as_secs_f64() * self.step_rate_hz).round();
        steps.clamp(1.0, u32::MAX as f64) as u32
    }

    pub fn interpolate(&self, from: &Pose, to: &Pose, steps: u32, duration: Duration) -> Interpolation {
        Interpolation::new(self.table.clone(), from, to, steps, duration)
    }

    pub fn segment(&self, from: &Pose, to: &Pose, duration: Duration) -> Interpolation {
        self.interpolate(from, to, self.steps_for(duration), duration)
    }
}

/// Receives every pose of a driven segment, in order.
pub trait PoseSink {
    fn emit(&mut self, pose: &Pose);
}

impl PoseSink for Vec<Pose> {
    fn emit(&mut self, pose: &Pose) {
        self.push(pose.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    Completed { emitted: usize },
    Cancelled { emitted: usize },
}

impl DriveOutcome {
    pub fn emitted(&self) -> usize {
        match self {
            DriveOutcome::Completed { emitted } | DriveOutcome::Cancelled { emitted } => *emitted,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DriveOutcome::Cancelled { .. })
    }
}

/// Play a segment in real time into `sink`, stopping between steps on cancel.
pub async fn drive<S: PoseSink + ?Sized>(
    segment: Interpolation,
    sink: &mut S,
    cancel: &CancellationToken,
) -> DriveOutcome {
    let poses = segment.into_stream();
    tokio::pin!(poses);
    let mut emitted = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return DriveOutcome::Cancelled { emitted },
            next = poses.next() => match next {
                Some(pose) => {
                    sink.emit(&pose);
                    emitted += 1;
                }
                None => return DriveOutcome::Completed { emitted },
            }
        }
    }
}
