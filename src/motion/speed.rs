// src/motion/speed.rs - Segment timing and angular speed
use crate::joints::Pose;
use serde::Serialize;
use std::time::Duration;

/// Playback delay between two frames from their timestamps (milliseconds).
///
/// Missing or non-increasing timestamps fall back to `fallback`; anything shorter
/// than `min` is raised to `min`.
pub fn segment_delay(previous_ms: Option<f64>, next_ms: Option<f64>, fallback: Duration, min: Duration) -> Duration {
    match (previous_ms, next_ms) {
        (Some(previous), Some(next)) if next > previous && (next - previous).is_finite() => {
            Duration::from_secs_f64((next - previous) / 1000.0).max(min)
        }
        _ => fallback.max(min),
    }
}

/// Largest per-joint angular speed (°/s) among joints present in both poses.
pub fn peak_speed(previous: &Pose, next: &Pose, delay: Duration) -> f64 {
    let seconds = delay.as_secs_f64();
    if seconds <= 0.0 {
        return 0.0;
    }
    next.iter()
        .filter_map(|(joint, angle)| previous.get(joint).map(|before| (angle - before).abs() / seconds))
        .fold(0.0, f64::max)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedPolicy {
    /// Segments above this speed are reported.
    pub warning_deg_s: f64,
    /// When set, segments above this speed are slowed down to it.
    pub limit_deg_s: Option<f64>,
}

impl SpeedPolicy {
    pub fn advisory(warning_deg_s: f64) -> Self {
        Self { warning_deg_s, limit_deg_s: None }
    }
}

/// Timing decided for one frame-to-frame segment.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SegmentTiming {
    /// Index of the frame the segment ends on.
    pub index: usize,
    pub recorded_delay_s: f64,
    pub effective_delay_s: f64,
    /// Peak speed of the recorded motion, before any stretching.
    pub peak_speed_deg_s: f64,
    pub over_threshold: bool,
    pub stretched: bool,
}

impl SegmentTiming {
    pub fn effective_delay(&self) -> Duration {
        Duration::from_secs_f64(self.effective_delay_s)
    }
}

pub fn plan_segment(index: usize, previous: &Pose, next: &Pose, delay: Duration, policy: &SpeedPolicy) -> SegmentTiming {
    let peak = peak_speed(previous, next, delay);
    let mut effective = delay;
    let mut stretched = false;
    if let Some(limit) = policy.limit_deg_s {
        if limit > 0.0 && peak > limit {
            effective = delay.mul_f64(peak / limit);
            stretched = true;
        }
    }
    SegmentTiming {
        index,
        recorded_delay_s: delay.as_secs_f64(),
        effective_delay_s: effective.as_secs_f64(),
        peak_speed_deg_s: peak,
        over_threshold: peak > policy.warning_deg_s,
        stretched,
    }
}
