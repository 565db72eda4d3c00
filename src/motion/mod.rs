// src/motion/mod.rs - Pose interpolation, segment timing and actuator transmission
pub mod interpolator;
pub mod speed;
pub mod transmitter;

pub use interpolator::{DriveOutcome, Interpolation, Interpolator, PoseSink, drive, ease};
pub use speed::{SegmentTiming, SpeedPolicy, peak_speed, plan_segment, segment_delay};
pub use transmitter::{TransmitStats, Transmitter};
