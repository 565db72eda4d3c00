// src/kinematics.rs - Kinematic constraint table and visual axis bindings
//! Static per-joint angle limits plus the rotation axis each joint drives on the
//! 3D model.
//!
//! The table is built once at startup (defaults, then config overrides) and is
//! read-only afterwards; it is shared behind an `Arc`.

use crate::joints::{JointName, Pose};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed interval of valid angles, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimit {
    pub min: f64,
    pub max: f64,
}

impl JointLimit {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, angle: f64) -> f64 {
        self.min.max(self.max.min(angle))
    }

    pub fn contains(&self, angle: f64) -> bool {
        angle >= self.min && angle <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// How the renderer should treat a joint beyond a plain rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Special {
    None,
    /// The angle opens two mirrored fingers instead of turning one link.
    MirroredFingers,
    /// Antenna links pivot about their own mount, not the head frame.
    Antenna,
}

/// Rotation axis, sign and special handling for one joint on the 3D model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBinding {
    pub axis: Axis,
    pub sign: f64,
    pub special: Special,
}

impl AxisBinding {
    const fn plain(axis: Axis, sign: f64) -> Self {
        Self { axis, sign, special: Special::None }
    }
}

/// One joint rotation ready for the scene graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointRotation {
    pub joint: JointName,
    pub degrees: f64,
    pub axis: Axis,
    pub radians: f64,
    pub special: Special,
}

/// Limits and axis binding for one joint, as reported to the operator UI.
#[derive(Debug, Clone, Serialize)]
pub struct JointDescriptor {
    pub joint: JointName,
    pub limit: Option<JointLimit>,
    pub binding: AxisBinding,
}

pub fn default_limit(joint: JointName) -> JointLimit {
    match joint {
        JointName::RShoulderPitch | JointName::LShoulderPitch => JointLimit::new(-150.0, 90.0),
        JointName::RShoulderRoll => JointLimit::new(-180.0, 10.0),
        JointName::LShoulderRoll => JointLimit::new(-10.0, 180.0),
        JointName::RArmYaw | JointName::LArmYaw => JointLimit::new(-90.0, 90.0),
        JointName::RElbowPitch | JointName::LElbowPitch => JointLimit::new(-125.0, 0.0),
        JointName::RForearmYaw | JointName::LForearmYaw => JointLimit::new(-100.0, 100.0),
        JointName::RWristPitch | JointName::LWristPitch => JointLimit::new(-45.0, 45.0),
        JointName::RWristRoll => JointLimit::new(-55.0, 35.0),
        JointName::LWristRoll => JointLimit::new(-35.0, 55.0),
        JointName::RGripper => JointLimit::new(-50.0, 25.0),
        JointName::LGripper => JointLimit::new(-25.0, 50.0),
        JointName::LAntenna | JointName::RAntenna => JointLimit::new(-30.0, 30.0),
        JointName::NeckYaw => JointLimit::new(-45.0, 45.0),
        JointName::NeckPitch => JointLimit::new(-25.0, 25.0),
        JointName::NeckRoll => JointLimit::new(-20.0, 20.0),
    }
}

/// Exhaustive by construction: adding a joint without a binding does not compile.
pub fn axis_binding(joint: JointName) -> AxisBinding {
    match joint {
        JointName::RShoulderPitch | JointName::LShoulderPitch => AxisBinding::plain(Axis::X, -1.0),
        JointName::RShoulderRoll | JointName::LShoulderRoll => AxisBinding::plain(Axis::Z, 1.0),
        JointName::RArmYaw | JointName::LArmYaw => AxisBinding::plain(Axis::Y, 1.0),
        JointName::RElbowPitch | JointName::LElbowPitch => AxisBinding::plain(Axis::X, -1.0),
        JointName::RForearmYaw | JointName::LForearmYaw => AxisBinding::plain(Axis::Y, 1.0),
        JointName::RWristPitch | JointName::LWristPitch => AxisBinding::plain(Axis::X, -1.0),
        JointName::RWristRoll | JointName::LWristRoll => AxisBinding::plain(Axis::Z, 1.0),
        JointName::RGripper => AxisBinding { axis: Axis::Z, sign: 1.0, special: Special::MirroredFingers },
        JointName::LGripper => AxisBinding { axis: Axis::Z, sign: -1.0, special: Special::MirroredFingers },
        JointName::LAntenna | JointName::RAntenna => {
            AxisBinding { axis: Axis::Z, sign: 1.0, special: Special::Antenna }
        }
        JointName::NeckYaw => AxisBinding::plain(Axis::Y, 1.0),
        JointName::NeckPitch => AxisBinding::plain(Axis::X, -1.0),
        JointName::NeckRoll => AxisBinding::plain(Axis::Z, 1.0),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KinematicTable {
    limits: BTreeMap<JointName, JointLimit>,
}

impl KinematicTable {
    /// Table with no limits at all; every joint is unclamped.
    pub fn empty() -> Self {
        Self { limits: BTreeMap::new() }
    }

    /// Reachy's stock joint ranges.
    pub fn reachy() -> Self {
        Self {
            limits: JointName::ALL
                .iter()
                .map(|joint| (*joint, default_limit(*joint)))
                .collect(),
        }
    }

    pub fn with_limit(mut self, joint: JointName, limit: JointLimit) -> Self {
        self.limits.insert(joint, limit);
        self
    }

    pub fn without(mut self, joint: JointName) -> Self {
        self.limits.remove(&joint);
        self
    }

    pub fn limit(&self, joint: JointName) -> Option<JointLimit> {
        self.limits.get(&joint).copied()
    }

    /// Joints with a configured range, in joint order.
    pub fn joints(&self) -> impl Iterator<Item = JointName> + '_ {
        self.limits.keys().copied()
    }

    /// Unknown joints pass through untouched.
    pub fn clamp(&self, joint: JointName, angle: f64) -> f64 {
        match self.limits.get(&joint) {
            Some(limit) => limit.clamp(angle),
            None => angle,
        }
    }

    pub fn clamp_pose(&self, pose: &Pose) -> Pose {
        pose.iter()
            .map(|(joint, angle)| (joint, self.clamp(joint, angle)))
            .collect()
    }

    /// Joints of `pose` that lie outside their configured range.
    pub fn violations(&self, pose: &Pose) -> Vec<JointName> {
        pose.iter()
            .filter(|(joint, angle)| {
                self.limits
                    .get(joint)
                    .is_some_and(|limit| !limit.contains(*angle))
            })
            .map(|(joint, _)| joint)
            .collect()
    }

    pub fn rotation_for(&self, joint: JointName, angle: f64) -> JointRotation {
        let binding = axis_binding(joint);
        let degrees = self.clamp(joint, angle);
        JointRotation {
            joint,
            degrees,
            axis: binding.axis,
            radians: binding.sign * degrees.to_radians(),
            special: binding.special,
        }
    }

    /// Scene-graph rotations for every joint specified in `pose`.
    pub fn visual_frame(&self, pose: &Pose) -> Vec<JointRotation> {
        pose.iter()
            .map(|(joint, angle)| self.rotation_for(joint, angle))
            .collect()
    }

    pub fn describe(&self) -> Vec<JointDescriptor> {
        JointName::ALL
            .iter()
            .map(|joint| JointDescriptor {
                joint: *joint,
                limit: self.limit(*joint),
                binding: axis_binding(*joint),
            })
            .collect()
    }
}

impl Default for KinematicTable {
    fn default() -> Self {
        Self::reachy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_stays_within_limits_for_all_joints() {
        let table = KinematicTable::reachy();
        for joint in JointName::ALL {
            let limit = table.limit(joint).unwrap();
            for angle in [-1000.0, -150.5, -1.0, 0.0, 12.25, 89.9, 1000.0] {
                let clamped = table.clamp(joint, angle);
                assert!(limit.contains(clamped), "{joint} {angle} -> {clamped}");
                if limit.contains(angle) {
                    assert_eq!(clamped, angle);
                }
            }
        }
    }

    #[test]
    fn test_unknown_joint_is_fail_open() {
        let table = KinematicTable::reachy().without(JointName::LAntenna);
        assert_eq!(table.clamp(JointName::LAntenna, 500.0), 500.0);
        assert_eq!(KinematicTable::empty().clamp(JointName::NeckYaw, -90.0), -90.0);
    }

    #[test]
    fn test_clamp_pose_preserves_keys() {
        let table = KinematicTable::reachy();
        let pose: Pose = [
            (JointName::RShoulderPitch, -200.0),
            (JointName::NeckRoll, 5.0),
        ]
        .into_iter()
        .collect();
        let clamped = table.clamp_pose(&pose);
        assert_eq!(clamped.len(), 2);
        assert_eq!(clamped.get(JointName::RShoulderPitch), Some(-150.0));
        assert_eq!(clamped.get(JointName::NeckRoll), Some(5.0));
        assert_eq!(table.violations(&pose), vec![JointName::RShoulderPitch]);
        assert!(table.violations(&clamped).is_empty());
    }

    #[test]
    fn test_visual_frame_uses_static_bindings() {
        let table = KinematicTable::reachy();
        let pose: Pose = [(JointName::NeckPitch, 10.0), (JointName::LGripper, 20.0)]
            .into_iter()
            .collect();
        let frame = table.visual_frame(&pose);
        assert_eq!(frame.len(), 2);
        let gripper = frame.iter().find(|r| r.joint == JointName::LGripper).unwrap();
        assert_eq!(gripper.special, Special::MirroredFingers);
        assert!((gripper.radians + 20f64.to_radians()).abs() < 1e-12);
        let neck = frame.iter().find(|r| r.joint == JointName::NeckPitch).unwrap();
        assert_eq!(neck.axis, Axis::X);
    }

    #[test]
    fn test_describe_lists_every_joint() {
        let table = KinematicTable::reachy().without(JointName::RAntenna);
        let described = table.describe();
        assert_eq!(described.len(), JointName::ALL.len());
        let antenna = described.iter().find(|d| d.joint == JointName::RAntenna).unwrap();
        assert!(antenna.limit.is_none());
    }
}
