// src/joints.rs - Joint identifiers and poses
//! The closed set of Reachy joints and the `Pose` mapping built on top of it.
//!
//! Joint names are never free-form: anything arriving from the wire is parsed
//! into a [`JointName`] at the ingestion boundary and rejected (or dropped, for
//! telemetry) when it does not name a known joint.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown joint name '{0}'")]
pub struct UnknownJoint(pub String);

/// One rotational degree of freedom of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointName {
    RShoulderPitch,
    RShoulderRoll,
    RArmYaw,
    RElbowPitch,
    RForearmYaw,
    RWristPitch,
    RWristRoll,
    RGripper,
    LShoulderPitch,
    LShoulderRoll,
    LArmYaw,
    LElbowPitch,
    LForearmYaw,
    LWristPitch,
    LWristRoll,
    LGripper,
    LAntenna,
    RAntenna,
    NeckYaw,
    NeckRoll,
    NeckPitch,
}

/// Which actuator group a joint belongs to on the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointGroup {
    RightArm,
    LeftArm,
    Head,
}

impl JointName {
    pub const ALL: [JointName; 21] = [
        JointName::RShoulderPitch,
        JointName::RShoulderRoll,
        JointName::RArmYaw,
        JointName::RElbowPitch,
        JointName::RForearmYaw,
        JointName::RWristPitch,
        JointName::RWristRoll,
        JointName::RGripper,
        JointName::LShoulderPitch,
        JointName::LShoulderRoll,
        JointName::LArmYaw,
        JointName::LElbowPitch,
        JointName::LForearmYaw,
        JointName::LWristPitch,
        JointName::LWristRoll,
        JointName::LGripper,
        JointName::LAntenna,
        JointName::RAntenna,
        JointName::NeckYaw,
        JointName::NeckRoll,
        JointName::NeckPitch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JointName::RShoulderPitch => "r_shoulder_pitch",
            JointName::RShoulderRoll => "r_shoulder_roll",
            JointName::RArmYaw => "r_arm_yaw",
            JointName::RElbowPitch => "r_elbow_pitch",
            JointName::RForearmYaw => "r_forearm_yaw",
            JointName::RWristPitch => "r_wrist_pitch",
            JointName::RWristRoll => "r_wrist_roll",
            JointName::RGripper => "r_gripper",
            JointName::LShoulderPitch => "l_shoulder_pitch",
            JointName::LShoulderRoll => "l_shoulder_roll",
            JointName::LArmYaw => "l_arm_yaw",
            JointName::LElbowPitch => "l_elbow_pitch",
            JointName::LForearmYaw => "l_forearm_yaw",
            JointName::LWristPitch => "l_wrist_pitch",
            JointName::LWristRoll => "l_wrist_roll",
            JointName::LGripper => "l_gripper",
            JointName::LAntenna => "l_antenna",
            JointName::RAntenna => "r_antenna",
            JointName::NeckYaw => "neck_yaw",
            JointName::NeckRoll => "neck_roll",
            JointName::NeckPitch => "neck_pitch",
        }
    }

    /// Antennas are mounted on the head.
    pub fn group(self) -> JointGroup {
        match self {
            JointName::RShoulderPitch
            | JointName::RShoulderRoll
            | JointName::RArmYaw
            | JointName::RElbowPitch
            | JointName::RForearmYaw
            | JointName::RWristPitch
            | JointName::RWristRoll
            | JointName::RGripper => JointGroup::RightArm,
            JointName::LShoulderPitch
            | JointName::LShoulderRoll
            | JointName::LArmYaw
            | JointName::LElbowPitch
            | JointName::LForearmYaw
            | JointName::LWristPitch
            | JointName::LWristRoll
            | JointName::LGripper => JointGroup::LeftArm,
            JointName::LAntenna
            | JointName::RAntenna
            | JointName::NeckYaw
            | JointName::NeckRoll
            | JointName::NeckPitch => JointGroup::Head,
        }
    }
}

impl fmt::Display for JointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JointName {
    type Err = UnknownJoint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JointName::ALL
            .iter()
            .copied()
            .find(|joint| joint.as_str() == s)
            .ok_or_else(|| UnknownJoint(s.to_string()))
    }
}

/// Snapshot of joint angles in degrees. Absent joints are unspecified, not zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose(BTreeMap<JointName, f64>);

impl Pose {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, joint: JointName) -> Option<f64> {
        self.0.get(&joint).copied()
    }

    pub fn insert(&mut self, joint: JointName, angle: f64) -> Option<f64> {
        self.0.insert(joint, angle)
    }

    pub fn remove(&mut self, joint: JointName) -> Option<f64> {
        self.0.remove(&joint)
    }

    pub fn contains(&self, joint: JointName) -> bool {
        self.0.contains_key(&joint)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn joints(&self) -> impl Iterator<Item = JointName> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointName, f64)> + '_ {
        self.0.iter().map(|(joint, angle)| (*joint, *angle))
    }

    /// Union of the joints specified in either pose, in joint order.
    pub fn joint_union(&self, other: &Pose) -> BTreeSet<JointName> {
        self.0.keys().chain(other.0.keys()).copied().collect()
    }

    /// Overwrite this pose's joints with every joint specified in `update`.
    pub fn merge(&mut self, update: &Pose) {
        for (joint, angle) in update.iter() {
            self.0.insert(joint, angle);
        }
    }

    /// Every joint in [`JointName::ALL`] at the same angle.
    pub fn uniform(angle: f64) -> Self {
        JointName::ALL.iter().map(|joint| (*joint, angle)).collect()
    }

    /// Parse string-keyed telemetry, dropping names outside the joint set and
    /// non-finite readings. Returns the pose and the names that were dropped.
    pub fn from_named_lossy<'a, I>(entries: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = (&'a String, &'a f64)>,
    {
        let mut pose = Pose::new();
        let mut dropped = Vec::new();
        for (name, angle) in entries {
            match name.parse::<JointName>() {
                Ok(joint) if angle.is_finite() => {
                    pose.insert(joint, *angle);
                }
                _ => dropped.push(name.clone()),
            }
        }
        (pose, dropped)
    }

    /// String-keyed view used by transports that are joint-agnostic.
    pub fn to_named(&self) -> BTreeMap<String, f64> {
        self.iter()
            .map(|(joint, angle)| (joint.as_str().to_string(), angle))
            .collect()
    }
}

impl FromIterator<(JointName, f64)> for Pose {
    fn from_iter<T: IntoIterator<Item = (JointName, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_names_round_trip_through_strings() {
        for joint in JointName::ALL {
            assert_eq!(joint.as_str().parse::<JointName>().unwrap(), joint);
            assert_eq!(
                serde_json::to_string(&joint).unwrap(),
                format!("\"{}\"", joint.as_str())
            );
        }
    }

    #[test]
    fn test_unknown_joint_is_rejected() {
        assert_eq!(
            "r_shoulder".parse::<JointName>(),
            Err(UnknownJoint("r_shoulder".to_string()))
        );
    }

    #[test]
    fn test_pose_serializes_as_flat_object() {
        let pose: Pose = [(JointName::RGripper, 10.0), (JointName::NeckYaw, -5.5)]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&pose).unwrap();
        assert_eq!(json, serde_json::json!({"r_gripper": 10.0, "neck_yaw": -5.5}));
        let back: Pose = serde_json::from_value(json).unwrap();
        assert_eq!(back, pose);
    }

    #[test]
    fn test_lossy_parse_drops_unknown_and_nan() {
        let raw = BTreeMap::from([
            ("neck_yaw".to_string(), 12.0),
            ("tail_wag".to_string(), 3.0),
            ("neck_roll".to_string(), f64::NAN),
        ]);
        let (pose, dropped) = Pose::from_named_lossy(&raw);
        assert_eq!(pose.len(), 1);
        assert_eq!(pose.get(JointName::NeckYaw), Some(12.0));
        assert_eq!(dropped.len(), 2);
    }

    #[test]
    fn test_joint_union_and_merge() {
        let a: Pose = [(JointName::NeckYaw, 1.0)].into_iter().collect();
        let b: Pose = [(JointName::NeckRoll, 2.0), (JointName::NeckYaw, 3.0)]
            .into_iter()
            .collect();
        assert_eq!(a.joint_union(&b).len(), 2);
        let mut merged = a.clone();
        merged.merge(&b);
        assert_eq!(merged.get(JointName::NeckYaw), Some(3.0));
        assert_eq!(merged.get(JointName::NeckRoll), Some(2.0));
    }

    #[test]
    fn test_groups() {
        assert_eq!(JointName::LAntenna.group(), JointGroup::Head);
        assert_eq!(JointName::RGripper.group(), JointGroup::RightArm);
        assert_eq!(JointName::LWristRoll.group(), JointGroup::LeftArm);
    }
}
