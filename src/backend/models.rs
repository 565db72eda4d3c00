//! Request and response bodies of the robot HTTP API.

use crate::joints::{JointName, Pose};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct PositionsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub positions: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartCompliantResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub initial_positions: Option<BTreeMap<String, Option<f64>>>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Shared by stop-compliant and emergency-stop. Emergency stop may omit `success`.
#[derive(Debug, Deserialize)]
pub struct StiffenResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub stiffened_joints: Option<Vec<String>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JointsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub joints: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ToggleJointRequest {
    pub joint: JointName,
    pub locked: bool,
}

#[derive(Debug, Serialize)]
pub struct GotoRequest {
    pub positions: Pose,
    pub duration: f64,
}

#[derive(Debug, Serialize)]
pub struct SetPositionsRequest {
    pub positions: Pose,
}

/// Missing readings come back as `null`; they are read as 0°.
pub fn pose_from_wire(positions: &BTreeMap<String, Option<f64>>) -> (Pose, Vec<String>) {
    let filled: BTreeMap<String, f64> = positions
        .iter()
        .map(|(name, angle)| (name.clone(), angle.unwrap_or(0.0)))
        .collect();
    Pose::from_named_lossy(&filled)
}

/// Keep the names that belong to the joint set.
pub fn joint_list(names: &[String]) -> Vec<JointName> {
    names.iter().filter_map(|name| name.parse().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_null_reads_as_zero() {
        let response: PositionsResponse = serde_json::from_str(
            r#"{"success": true, "positions": {"neck_yaw": null, "l_gripper": 12.5, "mystery": 3.0}}"#,
        )
        .unwrap();
        let (pose, dropped) = pose_from_wire(&response.positions);
        assert_eq!(pose.get(JointName::NeckYaw), Some(0.0));
        assert_eq!(pose.get(JointName::LGripper), Some(12.5));
        assert_eq!(dropped, vec!["mystery".to_string()]);
    }

    #[test]
    fn test_emergency_stop_without_success_field() {
        let response: StiffenResponse =
            serde_json::from_str(r#"{"stiffened_joints": ["neck_yaw", "r_gripper"]}"#).unwrap();
        assert!(response.success.is_none());
        assert_eq!(
            joint_list(response.stiffened_joints.as_deref().unwrap_or_default()),
            vec![JointName::NeckYaw, JointName::RGripper]
        );
    }

    #[test]
    fn test_goto_body_shape() {
        let body = GotoRequest {
            positions: [(JointName::RElbowPitch, -30.0)].into_iter().collect(),
            duration: 1.5,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["positions"]["r_elbow_pitch"], -30.0);
        assert_eq!(value["duration"], 1.5);
    }
}
