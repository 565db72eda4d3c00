// src/macros/model.rs - Frame and Macro types, ingestion normalisation
//! A frame reaches the console in one of two shapes: a bare `{joint: angle}`
//! object, or `{"timestamp": ms, "joints": {joint: angle}}`. Both are turned into
//! a [`Frame`] by [`Frame::from_value`]; nothing downstream looks at raw JSON.

use crate::joints::{JointName, Pose};
use crate::kinematics::KinematicTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid macro format: {0}")]
pub struct InvalidFormat(pub String);

/// One timestamped pose. Timestamps are milliseconds from a macro-local epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    pub joints: Pose,
}

impl Frame {
    pub fn new(timestamp: Option<f64>, joints: Pose) -> Self {
        Self { timestamp, joints }
    }

    pub fn clamped(&self, table: &KinematicTable) -> Self {
        Self {
            timestamp: self.timestamp,
            joints: table.clamp_pose(&self.joints),
        }
    }

    /// Normalise either accepted frame shape.
    pub fn from_value(value: &Value) -> Result<Self, InvalidFormat> {
        let object = value
            .as_object()
            .ok_or_else(|| InvalidFormat(format!("frame must be an object, got {}", kind_of(value))))?;
        match object.get("joints") {
            Some(joints) => {
                let timestamp = match object.get("timestamp") {
                    None | Some(Value::Null) => None,
                    Some(Value::Number(n)) => n.as_f64().filter(|t| t.is_finite()),
                    Some(other) => {
                        return Err(InvalidFormat(format!(
                            "timestamp must be a number, got {}",
                            kind_of(other)
                        )));
                    }
                };
                Ok(Self::new(timestamp, pose_from_value(joints)?))
            }
            None => Ok(Self::new(None, pose_from_value(value)?)),
        }
    }
}

fn pose_from_value(value: &Value) -> Result<Pose, InvalidFormat> {
    let object = value
        .as_object()
        .ok_or_else(|| InvalidFormat(format!("joints must be an object, got {}", kind_of(value))))?;
    let mut pose = Pose::new();
    for (name, angle) in object {
        let joint: JointName = name.parse().map_err(|e| InvalidFormat(format!("{}", e)))?;
        let angle = angle
            .as_f64()
            .filter(|a| a.is_finite())
            .ok_or_else(|| InvalidFormat(format!("angle for '{}' is not a number", name)))?;
        pose.insert(joint, angle);
    }
    Ok(pose)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// A named, ordered sequence of frames. An empty name means the source had
/// none; the store assigns one before the macro is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macro {
    pub name: String,
    pub movements: Vec<Frame>,
}

impl Macro {
    pub fn new(name: impl Into<String>, movements: Vec<Frame>) -> Self {
        Self {
            name: name.into(),
            movements,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    /// Recorded span from first to last timestamp, if both are present.
    pub fn span_ms(&self) -> Option<f64> {
        let first = self.movements.first()?.timestamp?;
        let last = self.movements.last()?.timestamp?;
        Some((last - first).max(0.0))
    }

    fn from_value(index: usize, value: &Value, table: &KinematicTable) -> Result<Self, InvalidFormat> {
        let object = value
            .as_object()
            .ok_or_else(|| InvalidFormat(format!("entry {} is {}, not an object", index, kind_of(value))))?;
        let name = match object.get("name") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(name)) => name.trim().to_string(),
            Some(other) => {
                return Err(InvalidFormat(format!(
                    "entry {} name must be a string, got {}",
                    index,
                    kind_of(other)
                )));
            }
        };
        let label = if name.is_empty() { format!("entry {}", index) } else { format!("macro '{}'", name) };
        let movements = object
            .get("movements")
            .and_then(Value::as_array)
            .ok_or_else(|| InvalidFormat(format!("{} has no movements list", label)))?;
        let frames = movements
            .iter()
            .enumerate()
            .map(|(i, frame)| {
                Frame::from_value(frame).map_err(|e| InvalidFormat(format!("{} frame {}: {}", label, i, e.0)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let out_of_range = frames.iter().filter(|f| !table.violations(&f.joints).is_empty()).count();
        if out_of_range > 0 {
            tracing::warn!("{}: {} frames had angles out of range, clamped", label, out_of_range);
        }
        let frames = frames.iter().map(|frame| frame.clamped(table)).collect();
        Ok(Self::new(name, frames))
    }
}

/// Parse a serialised macro list. Either every entry is valid or nothing is
/// returned; frames come back clamped and missing names come back empty.
pub fn parse_macros(text: &str, table: &KinematicTable) -> Result<Vec<Macro>, InvalidFormat> {
    let value: Value = serde_json::from_str(text).map_err(|e| InvalidFormat(format!("not JSON: {}", e)))?;
    let entries = value
        .as_array()
        .ok_or_else(|| InvalidFormat(format!("expected a list of macros, got {}", kind_of(&value))))?;
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| Macro::from_value(index, entry, table))
        .collect()
}

pub fn serialize_macros(macros: &[Macro]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(macros)
}
