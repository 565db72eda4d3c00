//! Wire protocol spoken between the proxy relay and its clients.
//!
//! Every WebSocket text frame carries one JSON envelope
//! `{"event": "<name>", "data": {...}}`. Joint names are plain strings here: the
//! relay mirrors whatever it is given and leaves validation to the clients.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Events sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Ask for a `robot_state` snapshot.
    RequestState,
    JointUpdate {
        joint: String,
        angle: f64,
        #[serde(default)]
        origin: Option<String>,
    },
    SetMultipleJoints {
        positions: BTreeMap<String, f64>,
        #[serde(default)]
        origin: Option<String>,
    },
}

/// Events sent by the relay to its clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    RobotState {
        positions: BTreeMap<String, f64>,
        timestamp: f64,
    },
    MirrorUpdate {
        joint: String,
        angle: f64,
        #[serde(default)]
        origin: Option<String>,
        timestamp: f64,
    },
    MultipleMirrorUpdate {
        positions: BTreeMap<String, f64>,
        #[serde(default)]
        origin: Option<String>,
        timestamp: f64,
    },
    Error {
        message: String,
    },
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Seconds since the Unix epoch, as the relay stamps its events.
pub fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
