// src/backend/mod.rs - Robot backend contract
//! Everything the console asks of the robot goes through [`RobotBackend`]. Three
//! implementations exist: the direct HTTP API, the WebSocket proxy relay, and an
//! in-memory simulation used by tests and `transport.mode = "sim"`.

pub mod http;
pub mod models;
pub mod proxy;
pub mod sim;
pub mod transport;

use crate::joints::{JointName, Pose};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use http::HttpBackend;
pub use proxy::ProxyBackend;
pub use sim::SimulatedBackend;
pub use transport::{connect, probe};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("robot API answered HTTP {0}")]
    Status(u16),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("robot rejected the request: {0}")]
    Rejected(String),
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    #[error("proxy connection is down")]
    Disconnected,
    #[error("no robot state received yet")]
    NoState,
    #[error("{0} is not available on this transport")]
    Unsupported(&'static str),
}

/// Which transport the console ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Proxy,
    Sim,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Http => write!(f, "http"),
            TransportKind::Proxy => write!(f, "proxy"),
            TransportKind::Sim => write!(f, "sim"),
        }
    }
}

/// Answer to a start-compliant request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompliantStart {
    pub initial_positions: Pose,
    pub message: Option<String>,
}

#[async_trait]
pub trait RobotBackend: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Current joint angles, for the live feed.
    async fn positions(&self) -> Result<Pose, TransportError>;

    /// One-shot snapshot used when recording.
    async fn capture(&self) -> Result<Pose, TransportError>;

    async fn goto(&self, positions: &Pose, duration: Duration) -> Result<(), TransportError>;

    /// Streaming write used during playback; callers do not wait on the robot.
    async fn set_positions(&self, positions: &Pose) -> Result<(), TransportError>;

    async fn start_compliant(&self) -> Result<CompliantStart, TransportError>;

    /// Returns the joints that were stiffened.
    async fn stop_compliant(&self) -> Result<Vec<JointName>, TransportError>;

    async fn emergency_stop(&self) -> Result<Vec<JointName>, TransportError>;

    async fn toggle_joint(&self, joint: JointName, locked: bool) -> Result<(), TransportError>;

    async fn joints(&self) -> Result<Vec<JointName>, TransportError>;
}
