// src/backend/http.rs - Direct robot HTTP API client
use super::models::{
    AckResponse, GotoRequest, JointsResponse, PositionsResponse, SetPositionsRequest,
    StartCompliantResponse, StiffenResponse, ToggleJointRequest, joint_list, pose_from_wire,
};
use super::{CompliantStart, RobotBackend, TransportError, TransportKind};
use crate::joints::{JointName, Pose};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Blocking `ureq` agent driven from the blocking pool.
#[derive(Clone)]
pub struct HttpBackend {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/movement/{}", self.base_url, path)
    }

    async fn get<T>(&self, path: &str) -> Result<T, TransportError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let agent = self.agent.clone();
        let url = self.url(path);
        run_blocking(move || decode(agent.get(&url).call())).await
    }

    async fn post<T>(&self, path: &str, body: Option<String>) -> Result<T, TransportError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let agent = self.agent.clone();
        let url = self.url(path);
        run_blocking(move || {
            let request = agent.post(&url);
            let response = match body {
                Some(body) => request
                    .set("content-type", "application/json")
                    .send_string(&body),
                None => request.call(),
            };
            decode(response)
        })
        .await
    }
}

fn encode<B: Serialize>(body: &B) -> Result<String, TransportError> {
    serde_json::to_string(body).map_err(|e| TransportError::Decode(e.to_string()))
}

fn decode<T: DeserializeOwned>(response: Result<ureq::Response, ureq::Error>) -> Result<T, TransportError> {
    let response = match response {
        Ok(response) => response,
        Err(ureq::Error::Status(code, _)) => return Err(TransportError::Status(code)),
        Err(ureq::Error::Transport(err)) => return Err(TransportError::Request(err.to_string())),
    };
    let text = response
        .into_string()
        .map_err(|e| TransportError::Decode(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
}

async fn run_blocking<T, F>(call: F) -> Result<T, TransportError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, TransportError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| TransportError::Request(format!("request task failed: {}", e)))?
}

fn check_ack(ack: AckResponse) -> Result<(), TransportError> {
    match ack.success {
        Some(false) => Err(TransportError::Rejected(
            ack.message.unwrap_or_else(|| "request refused".to_string()),
        )),
        _ => Ok(()),
    }
}

impl HttpBackend {
    async fn read_positions(&self, path: &str) -> Result<Pose, TransportError> {
        let response: PositionsResponse = self.get(path).await?;
        if !response.success {
            return Err(TransportError::Rejected(
                response.message.unwrap_or_else(|| format!("{} failed", path)),
            ));
        }
        let (pose, dropped) = pose_from_wire(&response.positions);
        if !dropped.is_empty() {
            tracing::debug!("Ignoring unknown joints from robot API: {:?}", dropped);
        }
        Ok(pose)
    }
}

#[async_trait]
impl RobotBackend for HttpBackend {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn positions(&self) -> Result<Pose, TransportError> {
        self.read_positions("positions").await
    }

    async fn capture(&self) -> Result<Pose, TransportError> {
        self.read_positions("capture").await
    }

    async fn goto(&self, positions: &Pose, duration: Duration) -> Result<(), TransportError> {
        let body = encode(&GotoRequest {
            positions: positions.clone(),
            duration: duration.as_secs_f64(),
        })?;
        check_ack(self.post("goto", Some(body)).await?)
    }

    async fn set_positions(&self, positions: &Pose) -> Result<(), TransportError> {
        let body = encode(&SetPositionsRequest {
            positions: positions.clone(),
        })?;
        check_ack(self.post("set_positions", Some(body)).await?)
    }

    async fn start_compliant(&self) -> Result<CompliantStart, TransportError> {
        let response: StartCompliantResponse = self.post("start-compliant", None).await?;
        if !response.success {
            return Err(TransportError::Rejected(
                response.message.unwrap_or_else(|| "could not enter compliant mode".to_string()),
            ));
        }
        let initial_positions = response
            .initial_positions
            .as_ref()
            .map(|positions| pose_from_wire(positions).0)
            .unwrap_or_default();
        Ok(CompliantStart {
            initial_positions,
            message: response.message,
        })
    }

    async fn stop_compliant(&self) -> Result<Vec<JointName>, TransportError> {
        let response: StiffenResponse = self.post("stop-compliant", None).await?;
        if response.success == Some(false) {
            return Err(TransportError::Rejected(
                response.message.unwrap_or_else(|| "could not leave compliant mode".to_string()),
            ));
        }
        Ok(joint_list(response.stiffened_joints.as_deref().unwrap_or_default()))
    }

    async fn emergency_stop(&self) -> Result<Vec<JointName>, TransportError> {
        let response: StiffenResponse = self.post("emergency-stop", None).await?;
        Ok(joint_list(response.stiffened_joints.as_deref().unwrap_or_default()))
    }

    async fn toggle_joint(&self, joint: JointName, locked: bool) -> Result<(), TransportError> {
        let body = encode(&ToggleJointRequest { joint, locked })?;
        check_ack(self.post("toggle-joint", Some(body)).await?)
    }

    async fn joints(&self) -> Result<Vec<JointName>, TransportError> {
        let response: JointsResponse = self.get("joints").await?;
        if !response.success {
            return Err(TransportError::Rejected("joint listing failed".to_string()));
        }
        Ok(joint_list(&response.joints))
    }
}
