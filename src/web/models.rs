//! Contains the data models for API requests and responses.

use crate::error::{ConsoleError, ErrorKind};
use crate::joints::JointName;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/recording/start`. The body itself is optional.
#[derive(Debug, Default, Deserialize)]
pub struct StartRecordingRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleJointRequest {
    pub joint: JointName,
    pub locked: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub confirm: bool,
}

/// Success notice with an optional payload.
#[derive(Debug, Serialize)]
pub struct Notice<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Notice<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: Some(data),
        })
    }
}

/// Failure notice: `{success: false, kind, message}`.
#[derive(Debug, Serialize)]
pub struct ErrorNotice {
    pub success: bool,
    pub kind: ErrorKind,
    pub message: String,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::UserActionConflict => StatusCode::CONFLICT,
        ErrorKind::EmptyInput => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::TransportFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::MalformedImport | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::LookupMiss => StatusCode::NOT_FOUND,
        ErrorKind::Confirmation => StatusCode::PRECONDITION_REQUIRED,
        ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Wrapper so handlers can use `?` on console results.
#[derive(Debug)]
pub struct ApiError(pub ConsoleError);

impl From<ConsoleError> for ApiError {
    fn from(error: ConsoleError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::warn!("Request refused: {}", self.0);
        }
        let body = ErrorNotice {
            success: false,
            kind,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// One pose update for the 3D renderer.
#[derive(Debug, Serialize)]
pub struct VisualFrame {
    pub revision: u64,
    pub owner: crate::pose_board::PoseWriter,
    pub rotations: Vec<crate::kinematics::JointRotation>,
}

#[derive(Debug, Serialize)]
pub struct PlaybackStarted {
    pub id: uuid::Uuid,
    pub name: String,
    pub mode: crate::macros::PlaybackMode,
}

#[derive(Debug, Serialize)]
pub struct RecordingSaved {
    pub name: String,
    pub frames: usize,
}
