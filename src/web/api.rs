//! Defines the Axum API routes and handlers.

use crate::console::{Console, ConsoleStatus};
use crate::error::ConsoleError;
use crate::feed::Readings;
use crate::kinematics::JointDescriptor;
use crate::macros::{MacroSummary, PlaybackMode, PlaybackReport};
use crate::web::models::{
    ApiError, DeleteQuery, Notice, PlaybackStarted, RecordingSaved, StartRecordingRequest, ToggleJointRequest,
    VisualFrame,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path, Query, State,
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use std::sync::Arc;

pub type AppState = Arc<Console>;

/// Build the router around an existing console.
pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/joints", get(get_joints))
        .route("/api/v1/pose", get(get_pose))
        .route("/api/v1/pose/ws", get(pose_stream))
        .route("/api/v1/readings", get(get_readings))
        .route("/api/v1/feed/start", post(start_feed))
        .route("/api/v1/feed/stop", post(stop_feed))
        .route("/api/v1/recording/start", post(start_recording))
        .route("/api/v1/recording/stop", post(stop_recording))
        .route("/api/v1/macros", get(list_macros))
        .route("/api/v1/macros/export", get(export_macros))
        .route("/api/v1/macros/import", post(import_macros))
        .route("/api/v1/macros/{id}", delete(delete_macro))
        .route("/api/v1/macros/{id}/simulate", post(simulate_macro))
        .route("/api/v1/macros/{id}/execute", post(execute_macro))
        .route("/api/v1/playback/cancel", post(cancel_playback))
        .route("/api/v1/playback/last", get(last_playback))
        .route("/api/v1/robot/compliant/start", post(start_compliant))
        .route("/api/v1/robot/compliant/stop", post(stop_compliant))
        .route("/api/v1/robot/emergency-stop", post(emergency_stop))
        .route("/api/v1/robot/toggle-joint", post(toggle_joint))
        .route("/api/v1/robot/joints", get(robot_joints))
        .with_state(state)
}

fn visual_frame(console: &Console) -> VisualFrame {
    let visual = console.board().current();
    VisualFrame {
        revision: visual.revision,
        owner: visual.owner,
        rotations: console.table().visual_frame(&visual.pose),
    }
}

async fn get_status(State(console): State<AppState>) -> Json<ConsoleStatus> {
    Json(console.status().await)
}

async fn get_joints(State(console): State<AppState>) -> Json<Vec<JointDescriptor>> {
    Json(console.describe_joints())
}

async fn get_pose(State(console): State<AppState>) -> Json<VisualFrame> {
    Json(visual_frame(&console))
}

async fn get_readings(State(console): State<AppState>) -> Json<Readings> {
    Json(console.readings())
}

async fn pose_stream(ws: WebSocketUpgrade, State(console): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_poses(socket, console))
}

/// Push one frame now and one per accepted pose write after that.
async fn stream_poses(mut socket: WebSocket, console: AppState) {
    let mut updates = console.board().subscribe();
    loop {
        updates.mark_unchanged();
        let text = match serde_json::to_string(&visual_frame(&console)) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to encode visual frame: {}", e);
                break;
            }
        };
        if socket.send(Message::Text(text.into())).await.is_err() {
            break;
        }
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("Pose stream closed");
}

async fn start_feed(State(console): State<AppState>) -> Json<Notice<bool>> {
    let started = console.start_feed().await;
    let message = if started { "Live feed started" } else { "Live feed already running" };
    Notice::ok(message, started)
}

async fn stop_feed(State(console): State<AppState>) -> Json<Notice<bool>> {
    let stopped = console.stop_feed().await;
    let message = if stopped { "Live feed stopped" } else { "Live feed was not running" };
    Notice::ok(message, stopped)
}

async fn start_recording(State(console): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: StartRecordingRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartRecordingRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ConsoleError::InvalidRequest(e.to_string()))?
    };
    let status = console.start_recording(request.name).await?;
    Ok(Notice::ok("Recording started", status).into_response())
}

async fn stop_recording(State(console): State<AppState>) -> Result<Json<Notice<RecordingSaved>>, ApiError> {
    let (name, frames) = console.stop_recording().await?;
    Ok(Notice::ok(
        format!("Saved '{}' ({} frames)", name, frames),
        RecordingSaved { name, frames },
    ))
}

async fn list_macros(State(console): State<AppState>) -> Json<Vec<MacroSummary>> {
    Json(console.list_macros().await)
}

async fn export_macros(State(console): State<AppState>) -> Result<Response, ApiError> {
    let text = console.export_macros().await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], text).into_response())
}

async fn import_macros(State(console): State<AppState>, body: String) -> Result<Json<Notice<Vec<String>>>, ApiError> {
    let names = console.import_macros(&body).await?;
    Ok(Notice::ok(format!("Imported {} macros", names.len()), names))
}

async fn delete_macro(
    State(console): State<AppState>,
    Path(index): Path<usize>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<Notice<String>>, ApiError> {
    let name = console.delete_macro(index, query.confirm).await?;
    Ok(Notice::ok(format!("Deleted '{}'", name), name))
}

async fn start_playback(console: &Console, name: String, mode: PlaybackMode) -> Result<Response, ApiError> {
    let handle = console.play(&name, mode).await?;
    let started = PlaybackStarted {
        id: handle.id,
        name,
        mode,
    };
    Ok((StatusCode::ACCEPTED, Notice::ok("Playback started", started)).into_response())
}

async fn simulate_macro(State(console): State<AppState>, Path(name): Path<String>) -> Result<Response, ApiError> {
    start_playback(&console, name, PlaybackMode::Simulate).await
}

async fn execute_macro(State(console): State<AppState>, Path(name): Path<String>) -> Result<Response, ApiError> {
    start_playback(&console, name, PlaybackMode::Execute).await
}

async fn cancel_playback(State(console): State<AppState>) -> Json<Notice<bool>> {
    let cancelled = console.cancel_playback().await;
    let message = if cancelled { "Playback cancelling" } else { "No playback running" };
    Notice::ok(message, cancelled)
}

async fn last_playback(State(console): State<AppState>) -> Result<Json<PlaybackReport>, StatusCode> {
    console.last_report().await.map(Json).ok_or(StatusCode::NO_CONTENT)
}

async fn start_compliant(State(console): State<AppState>) -> Result<Response, ApiError> {
    let start = console.start_compliant().await?;
    Ok(Notice::ok("Compliant mode on", start).into_response())
}

async fn stop_compliant(State(console): State<AppState>) -> Result<Response, ApiError> {
    let stiffened = console.stop_compliant().await?;
    Ok(Notice::ok("Compliant mode off", stiffened).into_response())
}

async fn emergency_stop(State(console): State<AppState>) -> Result<Response, ApiError> {
    let stiffened = console.emergency_stop().await?;
    Ok(Notice::ok("Emergency stop", stiffened).into_response())
}

async fn toggle_joint(
    State(console): State<AppState>,
    payload: Result<Json<ToggleJointRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.map_err(|e| ConsoleError::InvalidRequest(e.body_text()))?;
    console.toggle_joint(payload.joint, payload.locked).await?;
    let message = format!("{} {}", payload.joint, if payload.locked { "locked" } else { "released" });
    Ok(Notice::ok(message, payload.locked).into_response())
}

async fn robot_joints(State(console): State<AppState>) -> Result<Response, ApiError> {
    let joints = console.robot_joints().await?;
    Ok(Notice::ok("Robot joints", joints).into_response())
}
