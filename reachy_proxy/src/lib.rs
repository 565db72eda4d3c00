//! Local WebSocket relay for Reachy joint state.
//!
//! The relay keeps the last known angle of every joint it has heard about and
//! mirrors updates from one client to every other connected client. It is the
//! fallback live channel of the console when the robot HTTP API is unreachable.

pub mod protocol;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use protocol::{ClientEvent, ServerEvent, now_seconds};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{RwLock, broadcast};

const RELAY_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default)]
struct JointState {
    positions: BTreeMap<String, f64>,
    last_updated: f64,
}

/// Shared relay state: joint cache plus the fan-out channel.
pub struct ProxyState {
    joints: RwLock<JointState>,
    relay: broadcast::Sender<(u64, ServerEvent)>,
    next_client: AtomicU64,
    clients: AtomicUsize,
}

impl Default for ProxyState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyState {
    pub fn new() -> Self {
        let (relay, _) = broadcast::channel(RELAY_CAPACITY);
        Self {
            joints: RwLock::new(JointState::default()),
            relay,
            next_client: AtomicU64::new(1),
            clients: AtomicUsize::new(0),
        }
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    pub async fn positions(&self) -> BTreeMap<String, f64> {
        self.joints.read().await.positions.clone()
    }

    async fn snapshot(&self) -> ServerEvent {
        let joints = self.joints.read().await;
        ServerEvent::RobotState {
            positions: joints.positions.clone(),
            timestamp: now_seconds(),
        }
    }

    /// Apply one client event. Returns the reply for the sender, if any; mirrors
    /// go to every other client through the relay channel.
    pub async fn handle_event(&self, client: u64, event: ClientEvent) -> Option<ServerEvent> {
        match event {
            ClientEvent::RequestState => Some(self.snapshot().await),
            ClientEvent::JointUpdate { joint, angle, origin } => {
                if !angle.is_finite() {
                    return Some(ServerEvent::Error {
                        message: format!("invalid angle for {}", joint),
                    });
                }
                let timestamp = now_seconds();
                {
                    let mut joints = self.joints.write().await;
                    joints.positions.insert(joint.clone(), angle);
                    joints.last_updated = timestamp;
                }
                tracing::debug!("joint_update {} = {:.2} from client {}", joint, angle, client);
                self.broadcast(client, ServerEvent::MirrorUpdate { joint, angle, origin, timestamp });
                None
            }
            ClientEvent::SetMultipleJoints { positions, origin } => {
                let positions: BTreeMap<String, f64> =
                    positions.into_iter().filter(|(_, angle)| angle.is_finite()).collect();
                if positions.is_empty() {
                    return Some(ServerEvent::Error {
                        message: "no valid positions provided".to_string(),
                    });
                }
                let timestamp = now_seconds();
                {
                    let mut joints = self.joints.write().await;
                    joints.positions.extend(positions.iter().map(|(k, v)| (k.clone(), *v)));
                    joints.last_updated = timestamp;
                }
                tracing::debug!("set_multiple_joints ({} joints) from client {}", positions.len(), client);
                self.broadcast(client, ServerEvent::MultipleMirrorUpdate { positions, origin, timestamp });
                None
            }
        }
    }

    fn broadcast(&self, from: u64, event: ServerEvent) {
        // No receivers just means nobody else is connected.
        let _ = self.relay.send((from, event));
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    success: bool,
    proxy: bool,
    timestamp: f64,
    clients: usize,
}

#[derive(Debug, Serialize)]
struct StateResponse {
    success: bool,
    positions: BTreeMap<String, f64>,
    timestamp: f64,
}

/// Build the relay router around shared state.
pub fn app(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/state", get(state_snapshot))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn status(State(state): State<Arc<ProxyState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        proxy: true,
        timestamp: now_seconds(),
        clients: state.connected_clients(),
    })
}

async fn state_snapshot(State(state): State<Arc<ProxyState>>) -> Json<StateResponse> {
    let joints = state.joints.read().await;
    Json(StateResponse {
        success: true,
        positions: joints.positions.clone(),
        timestamp: joints.last_updated,
    })
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<ProxyState>>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

async fn send_event(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> bool {
    match event.to_json() {
        Ok(text) => sink.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to encode relay event: {}", e);
            true
        }
    }
}

async fn client_session(socket: WebSocket, state: Arc<ProxyState>) {
    let id = state.next_client.fetch_add(1, Ordering::SeqCst);
    let connected = state.clients.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::info!("Client {} connected ({} connected)", id, connected);

    let (mut sink, mut stream) = socket.split();
    let mut relayed = state.relay.subscribe();

    let greeting = state.snapshot().await;
    let mut open = send_event(&mut sink, &greeting).await;

    while open {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = match ClientEvent::parse(text.as_str()) {
                        Ok(event) => state.handle_event(id, event).await,
                        Err(e) => Some(ServerEvent::Error { message: format!("malformed event: {}", e) }),
                    };
                    if let Some(reply) = reply {
                        open = send_event(&mut sink, &reply).await;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Client {} socket error: {}", id, e);
                    break;
                }
            },
            mirrored = relayed.recv() => match mirrored {
                Ok((from, event)) if from != id => {
                    open = send_event(&mut sink, &event).await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Client {} lagged, {} mirror events dropped", id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let remaining = state.clients.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
    tracing::info!("Client {} disconnected ({} connected)", id, remaining);
}
