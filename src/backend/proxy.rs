// src/backend/proxy.rs - WebSocket proxy relay client
//! Talks to the `reachy_proxy` relay over one long-lived WebSocket.
//!
//! A background task owns the socket: it reconnects after a fixed delay, forwards
//! queued outbound events and keeps a cache of the robot state from
//! `robot_state` / `mirror_update` / `multiple_mirror_update` events. Reads are
//! served from that cache; writes are clamped and dead-band filtered before they
//! are queued.

use super::{CompliantStart, RobotBackend, TransportError, TransportKind};
use crate::config::ProxyConfig;
use crate::joints::{JointName, Pose};
use crate::kinematics::KinematicTable;
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use reachy_proxy::protocol::{ClientEvent, ServerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct ProxyShared {
    connected: watch::Sender<bool>,
    state: RwLock<Option<Pose>>,
    last_sent: Mutex<Pose>,
}

impl ProxyShared {
    async fn apply(&self, event: ServerEvent) {
        if let ServerEvent::Error { message } = &event {
            tracing::warn!("Proxy reported an error: {}", message);
            return;
        }
        let mut state = self.state.write().await;
        apply_server_event(&mut state, event);
    }
}

/// Fold one relay event into the cached robot state.
pub fn apply_server_event(state: &mut Option<Pose>, event: ServerEvent) {
    match event {
        ServerEvent::RobotState { positions, .. } => {
            let (pose, _) = Pose::from_named_lossy(&positions);
            *state = Some(pose);
        }
        ServerEvent::MirrorUpdate { joint, angle, .. } => {
            if let Ok(joint) = joint.parse::<JointName>() {
                if angle.is_finite() {
                    state.get_or_insert_with(Pose::new).insert(joint, angle);
                }
            }
        }
        ServerEvent::MultipleMirrorUpdate { positions, .. } => {
            let (update, _) = Pose::from_named_lossy(&positions);
            state.get_or_insert_with(Pose::new).merge(&update);
        }
        ServerEvent::Error { .. } => {}
    }
}

/// Joints that moved at least `threshold` degrees since they were last sent.
pub fn deadband_filter(last_sent: &Pose, pose: &Pose, threshold: f64) -> Pose {
    pose.iter()
        .filter(|&(joint, angle)| match last_sent.get(joint) {
            Some(previous) => (angle - previous).abs() >= threshold,
            None => true,
        })
        .collect()
}

pub struct ProxyBackend {
    shared: Arc<ProxyShared>,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    cancel: CancellationToken,
    table: Arc<KinematicTable>,
    origin: String,
    deadband_deg: f64,
}

impl ProxyBackend {
    /// Start the connection task. Must be called inside a tokio runtime.
    pub fn spawn(config: &ProxyConfig, table: Arc<KinematicTable>) -> Self {
        let (connected, _) = watch::channel(false);
        let shared = Arc::new(ProxyShared {
            connected,
            state: RwLock::new(None),
            last_sent: Mutex::new(Pose::new()),
        });
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(connection_loop(
            config.url.clone(),
            shared.clone(),
            outbound_rx,
            cancel.clone(),
            Duration::from_millis(config.reconnect_delay_ms),
        ));

        Self {
            shared,
            outbound,
            cancel,
            table,
            origin: config.origin.clone(),
            deadband_deg: config.deadband_deg,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    /// Wait until the socket is up, or `timeout` elapses.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), TransportError> {
        let mut connected = self.shared.connected.subscribe();
        match tokio::time::timeout(timeout, connected.wait_for(|up| *up)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    fn queue(&self, event: ClientEvent) -> Result<(), TransportError> {
        self.outbound.send(event).map_err(|_| TransportError::Disconnected)
    }

    async fn read_cached(&self) -> Result<Pose, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.queue(ClientEvent::RequestState)?;
        self.shared
            .state
            .read()
            .await
            .clone()
            .ok_or(TransportError::NoState)
    }

    async fn send_batch(&self, positions: &Pose, filtered: bool) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let clamped = self.table.clamp_pose(positions);
        let mut last_sent = self.shared.last_sent.lock().await;
        let batch = if filtered {
            deadband_filter(&last_sent, &clamped, self.deadband_deg)
        } else {
            clamped
        };
        if batch.is_empty() {
            return Ok(());
        }
        self.queue(ClientEvent::SetMultipleJoints {
            positions: batch.to_named(),
            origin: Some(self.origin.clone()),
        })?;
        last_sent.merge(&batch);
        drop(last_sent);

        // The relay does not echo our own writes back to us.
        if let Some(state) = self.shared.state.write().await.as_mut() {
            state.merge(&batch);
        }
        Ok(())
    }
}

impl Drop for ProxyBackend {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn send_event(sink: &mut SplitSink<WsStream, Message>, event: &ClientEvent) -> bool {
    match event.to_json() {
        Ok(text) => sink.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to encode proxy event: {}", e);
            true
        }
    }
}

async fn connection_loop(
    url: String,
    shared: Arc<ProxyShared>,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    cancel: CancellationToken,
    reconnect_delay: Duration,
) {
    loop {
        tracing::info!("Connecting to proxy at {}", url);
        let attempt = tokio::select! {
            _ = cancel.cancelled() => break,
            attempt = tokio_tungstenite::connect_async(url.as_str()) => attempt,
        };
        match attempt {
            Ok((ws_stream, _response)) => {
                tracing::info!("Connected to proxy");
                // Commands queued while offline are stale by now.
                while outbound.try_recv().is_ok() {}
                *shared.last_sent.lock().await = Pose::new();
                shared.connected.send_replace(true);
                run_session(ws_stream, &shared, &mut outbound, &cancel).await;
                shared.connected.send_replace(false);
                if cancel.is_cancelled() {
                    break;
                }
                tracing::warn!("Disconnected from proxy, reconnecting in {:?}", reconnect_delay);
            }
            Err(err) => {
                tracing::warn!("Failed to connect to proxy: {}, retrying in {:?}", err, reconnect_delay);
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
    tracing::debug!("Proxy connection task stopped");
}

async fn run_session(
    ws_stream: WsStream,
    shared: &ProxyShared,
    outbound: &mut mpsc::UnboundedReceiver<ClientEvent>,
    cancel: &CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    if !send_event(&mut ws_tx, &ClientEvent::RequestState).await {
        return;
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            event = outbound.recv() => match event {
                Some(event) => {
                    if !send_event(&mut ws_tx, &event).await {
                        break;
                    }
                }
                None => break,
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => match ServerEvent::parse(text.as_str()) {
                    Ok(event) => shared.apply(event).await,
                    Err(err) => tracing::warn!("Ignoring malformed proxy message: {}", err),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::warn!("Proxy socket error: {}", err);
                    break;
                }
            },
        }
    }
}

#[async_trait]
impl RobotBackend for ProxyBackend {
    fn kind(&self) -> TransportKind {
        TransportKind::Proxy
    }

    async fn positions(&self) -> Result<Pose, TransportError> {
        self.read_cached().await
    }

    async fn capture(&self) -> Result<Pose, TransportError> {
        self.read_cached().await
    }

    async fn goto(&self, positions: &Pose, _duration: Duration) -> Result<(), TransportError> {
        self.send_batch(positions, false).await
    }

    async fn set_positions(&self, positions: &Pose) -> Result<(), TransportError> {
        self.send_batch(positions, true).await
    }

    async fn start_compliant(&self) -> Result<CompliantStart, TransportError> {
        Err(TransportError::Unsupported("start-compliant"))
    }

    async fn stop_compliant(&self) -> Result<Vec<JointName>, TransportError> {
        Err(TransportError::Unsupported("stop-compliant"))
    }

    async fn emergency_stop(&self) -> Result<Vec<JointName>, TransportError> {
        Err(TransportError::Unsupported("emergency-stop"))
    }

    async fn toggle_joint(&self, _joint: JointName, _locked: bool) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("toggle-joint"))
    }

    async fn joints(&self) -> Result<Vec<JointName>, TransportError> {
        let state = self.read_cached().await?;
        Ok(state.joints().collect())
    }
}
