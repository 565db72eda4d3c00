// src/macros/recorder.rs - Macro capture sessions
use super::model::{Frame, Macro};
use super::store::{MacroStore, StoreError};
use crate::feed::LiveFeed;
use crate::kinematics::KinematicTable;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("no recording in progress")]
    NotRecording,
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct Session {
    name: Option<String>,
    started_at: DateTime<Utc>,
    frames: Arc<Mutex<Vec<Frame>>>,
    cancel: CancellationToken,
    sampler: JoinHandle<()>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingStatus {
    pub recording: bool,
    pub name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub frames: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    Saved { name: String, frames: usize },
    /// Nothing was captured; no macro was stored.
    Discarded { name: Option<String> },
}

/// Owns at most one capture session at a time.
pub struct Recorder {
    feed: Arc<LiveFeed>,
    store: Arc<MacroStore>,
    table: Arc<KinematicTable>,
    interval: Duration,
    session: Mutex<Option<Session>>,
}

impl Recorder {
    pub fn new(feed: Arc<LiveFeed>, store: Arc<MacroStore>, table: Arc<KinematicTable>, interval: Duration) -> Self {
        Self {
            feed,
            store,
            table,
            interval,
            session: Mutex::new(None),
        }
    }

    pub async fn start_recording(&self, name: Option<String>) -> Result<RecordingStatus, RecorderError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let frames = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let sampler = tokio::spawn(sample_loop(
            self.feed.clone(),
            frames.clone(),
            self.interval,
            cancel.clone(),
        ));
        let started_at = Utc::now();
        tracing::info!(
            "Recording started{} ({:?} sample interval)",
            name.as_deref().map(|n| format!(" for '{}'", n)).unwrap_or_default(),
            self.interval
        );
        *session = Some(Session {
            name: name.clone(),
            started_at,
            frames,
            cancel,
            sampler,
        });
        Ok(RecordingStatus {
            recording: true,
            name,
            started_at: Some(started_at),
            frames: 0,
        })
    }

    /// End the session. An empty capture is discarded rather than stored.
    pub async fn stop_recording(&self) -> Result<StopOutcome, RecorderError> {
        let session = self
            .session
            .lock()
            .await
            .take()
            .ok_or(RecorderError::NotRecording)?;
        session.cancel.cancel();
        if let Err(e) = session.sampler.await {
            tracing::error!("Recording sampler ended abnormally: {}", e);
        }
        let frames = std::mem::take(&mut *session.frames.lock().await);
        if frames.is_empty() {
            tracing::warn!("Recording stopped with no frames captured, nothing saved");
            return Ok(StopOutcome::Discarded { name: session.name });
        }

        let movements: Vec<Frame> = frames.iter().map(|f| f.clamped(&self.table)).collect();
        let count = movements.len();
        let name = match session.name {
            Some(name) => name,
            None => self.store.next_default_name().await,
        };
        let name = self.store.add(Macro::new(name, movements)).await?;
        tracing::info!("Recording stopped, saved '{}' with {} frames", name, count);
        Ok(StopOutcome::Saved { name, frames: count })
    }

    pub async fn is_recording(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn status(&self) -> RecordingStatus {
        let session = self.session.lock().await;
        match session.as_ref() {
            Some(s) => RecordingStatus {
                recording: true,
                name: s.name.clone(),
                started_at: Some(s.started_at),
                frames: s.frames.lock().await.len(),
            },
            None => RecordingStatus {
                recording: false,
                name: None,
                started_at: None,
                frames: 0,
            },
        }
    }
}

/// Captures one frame per interval, the first one interval after start.
/// Timestamps are milliseconds since the session began.
async fn sample_loop(
    feed: Arc<LiveFeed>,
    frames: Arc<Mutex<Vec<Frame>>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let epoch = Instant::now();
    let mut ticker = tokio::time::interval_at(epoch + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let captured = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            captured = feed.capture_once() => captured,
        };
        match captured {
            Ok(pose) => {
                let timestamp = epoch.elapsed().as_secs_f64() * 1000.0;
                frames.lock().await.push(Frame::new(Some(timestamp), pose));
            }
            Err(e) => tracing::warn!("Recording sample skipped: {}", e),
        }
    }
}
