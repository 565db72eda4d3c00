// src/feed.rs - Live position feed
//! Periodically pulls the robot's joint angles and writes them to the pose board
//! and to the numeric readings. While a playback run owns the board, polling is
//! suspended entirely, so telemetry never tears a planned frame.

use crate::backend::{RobotBackend, TransportError};
use crate::joints::Pose;
use crate::pose_board::{PoseBoard, PoseWriter};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Latest numeric readings for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Readings {
    pub positions: Pose,
    pub received_at: Option<DateTime<Utc>>,
    /// Polls that produced a reading.
    pub ticks: u64,
    /// Polls skipped because the backend failed.
    pub skipped: u64,
    pub last_error: Option<String>,
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct LiveFeed {
    backend: Arc<dyn RobotBackend>,
    board: PoseBoard,
    interval: Duration,
    task: Mutex<Option<PollTask>>,
    readings: Arc<watch::Sender<Readings>>,
}

impl LiveFeed {
    pub fn new(backend: Arc<dyn RobotBackend>, board: PoseBoard, interval: Duration) -> Self {
        let (readings, _) = watch::channel(Readings::default());
        Self {
            backend,
            board,
            interval,
            task: Mutex::new(None),
            readings: Arc::new(readings),
        }
    }

    /// Begin polling. Returns `false` if the feed was already running.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.backend.clone(),
            self.board.clone(),
            self.readings.clone(),
            self.interval,
            cancel.clone(),
        ));
        *task = Some(PollTask { cancel, handle });
        tracing::info!("Live feed started ({:?} interval)", self.interval);
        true
    }

    /// Stop polling and wait for the poll task to exit. Returns `false` if the
    /// feed was not running.
    pub async fn stop(&self) -> bool {
        let Some(task) = self.task.lock().await.take() else {
            return false;
        };
        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            tracing::error!("Live feed task ended abnormally: {}", e);
        }
        tracing::info!("Live feed stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// One-shot snapshot for the recorder.
    pub async fn capture_once(&self) -> Result<Pose, TransportError> {
        self.backend.capture().await
    }

    pub fn readings(&self) -> Readings {
        self.readings.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Readings> {
        self.readings.subscribe()
    }
}

async fn poll_loop(
    backend: Arc<dyn RobotBackend>,
    board: PoseBoard,
    readings: Arc<watch::Sender<Readings>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if board.owner() == PoseWriter::Playback {
            continue;
        }
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = backend.positions() => result,
        };
        match result {
            Ok(pose) => {
                board.apply(PoseWriter::LiveFeed, &pose);
                readings.send_modify(|r| {
                    r.positions = pose;
                    r.received_at = Some(Utc::now());
                    r.ticks += 1;
                    r.last_error = None;
                });
            }
            Err(e) => {
                tracing::warn!("Live feed poll skipped: {}", e);
                readings.send_modify(|r| {
                    r.skipped += 1;
                    r.last_error = Some(e.to_string());
                });
            }
        }
    }
}
