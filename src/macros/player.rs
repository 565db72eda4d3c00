// src/macros/player.rs - Macro playback runs
//! A run moves the pose from wherever the robot is to the neutral pose, from
//! neutral to the first frame, through every recorded frame at its recorded
//! pace, and back to neutral. Every intermediate pose is written to the pose
//! board; in execute mode it is also queued for the actuator.
//!
//! Only one run exists at a time. The run holds the "playing" flag, the pose
//! board and the cancellation slot through RAII guards, so every exit path
//! leaves the player idle again, including a panic inside the task.

use super::model::Macro;
use super::store::MacroStore;
use crate::backend::RobotBackend;
use crate::config::PlaybackConfig;
use crate::joints::Pose;
use crate::motion::{
    DriveOutcome, Interpolator, PoseSink, SegmentTiming, SpeedPolicy, TransmitStats, Transmitter, drive,
    plan_segment, segment_delay,
};
use crate::pose_board::{OwnershipGuard, PoseBoard, PoseWriter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlayerError {
    #[error("a playback is already running")]
    PlaybackInProgress,
    #[error("no macro named '{0}'")]
    MacroNotFound(String),
    #[error("macro '{0}' has no frames")]
    EmptyMacro(String),
    #[error("playback aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Visualise only.
    Simulate,
    /// Visualise and transmit to the actuator.
    Execute,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackMode::Simulate => write!(f, "simulate"),
            PlaybackMode::Execute => write!(f, "execute"),
        }
    }
}

/// Playback timing resolved from configuration.
#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    pub settle: Duration,
    pub start: Duration,
    pub fallback_delay: Duration,
    pub min_delay: Duration,
    pub policy: SpeedPolicy,
    pub neutral: Pose,
    pub transmit_grace: Duration,
}

impl PlaybackSettings {
    pub fn from_config(config: &PlaybackConfig, neutral: Pose) -> Self {
        Self {
            settle: config.settle(),
            start: config.start(),
            fallback_delay: config.fallback_delay(),
            min_delay: config.min_delay(),
            policy: SpeedPolicy {
                warning_deg_s: config.speed_warning_deg_s,
                limit_deg_s: config.limit_speed.then_some(config.max_speed_deg_s),
            },
            neutral,
            transmit_grace: config.transmit_grace(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedWarning {
    pub segment: usize,
    pub speed_deg_s: f64,
    pub threshold_deg_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackReport {
    pub id: Uuid,
    pub name: String,
    pub mode: PlaybackMode,
    pub frames: usize,
    pub segments: Vec<SegmentTiming>,
    pub peak_speed_deg_s: f64,
    pub warnings: Vec<SpeedWarning>,
    pub poses_emitted: usize,
    pub cancelled: bool,
    /// Execute mode only. Intermediate poses a slow robot could not keep up
    /// with are skipped, so `sent` can be lower than `poses_emitted`.
    pub transmitted: TransmitStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PlaybackReport {
    fn new(id: Uuid, entry: &Macro, mode: PlaybackMode) -> Self {
        Self {
            id,
            name: entry.name.clone(),
            mode,
            frames: entry.movements.len(),
            segments: Vec::new(),
            peak_speed_deg_s: 0.0,
            warnings: Vec::new(),
            poses_emitted: 0,
            cancelled: false,
            transmitted: TransmitStats::default(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Clears the playing flag on drop.
struct PlayingGuard {
    flag: Arc<AtomicBool>,
}

impl PlayingGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for PlayingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

struct PlaybackSink<'a> {
    board: &'a PoseBoard,
    transmitter: Option<&'a Transmitter>,
}

impl PoseSink for PlaybackSink<'_> {
    fn emit(&mut self, pose: &Pose) {
        self.board.apply(PoseWriter::Playback, pose);
        if let Some(transmitter) = self.transmitter {
            transmitter.send(pose.clone());
        }
    }
}

/// Cancellation handles of the run in progress.
#[derive(Clone)]
struct RunControl {
    id: Uuid,
    cancel: CancellationToken,
    /// Tripped once the run has released everything it holds.
    finished: CancellationToken,
}

type RunSlot = Arc<Mutex<Option<RunControl>>>;

/// Empties the run slot on drop, if it still belongs to this run.
struct SlotGuard {
    slot: RunSlot,
    id: Uuid,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|run| run.id == self.id) {
            slot.take();
        }
    }
}

/// Everything a run holds. Fields drop in order, so waiters on `finished`
/// only wake once the player is idle again.
struct RunGuards {
    _slot: SlotGuard,
    _ownership: OwnershipGuard,
    _playing: PlayingGuard,
    _finished: DropGuard,
}

/// Handle to a spawned run.
#[derive(Debug)]
pub struct PlaybackHandle {
    pub id: Uuid,
    task: JoinHandle<PlaybackReport>,
}

impl PlaybackHandle {
    pub async fn wait(self) -> Result<PlaybackReport, PlayerError> {
        self.task
            .await
            .map_err(|e| PlayerError::Aborted(e.to_string()))
    }
}

struct PlayerInner {
    store: Arc<MacroStore>,
    board: PoseBoard,
    backend: Arc<dyn RobotBackend>,
    interpolator: Interpolator,
    settings: PlaybackSettings,
    playing: Arc<AtomicBool>,
    run: RunSlot,
    last_report: RwLock<Option<PlaybackReport>>,
}

#[derive(Clone)]
pub struct Player {
    inner: Arc<PlayerInner>,
}

impl Player {
    pub fn new(
        store: Arc<MacroStore>,
        board: PoseBoard,
        backend: Arc<dyn RobotBackend>,
        interpolator: Interpolator,
        settings: PlaybackSettings,
    ) -> Self {
        Self {
            inner: Arc::new(PlayerInner {
                store,
                board,
                backend,
                interpolator,
                settings,
                playing: Arc::new(AtomicBool::new(false)),
                run: Arc::new(Mutex::new(None)),
                last_report: RwLock::new(None),
            }),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.inner.playing.load(Ordering::SeqCst)
    }

    pub async fn simulate(&self, name: &str) -> Result<PlaybackHandle, PlayerError> {
        self.start(name, PlaybackMode::Simulate).await
    }

    pub async fn execute(&self, name: &str) -> Result<PlaybackHandle, PlayerError> {
        self.start(name, PlaybackMode::Execute).await
    }

    pub async fn start(&self, name: &str, mode: PlaybackMode) -> Result<PlaybackHandle, PlayerError> {
        let playing = PlayingGuard::acquire(&self.inner.playing).ok_or(PlayerError::PlaybackInProgress)?;
        let entry = self
            .inner
            .store
            .get_by_name(name)
            .await
            .ok_or_else(|| PlayerError::MacroNotFound(name.to_string()))?;
        if entry.is_empty() {
            return Err(PlayerError::EmptyMacro(entry.name));
        }
        let ownership = self
            .inner
            .board
            .acquire_playback()
            .ok_or(PlayerError::PlaybackInProgress)?;

        let id = Uuid::new_v4();
        let control = RunControl {
            id,
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        };
        *self.lock_run() = Some(control.clone());
        let guards = RunGuards {
            _slot: SlotGuard {
                slot: self.inner.run.clone(),
                id,
            },
            _ownership: ownership,
            _playing: playing,
            _finished: control.finished.clone().drop_guard(),
        };
        tracing::info!(
            "Playback {} started: '{}' ({}, {} frames)",
            id,
            entry.name,
            mode,
            entry.movements.len()
        );

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let report = inner.run(id, &entry, mode, &control.cancel).await;
            if report.cancelled {
                tracing::info!("Playback {} of '{}' cancelled", id, report.name);
            } else {
                tracing::info!(
                    "Playback {} of '{}' finished, peak speed {:.1}°/s, {} warnings",
                    id,
                    report.name,
                    report.peak_speed_deg_s,
                    report.warnings.len()
                );
            }
            *inner.last_report.write().await = Some(report.clone());
            drop(guards);
            report
        });
        Ok(PlaybackHandle { id, task })
    }

    /// Stop the running playback and wait until it has ended and the robot
    /// has been sent its last pose. Returns `false` when idle.
    pub async fn cancel(&self) -> bool {
        let Some(run) = self.lock_run().clone() else {
            return false;
        };
        run.cancel.cancel();
        run.finished.cancelled().await;
        true
    }

    fn lock_run(&self) -> std::sync::MutexGuard<'_, Option<RunControl>> {
        self.inner.run.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn last_report(&self) -> Option<PlaybackReport> {
        self.inner.last_report.read().await.clone()
    }
}

impl PlayerInner {
    async fn run(&self, id: Uuid, entry: &Macro, mode: PlaybackMode, cancel: &CancellationToken) -> PlaybackReport {
        let mut report = PlaybackReport::new(id, entry, mode);
        let transmitter = match mode {
            PlaybackMode::Execute => Some(Transmitter::spawn(self.backend.clone())),
            PlaybackMode::Simulate => None,
        };
        let settings = &self.settings;
        let neutral = &settings.neutral;

        let current = match self.backend.positions().await {
            Ok(pose) => pose,
            Err(e) => {
                tracing::warn!("Could not read current pose ({}), starting from neutral", e);
                neutral.clone()
            }
        };

        let mut sink = PlaybackSink {
            board: &self.board,
            transmitter: transmitter.as_ref(),
        };
        let frames = &entry.movements;

        'run: {
            let outcome = drive(self.interpolator.segment(&current, neutral, settings.settle), &mut sink, cancel).await;
            if record(&mut report, outcome) {
                break 'run;
            }
            let outcome = drive(self.interpolator.segment(neutral, &frames[0].joints, settings.start), &mut sink, cancel).await;
            if record(&mut report, outcome) {
                break 'run;
            }

            for i in 1..frames.len() {
                let (previous, next) = (&frames[i - 1], &frames[i]);
                let delay = segment_delay(previous.timestamp, next.timestamp, settings.fallback_delay, settings.min_delay);
                let timing = plan_segment(i, &previous.joints, &next.joints, delay, &settings.policy);
                report.peak_speed_deg_s = report.peak_speed_deg_s.max(timing.peak_speed_deg_s);
                if timing.over_threshold {
                    tracing::warn!(
                        "Segment {} of '{}' reaches {:.1}°/s (threshold {:.1}°/s)",
                        i,
                        entry.name,
                        timing.peak_speed_deg_s,
                        settings.policy.warning_deg_s
                    );
                    report.warnings.push(SpeedWarning {
                        segment: i,
                        speed_deg_s: timing.peak_speed_deg_s,
                        threshold_deg_s: settings.policy.warning_deg_s,
                    });
                }
                let duration = timing.effective_delay();
                report.segments.push(timing);
                let outcome = drive(self.interpolator.segment(&previous.joints, &next.joints, duration), &mut sink, cancel).await;
                if record(&mut report, outcome) {
                    break 'run;
                }
            }

            let last = &frames[frames.len() - 1].joints;
            let outcome = drive(self.interpolator.segment(last, neutral, settings.settle), &mut sink, cancel).await;
            record(&mut report, outcome);
        }

        if let Some(transmitter) = transmitter {
            report.transmitted = if report.cancelled {
                transmitter.halt(settings.transmit_grace).await
            } else {
                transmitter.finish(settings.transmit_grace).await
            };
        }
        report.finished_at = Some(Utc::now());
        report
    }
}

/// Fold a phase outcome into the report; `true` when the run must stop.
fn record(report: &mut PlaybackReport, outcome: DriveOutcome) -> bool {
    report.poses_emitted += outcome.emitted();
    if outcome.is_cancelled() {
        report.cancelled = true;
    }
    report.cancelled
}
