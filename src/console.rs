// src/console.rs - Console state: every component, owned in one place
use crate::backend::{CompliantStart, RobotBackend, TransportKind};
use crate::config::Config;
use crate::error::ConsoleError;
use crate::feed::{LiveFeed, Readings};
use crate::joints::{JointName, Pose};
use crate::kinematics::{JointDescriptor, JointRotation, KinematicTable};
use crate::macros::{
    MacroStorage, MacroStore, MacroSummary, PlaybackHandle, PlaybackMode, PlaybackReport, PlaybackSettings,
    Player, Recorder, RecorderError, RecordingStatus, StopOutcome,
};
use crate::motion::Interpolator;
use crate::pose_board::{PoseBoard, PoseWriter};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub struct ConsoleStatus {
    pub transport: TransportKind,
    pub recording: RecordingStatus,
    pub playing: bool,
    pub pose_owner: PoseWriter,
    pub macros: usize,
    pub feed_running: bool,
    pub compliant: bool,
}

/// The console's single owned state object. The recorder, the player and the
/// live feed all hang off it and share the pose board it owns.
pub struct Console {
    config: Config,
    table: Arc<KinematicTable>,
    backend: Arc<dyn RobotBackend>,
    board: PoseBoard,
    feed: Arc<LiveFeed>,
    store: Arc<MacroStore>,
    recorder: Recorder,
    player: Player,
    /// Positions reported when compliant mode was entered.
    compliance: RwLock<Option<Pose>>,
}

impl Console {
    /// Wire every component together and load the stored macros.
    pub async fn new(
        config: Config,
        backend: Arc<dyn RobotBackend>,
        storage: Arc<dyn MacroStorage>,
    ) -> Result<Self, ConsoleError> {
        let table = Arc::new(config.kinematic_table()?);
        let neutral = config.playback.neutral_pose(&table)?;
        let board = PoseBoard::new();

        let feed = Arc::new(LiveFeed::new(
            backend.clone(),
            board.clone(),
            Duration::from_millis(config.feed.poll_interval_ms),
        ));
        let store = Arc::new(MacroStore::new(storage, config.storage.key.clone(), table.clone()));
        store.load().await?;

        let recorder = Recorder::new(
            feed.clone(),
            store.clone(),
            table.clone(),
            Duration::from_millis(config.recorder.sample_interval_ms),
        );
        let player = Player::new(
            store.clone(),
            board.clone(),
            backend.clone(),
            Interpolator::new(table.clone(), config.playback.step_rate_hz),
            PlaybackSettings::from_config(&config.playback, neutral),
        );

        tracing::info!("Console ready on {} transport", backend.kind());
        Ok(Self {
            config,
            table,
            backend,
            board,
            feed,
            store,
            recorder,
            player,
            compliance: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn table(&self) -> &Arc<KinematicTable> {
        &self.table
    }

    pub fn board(&self) -> &PoseBoard {
        &self.board
    }

    pub fn feed(&self) -> &Arc<LiveFeed> {
        &self.feed
    }

    pub fn store(&self) -> &Arc<MacroStore> {
        &self.store
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn transport(&self) -> TransportKind {
        self.backend.kind()
    }

    pub async fn status(&self) -> ConsoleStatus {
        ConsoleStatus {
            transport: self.backend.kind(),
            recording: self.recorder.status().await,
            playing: self.player.is_playing(),
            pose_owner: self.board.owner(),
            macros: self.store.len().await,
            feed_running: self.feed.is_running().await,
            compliant: self.compliance.read().await.is_some(),
        }
    }

    pub fn describe_joints(&self) -> Vec<JointDescriptor> {
        self.table.describe()
    }

    /// The visualised pose as scene-graph rotations.
    pub fn visual_frame(&self) -> Vec<JointRotation> {
        self.table.visual_frame(&self.board.current().pose)
    }

    pub async fn start_feed(&self) -> bool {
        self.feed.start().await
    }

    pub async fn stop_feed(&self) -> bool {
        self.feed.stop().await
    }

    pub fn readings(&self) -> Readings {
        self.feed.readings()
    }

    pub async fn start_recording(&self, name: Option<String>) -> Result<RecordingStatus, ConsoleError> {
        Ok(self.recorder.start_recording(name).await?)
    }

    /// Returns the stored macro's name.
    pub async fn stop_recording(&self) -> Result<(String, usize), ConsoleError> {
        match self.recorder.stop_recording().await? {
            StopOutcome::Saved { name, frames } => Ok((name, frames)),
            StopOutcome::Discarded { name } => Err(ConsoleError::EmptyRecording(
                name.unwrap_or_else(|| "recording".to_string()),
            )),
        }
    }

    pub async fn list_macros(&self) -> Vec<MacroSummary> {
        self.store.list().await
    }

    pub async fn delete_macro(&self, index: usize, confirmed: bool) -> Result<String, ConsoleError> {
        if !confirmed {
            return Err(ConsoleError::ConfirmationRequired(format!("deleting macro {}", index)));
        }
        Ok(self.store.delete(index).await?.name)
    }

    pub async fn import_macros(&self, text: &str) -> Result<Vec<String>, ConsoleError> {
        Ok(self.store.import(text).await?)
    }

    pub async fn export_macros(&self) -> Result<String, ConsoleError> {
        Ok(self.store.export().await?)
    }

    pub async fn play(&self, name: &str, mode: PlaybackMode) -> Result<PlaybackHandle, ConsoleError> {
        Ok(self.player.start(name, mode).await?)
    }

    pub async fn cancel_playback(&self) -> bool {
        self.player.cancel().await
    }

    pub async fn last_report(&self) -> Option<PlaybackReport> {
        self.player.last_report().await
    }

    pub async fn start_compliant(&self) -> Result<CompliantStart, ConsoleError> {
        let start = self.backend.start_compliant().await?;
        tracing::info!(
            "Compliant mode on, {} initial positions recorded",
            start.initial_positions.len()
        );
        *self.compliance.write().await = Some(start.initial_positions.clone());
        Ok(start)
    }

    pub async fn stop_compliant(&self) -> Result<Vec<JointName>, ConsoleError> {
        let stiffened = self.backend.stop_compliant().await?;
        self.compliance.write().await.take();
        tracing::info!("Compliant mode off, {} joints stiffened", stiffened.len());
        Ok(stiffened)
    }

    pub async fn initial_positions(&self) -> Option<Pose> {
        self.compliance.read().await.clone()
    }

    /// Halt everything: playback first, then the robot, then any running
    /// recording (kept if it captured frames). The robot is only told to stop
    /// once the playback has ended, so no pose write can land after the stop.
    pub async fn emergency_stop(&self) -> Result<Vec<JointName>, ConsoleError> {
        if self.player.cancel().await {
            tracing::warn!("Emergency stop cancelled the running playback");
        }
        let result = self.backend.emergency_stop().await;
        self.compliance.write().await.take();
        match self.recorder.stop_recording().await {
            Ok(StopOutcome::Saved { name, frames }) => {
                tracing::warn!("Emergency stop ended recording '{}' ({} frames kept)", name, frames);
            }
            Ok(StopOutcome::Discarded { .. }) | Err(RecorderError::NotRecording) => {}
            Err(e) => tracing::error!("Failed to close recording on emergency stop: {}", e),
        }
        let stiffened = result?;
        tracing::warn!("Emergency stop: {} joints stiffened", stiffened.len());
        Ok(stiffened)
    }

    pub async fn toggle_joint(&self, joint: JointName, locked: bool) -> Result<(), ConsoleError> {
        self.backend.toggle_joint(joint, locked).await?;
        tracing::info!("{} {}", joint, if locked { "locked" } else { "released" });
        Ok(())
    }

    pub async fn robot_joints(&self) -> Result<Vec<JointName>, ConsoleError> {
        Ok(self.backend.joints().await?)
    }

    /// Stop every background task.
    pub async fn shutdown(&self) {
        self.player.cancel().await;
        if let Err(e) = self.recorder.stop_recording().await {
            if !matches!(e, RecorderError::NotRecording) {
                tracing::error!("Failed to close recording on shutdown: {}", e);
            }
        }
        self.feed.stop().await;
        tracing::info!("Console shut down");
    }
}
