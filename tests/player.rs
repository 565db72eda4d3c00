//! Integration tests for macro playback

mod common;

use common::SlowBackend;
use reachy_console::backend::SimulatedBackend;
use reachy_console::config::PlaybackConfig;
use reachy_console::joints::{JointName, Pose};
use reachy_console::kinematics::KinematicTable;
use reachy_console::macros::{
    Frame, Macro, MacroStore, MemoryStorage, PlaybackMode, PlaybackSettings, Player, PlayerError,
};
use reachy_console::motion::Interpolator;
use reachy_console::pose_board::{PoseBoard, PoseWriter};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Rig {
    sim: Arc<SimulatedBackend>,
    board: PoseBoard,
    store: Arc<MacroStore>,
    player: Player,
}

async fn rig_with(config: PlaybackConfig) -> Rig {
    let table = Arc::new(KinematicTable::reachy());
    let sim = Arc::new(SimulatedBackend::new(table.clone()));
    let board = PoseBoard::new();
    let store = Arc::new(MacroStore::new(Arc::new(MemoryStorage::new()), "reachy_macros", table.clone()));
    store.load().await.unwrap();
    let neutral = config.neutral_pose(&table).unwrap();
    let player = Player::new(
        store.clone(),
        board.clone(),
        sim.clone(),
        Interpolator::new(table, config.step_rate_hz),
        PlaybackSettings::from_config(&config, neutral),
    );
    Rig { sim, board, store, player }
}

async fn rig() -> Rig {
    rig_with(PlaybackConfig::default()).await
}

fn gripper(angle: f64) -> Pose {
    [(JointName::RGripper, angle)].into_iter().collect()
}

fn frames(points: &[(f64, f64)]) -> Vec<Frame> {
    points
        .iter()
        .map(|(ms, angle)| Frame::new(Some(*ms), gripper(*angle)))
        .collect()
}

#[tokio::test]
async fn test_unknown_macro_leaves_player_idle() {
    let rig = rig().await;
    let err = rig.player.simulate("ghost").await.unwrap_err();
    assert_eq!(err, PlayerError::MacroNotFound("ghost".into()));
    assert!(!rig.player.is_playing());
    assert_eq!(rig.board.owner(), PoseWriter::LiveFeed);
}

#[tokio::test]
async fn test_empty_macro_is_refused() {
    let rig = rig().await;
    rig.store.add(Macro::new("blank", Vec::new())).await.unwrap();
    let err = rig.player.execute("blank").await.unwrap_err();
    assert_eq!(err, PlayerError::EmptyMacro("blank".into()));
    assert!(!rig.player.is_playing());
    assert_eq!(rig.sim.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_simulate_reports_recorded_speeds_without_transmitting() {
    let rig = rig().await;
    rig.store
        .add(Macro::new("pinch", frames(&[(0.0, 0.0), (1000.0, 10.0), (3000.0, 10.0)])))
        .await
        .unwrap();

    let started = Instant::now();
    let handle = rig.player.simulate("pinch").await.unwrap();
    assert!(rig.player.is_playing());
    assert_eq!(rig.board.owner(), PoseWriter::Playback);

    let report = handle.wait().await.unwrap();
    let elapsed = started.elapsed();
    assert!(!report.cancelled);
    assert_eq!(report.mode, PlaybackMode::Simulate);
    assert_eq!(report.frames, 3);
    assert_eq!(report.segments.len(), 2);
    assert!((report.segments[0].peak_speed_deg_s - 10.0).abs() < 1e-9);
    assert_eq!(report.segments[1].peak_speed_deg_s, 0.0);
    assert!((report.peak_speed_deg_s - 10.0).abs() < 1e-9);
    assert!(report.warnings.is_empty());

    // settle + start + 1 s + 2 s + settle
    assert!(elapsed >= Duration::from_millis(6100) && elapsed <= Duration::from_millis(6600), "{:?}", elapsed);

    assert_eq!(rig.sim.write_count(), 0);
    assert!(!rig.player.is_playing());
    assert_eq!(rig.board.owner(), PoseWriter::LiveFeed);
    assert_eq!(rig.board.current().pose.get(JointName::RGripper), Some(0.0));
    assert_eq!(rig.player.last_report().await, Some(report));
}

#[tokio::test(start_paused = true)]
async fn test_execute_transmits_and_ends_at_neutral() {
    let mut config = PlaybackConfig::default();
    config.neutral.insert("r_gripper".into(), -5.0);
    let rig = rig_with(config).await;
    rig.store
        .add(Macro::new("grab", frames(&[(0.0, -30.0), (500.0, 0.0)])))
        .await
        .unwrap();

    let report = rig.player.execute("grab").await.unwrap().wait().await.unwrap();
    assert_eq!(report.transmitted.failures, 0);
    assert!(report.transmitted.sent > 0);
    assert_eq!(rig.sim.write_count(), report.transmitted.sent);
    let last = rig.sim.last_written().await.unwrap();
    assert!((last.get(JointName::RGripper).unwrap() - -5.0).abs() < 1e-9);
    assert!((rig.sim.pose().await.get(JointName::RGripper).unwrap() - -5.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_second_run_is_refused_while_playing() {
    let rig = rig().await;
    rig.store
        .add(Macro::new("long", frames(&[(0.0, 0.0), (5000.0, 20.0)])))
        .await
        .unwrap();
    let handle = rig.player.simulate("long").await.unwrap();
    let err = rig.player.execute("long").await.unwrap_err();
    assert_eq!(err, PlayerError::PlaybackInProgress);
    handle.wait().await.unwrap();
    assert!(rig.player.execute("long").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_the_run() {
    let rig = rig().await;
    rig.store
        .add(Macro::new("long", frames(&[(0.0, 0.0), (10_000.0, 20.0)])))
        .await
        .unwrap();
    let handle = rig.player.execute("long").await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(rig.player.cancel().await);

    let report = handle.wait().await.unwrap();
    assert!(report.cancelled);
    assert!(!rig.player.is_playing());
    assert_eq!(rig.board.owner(), PoseWriter::LiveFeed);
    assert!(!rig.player.cancel().await);

    // Nothing is transmitted after the cancellation settles.
    let writes = rig.sim.write_count();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(rig.sim.write_count(), writes);
}

#[tokio::test(start_paused = true)]
async fn test_fast_segments_warn_but_still_play() {
    let rig = rig().await;
    rig.store
        .add(Macro::new("snap", frames(&[(0.0, -40.0), (100.0, 20.0)])))
        .await
        .unwrap();
    let report = rig.player.simulate("snap").await.unwrap().wait().await.unwrap();
    assert!(!report.cancelled);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].segment, 1);
    assert!((report.warnings[0].speed_deg_s - 600.0).abs() < 1e-6);
    assert!(!report.segments[0].stretched);
}

#[tokio::test(start_paused = true)]
async fn test_speed_limit_stretches_segments() {
    let config = PlaybackConfig {
        limit_speed: true,
        ..PlaybackConfig::default()
    };
    let rig = rig_with(config).await;
    rig.store
        .add(Macro::new("snap", frames(&[(0.0, -40.0), (100.0, 20.0)])))
        .await
        .unwrap();
    let report = rig.player.simulate("snap").await.unwrap().wait().await.unwrap();
    let segment = &report.segments[0];
    assert!(segment.stretched);
    assert!((segment.effective_delay_s - 1.0).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_transmit_failures_do_not_abort_playback() {
    let rig = rig().await;
    rig.store
        .add(Macro::new("pinch", frames(&[(0.0, 0.0), (1000.0, 10.0)])))
        .await
        .unwrap();
    rig.sim.fail_writes(true);
    let report = rig.player.execute("pinch").await.unwrap().wait().await.unwrap();
    assert!(!report.cancelled);
    assert!(report.transmitted.failures > 0);
    assert_eq!(report.transmitted.sent, 0);
    assert_eq!(rig.sim.write_count(), 0);
}

/// A player on a robot that takes 100 ms to acknowledge each pose, holding
/// one two-frame macro named "pinch".
async fn slow_rig() -> (Arc<SlowBackend>, PoseBoard, Player) {
    let config = PlaybackConfig::default();
    let table = Arc::new(KinematicTable::reachy());
    let robot = Arc::new(SlowBackend::new(Duration::from_millis(100)));
    let store = Arc::new(MacroStore::new(Arc::new(MemoryStorage::new()), "reachy_macros", table.clone()));
    store.load().await.unwrap();
    store
        .add(Macro::new("pinch", frames(&[(0.0, 0.0), (1000.0, 10.0)])))
        .await
        .unwrap();
    let board = PoseBoard::new();
    let player = Player::new(
        store,
        board.clone(),
        robot.clone(),
        Interpolator::new(table.clone(), config.step_rate_hz),
        PlaybackSettings::from_config(&config, config.neutral_pose(&table).unwrap()),
    );
    (robot, board, player)
}

#[tokio::test(start_paused = true)]
async fn test_slow_robot_does_not_hold_up_playback() {
    let (robot, board, player) = slow_rig().await;

    // settle + start + 1 s + settle
    let planned = Duration::from_millis(4200);
    let handle = player.execute("pinch").await.unwrap();
    tokio::time::sleep(planned + Duration::from_millis(600)).await;
    assert!(!player.is_playing());
    assert_eq!(board.owner(), PoseWriter::LiveFeed);

    let report = handle.wait().await.unwrap();
    assert!(!report.cancelled);
    assert_eq!(report.transmitted.failures, 0);
    assert!(report.transmitted.sent > 0);
    assert!(report.transmitted.sent < report.poses_emitted);
    let last = robot.sim.last_written().await.unwrap();
    assert!(last.get(JointName::RGripper).unwrap().abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_run_leaves_player_idle() {
    let (robot, board, player) = slow_rig().await;
    robot.panic_on_read();
    let handle = player.execute("pinch").await.unwrap();
    assert!(matches!(handle.wait().await, Err(PlayerError::Aborted(_))));
    assert!(!player.is_playing());
    assert_eq!(board.owner(), PoseWriter::LiveFeed);
    assert!(!player.cancel().await);
}
