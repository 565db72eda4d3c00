// src/backend/sim.rs - In-memory robot
use super::{CompliantStart, RobotBackend, TransportError, TransportKind};
use crate::joints::{JointName, Pose};
use crate::kinematics::KinematicTable;
use async_trait::async_trait;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug)]
struct SimState {
    positions: Pose,
    /// `true` when the joint is stiff (locked).
    locked: BTreeMap<JointName, bool>,
    /// Pose recorded when compliant mode started; restored on emergency stop.
    initial: Option<Pose>,
    last_written: Option<Pose>,
}

/// Simulated robot with every joint at rest, optional sensor noise and
/// switchable read/write faults.
pub struct SimulatedBackend {
    table: Arc<KinematicTable>,
    state: Mutex<SimState>,
    noise_deg: f64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl SimulatedBackend {
    pub fn new(table: Arc<KinematicTable>) -> Self {
        Self::with_pose(table, Pose::uniform(0.0))
    }

    pub fn with_pose(table: Arc<KinematicTable>, pose: Pose) -> Self {
        let positions = table.clamp_pose(&pose);
        Self {
            table,
            state: Mutex::new(SimState {
                positions,
                locked: JointName::ALL.iter().map(|joint| (*joint, true)).collect(),
                initial: None,
                last_written: None,
            }),
            noise_deg: 0.0,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Uniform noise of up to `±noise_deg` on every read.
    pub fn with_noise(mut self, noise_deg: f64) -> Self {
        self.noise_deg = noise_deg.abs();
        self
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Move the simulated joints as if the operator had pushed them by hand.
    pub async fn set_pose(&self, pose: &Pose) {
        let clamped = self.table.clamp_pose(pose);
        self.state.lock().await.positions.merge(&clamped);
    }

    pub async fn pose(&self) -> Pose {
        self.state.lock().await.positions.clone()
    }

    pub async fn last_written(&self) -> Option<Pose> {
        self.state.lock().await.last_written.clone()
    }

    pub async fn is_locked(&self, joint: JointName) -> bool {
        self.state.lock().await.locked.get(&joint).copied().unwrap_or(true)
    }

    /// Number of accepted `goto` / `set_positions` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> Result<(), TransportError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(TransportError::Request("simulated read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), TransportError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Request("simulated write failure".to_string()));
        }
        Ok(())
    }

    async fn read(&self) -> Result<Pose, TransportError> {
        self.check_read()?;
        let positions = self.state.lock().await.positions.clone();
        if self.noise_deg == 0.0 {
            return Ok(positions);
        }
        let mut rng = rand::rng();
        let noisy = positions
            .iter()
            .map(|(joint, angle)| {
                let jitter = rng.random_range(-self.noise_deg..=self.noise_deg);
                (joint, self.table.clamp(joint, angle + jitter))
            })
            .collect();
        Ok(noisy)
    }

    async fn write(&self, positions: &Pose) -> Result<(), TransportError> {
        self.check_write()?;
        let clamped = self.table.clamp_pose(positions);
        let mut state = self.state.lock().await;
        state.positions.merge(&clamped);
        state.last_written = Some(clamped);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stiffen_all(state: &mut SimState) -> Vec<JointName> {
        for locked in state.locked.values_mut() {
            *locked = true;
        }
        state.locked.keys().copied().collect()
    }
}

#[async_trait]
impl RobotBackend for SimulatedBackend {
    fn kind(&self) -> TransportKind {
        TransportKind::Sim
    }

    async fn positions(&self) -> Result<Pose, TransportError> {
        self.read().await
    }

    async fn capture(&self) -> Result<Pose, TransportError> {
        self.read().await
    }

    async fn goto(&self, positions: &Pose, _duration: Duration) -> Result<(), TransportError> {
        self.write(positions).await
    }

    async fn set_positions(&self, positions: &Pose) -> Result<(), TransportError> {
        self.write(positions).await
    }

    async fn start_compliant(&self) -> Result<CompliantStart, TransportError> {
        self.check_write()?;
        let mut state = self.state.lock().await;
        for locked in state.locked.values_mut() {
            *locked = false;
        }
        let initial_positions = state.positions.clone();
        state.initial = Some(initial_positions.clone());
        Ok(CompliantStart {
            initial_positions,
            message: Some("all joints compliant".to_string()),
        })
    }

    async fn stop_compliant(&self) -> Result<Vec<JointName>, TransportError> {
        self.check_write()?;
        let mut state = self.state.lock().await;
        state.initial = None;
        Ok(Self::stiffen_all(&mut state))
    }

    async fn emergency_stop(&self) -> Result<Vec<JointName>, TransportError> {
        let mut state = self.state.lock().await;
        if let Some(initial) = state.initial.take() {
            state.positions = initial;
        }
        Ok(Self::stiffen_all(&mut state))
    }

    async fn toggle_joint(&self, joint: JointName, locked: bool) -> Result<(), TransportError> {
        self.check_write()?;
        self.state.lock().await.locked.insert(joint, locked);
        Ok(())
    }

    async fn joints(&self) -> Result<Vec<JointName>, TransportError> {
        self.check_read()?;
        Ok(JointName::ALL.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SimulatedBackend {
        SimulatedBackend::new(Arc::new(KinematicTable::reachy()))
    }

    #[tokio::test]
    async fn test_writes_are_clamped_and_visible() {
        let sim = backend();
        let target: Pose = [(JointName::RShoulderPitch, -200.0)].into_iter().collect();
        sim.set_positions(&target).await.unwrap();
        let pose = sim.positions().await.unwrap();
        assert_eq!(pose.get(JointName::RShoulderPitch), Some(-150.0));
        assert_eq!(pose.len(), JointName::ALL.len());
        assert_eq!(sim.write_count(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let sim = backend();
        sim.fail_reads(true);
        assert!(sim.capture().await.is_err());
        sim.fail_reads(false);
        sim.fail_writes(true);
        assert!(sim.set_positions(&Pose::uniform(1.0)).await.is_err());
        assert_eq!(sim.write_count(), 0);
    }

    #[tokio::test]
    async fn test_emergency_stop_restores_initial_pose() {
        let sim = backend();
        let start = sim.start_compliant().await.unwrap();
        assert!(!sim.is_locked(JointName::NeckYaw).await);
        sim.set_pose(&[(JointName::NeckYaw, 30.0)].into_iter().collect()).await;
        let stiffened = sim.emergency_stop().await.unwrap();
        assert_eq!(stiffened.len(), JointName::ALL.len());
        assert!(sim.is_locked(JointName::NeckYaw).await);
        assert_eq!(sim.pose().await, start.initial_positions);
    }

    #[tokio::test]
    async fn test_noise_stays_within_bounds() {
        let sim = backend().with_noise(2.0);
        for _ in 0..20 {
            let pose = sim.positions().await.unwrap();
            let yaw = pose.get(JointName::NeckYaw).unwrap();
            assert!((-2.0..=2.0).contains(&yaw));
        }
    }

    #[tokio::test]
    async fn test_toggle_joint() {
        let sim = backend();
        sim.toggle_joint(JointName::LGripper, false).await.unwrap();
        assert!(!sim.is_locked(JointName::LGripper).await);
        assert!(sim.is_locked(JointName::RGripper).await);
    }
}
