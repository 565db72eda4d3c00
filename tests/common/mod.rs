//! Backend wrappers shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use reachy_console::backend::{CompliantStart, RobotBackend, SimulatedBackend, TransportError, TransportKind};
use reachy_console::joints::{JointName, Pose};
use reachy_console::kinematics::KinematicTable;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A pose write was accepted by the robot.
    Write,
    EmergencyStop,
}

/// A simulated robot whose pose writes take `write_delay` to be acknowledged.
pub struct SlowBackend {
    pub sim: Arc<SimulatedBackend>,
    write_delay: Duration,
    events: Mutex<Vec<Event>>,
    panic_on_read: AtomicBool,
}

impl SlowBackend {
    pub fn new(write_delay: Duration) -> Self {
        Self {
            sim: Arc::new(SimulatedBackend::new(Arc::new(KinematicTable::reachy()))),
            write_delay,
            events: Mutex::new(Vec::new()),
            panic_on_read: AtomicBool::new(false),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Make the next position reads panic, as a buggy driver would.
    pub fn panic_on_read(&self) {
        self.panic_on_read.store(true, Ordering::SeqCst);
    }

    fn log(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl RobotBackend for SlowBackend {
    fn kind(&self) -> TransportKind {
        TransportKind::Sim
    }

    async fn positions(&self) -> Result<Pose, TransportError> {
        if self.panic_on_read.load(Ordering::SeqCst) {
            panic!("position read blew up");
        }
        self.sim.positions().await
    }

    async fn capture(&self) -> Result<Pose, TransportError> {
        self.sim.capture().await
    }

    async fn goto(&self, positions: &Pose, duration: Duration) -> Result<(), TransportError> {
        self.sim.goto(positions, duration).await
    }

    async fn set_positions(&self, positions: &Pose) -> Result<(), TransportError> {
        tokio::time::sleep(self.write_delay).await;
        self.sim.set_positions(positions).await?;
        self.log(Event::Write);
        Ok(())
    }

    async fn start_compliant(&self) -> Result<CompliantStart, TransportError> {
        self.sim.start_compliant().await
    }

    async fn stop_compliant(&self) -> Result<Vec<JointName>, TransportError> {
        self.sim.stop_compliant().await
    }

    async fn emergency_stop(&self) -> Result<Vec<JointName>, TransportError> {
        self.log(Event::EmergencyStop);
        self.sim.emergency_stop().await
    }

    async fn toggle_joint(&self, joint: JointName, locked: bool) -> Result<(), TransportError> {
        self.sim.toggle_joint(joint, locked).await
    }

    async fn joints(&self) -> Result<Vec<JointName>, TransportError> {
        self.sim.joints().await
    }
}
