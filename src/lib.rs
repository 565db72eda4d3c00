// src/lib.rs - Reachy teleoperation and choreography console
pub mod backend;
pub mod config;
pub mod console;
pub mod error;
pub mod feed;
pub mod joints;
pub mod kinematics;
pub mod macros;
pub mod motion;
pub mod pose_board;
pub mod web;

pub use console::Console;
pub use error::{ConsoleError, ErrorKind};
pub use joints::{JointName, Pose};
pub use kinematics::KinematicTable;
