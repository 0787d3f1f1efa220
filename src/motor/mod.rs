// Motor control module for the two-wheeled base
//
// Provides:
// - Line-based serial channel to the ODrive
// - ODrive ASCII protocol requests and named error flags
// - Per-axis operations (mode, velocity, torque, errors, watchdog)
// - Differential-drive kinematics
// - High-level drive controller owning both wheels

pub mod axis;
mod driver;
pub mod error_flags;
pub mod kinematics;
pub mod odrive;
pub mod serial;

#[cfg(test)]
pub(crate) mod mock;

pub use axis::Axis;
pub use driver::{
    AXIS_LEFT, AXIS_RIGHT, DriveController, DriveError, SharedDrive, Wheel, lock_drive,
};
pub use error_flags::{ErrorReport, ErrorSource};
pub use kinematics::DriveGeometry;
pub use odrive::{ControlMode, ProtocolError};
pub use serial::{LineChannel, SerialLink};
