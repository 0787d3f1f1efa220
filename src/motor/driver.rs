// High-level motor driver for the differential-drive base
//
// Owns the serial channel and both wheel axes. Share it as `SharedDrive`:
// holding the lock is what keeps frames from different callers from
// interleaving on the half-duplex link.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::axis::Axis;
use super::error_flags::{ErrorReport, ErrorSource};
use super::kinematics::DriveGeometry;
use super::odrive::{ControlMode, ProtocolError};
use super::serial::LineChannel;
use crate::config::MotorDirections;
use crate::messages::WheelSpeedPair;

/// Axis indices on the controller
pub const AXIS_LEFT: u8 = 0;
pub const AXIS_RIGHT: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Drive is halted, motion command refused")]
    Halted,
}

impl DriveError {
    pub fn is_link_failure(&self) -> bool {
        matches!(self, DriveError::Protocol(e) if e.is_link_failure())
    }
}

pub type Result<T> = std::result::Result<T, DriveError>;

/// Which wheel an operation concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    Left,
    Right,
}

/// Controller shared between the supervisor and command delivery
pub type SharedDrive = Arc<Mutex<DriveController>>;

/// Lock the drive even if a previous holder panicked; stopping the wheels
/// must stay possible
pub fn lock_drive(drive: &SharedDrive) -> MutexGuard<'_, DriveController> {
    drive.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DriveController {
    link: Box<dyn LineChannel>,
    left: Axis,
    right: Axis,
    geometry: DriveGeometry,
    commanded: WheelSpeedPair,
    halted: bool,
}

impl DriveController {
    pub fn new(
        link: Box<dyn LineChannel>,
        directions: MotorDirections,
        geometry: DriveGeometry,
    ) -> Self {
        Self {
            link,
            left: Axis::new(AXIS_LEFT, directions.left, geometry.wheel_diameter),
            right: Axis::new(AXIS_RIGHT, directions.right, geometry.wheel_diameter),
            geometry,
            commanded: WheelSpeedPair::zero(),
            halted: false,
        }
    }

    pub fn into_shared(self) -> SharedDrive {
        Arc::new(Mutex::new(self))
    }

    pub fn geometry(&self) -> DriveGeometry {
        self.geometry
    }

    /// Last wheel speeds written (m/s)
    pub fn commanded(&self) -> WheelSpeedPair {
        self.commanded
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn axis(&self, wheel: Wheel) -> &Axis {
        match wheel {
            Wheel::Left => &self.left,
            Wheel::Right => &self.right,
        }
    }

    /// Run `op` on both axes, left first. The right axis is attempted even
    /// if the left one fails; the first error is returned.
    fn for_each_axis<F>(&mut self, mut op: F) -> std::result::Result<(), ProtocolError>
    where
        F: FnMut(&mut Axis, &mut dyn LineChannel) -> std::result::Result<(), ProtocolError>,
    {
        let left = op(&mut self.left, self.link.as_mut());
        let right = op(&mut self.right, self.link.as_mut());
        left.and(right)
    }

    /// Bring both axes into closed-loop velocity control with the
    /// controller watchdog off and errors cleared
    pub fn initialize(&mut self) -> std::result::Result<(), (u8, ProtocolError)> {
        info!("Initializing axes for velocity control");
        for axis in [&mut self.left, &mut self.right] {
            let link = self.link.as_mut();
            let index = axis.index();
            axis.start(link).map_err(|e| (index, e))?;
            axis.set_control_mode(link, ControlMode::Velocity)
                .map_err(|e| (index, e))?;
            axis.set_watchdog(link, false).map_err(|e| (index, e))?;
            axis.clear_errors(link).map_err(|e| (index, e))?;
        }
        info!("Axes initialized successfully");
        Ok(())
    }

    /// Send body velocity command to the base
    ///
    /// # Arguments
    /// * `linear` - Forward velocity in m/s (positive = forward)
    /// * `angular` - Rotational velocity in rad/s (positive = counter-clockwise)
    pub fn set_velocity(&mut self, linear: f32, angular: f32) -> Result<WheelSpeedPair> {
        let wheels = self.geometry.wheel_speeds(linear, angular);
        self.set_wheel_speeds(wheels)?;
        Ok(wheels)
    }

    /// Send per-wheel ground speeds (m/s), left then right
    pub fn set_wheel_speeds(&mut self, wheels: WheelSpeedPair) -> Result<()> {
        if self.halted {
            return Err(DriveError::Halted);
        }
        debug!("Setting wheel speeds: left={}, right={}", wheels.left, wheels.right);

        self.left.set_velocity(self.link.as_mut(), wheels.left)?;
        self.commanded.left = wheels.left;
        self.right.set_velocity(self.link.as_mut(), wheels.right)?;
        self.commanded.right = wheels.right;
        Ok(())
    }

    /// Zero both wheels and refuse further motion commands. Both wheels
    /// are attempted even if one write fails.
    pub fn halt(&mut self) -> Result<()> {
        info!("Halting drive");
        self.halted = true;
        self.zero_each(|axis, link| axis.set_velocity(link, 0.0))
    }

    /// Zero velocity and torque on both axes, keeping the control mode
    pub fn stop(&mut self) -> Result<()> {
        info!("Stopping both axes");
        self.zero_each(|axis, link| axis.stop(link))
    }

    /// Apply a zeroing `op` to both axes, recording each wheel that took it
    fn zero_each<F>(&mut self, mut op: F) -> Result<()>
    where
        F: FnMut(&mut Axis, &mut dyn LineChannel) -> std::result::Result<(), ProtocolError>,
    {
        let left = op(&mut self.left, self.link.as_mut());
        if left.is_ok() {
            self.commanded.left = 0.0;
        }
        let right = op(&mut self.right, self.link.as_mut());
        if right.is_ok() {
            self.commanded.right = 0.0;
        }
        left.and(right)?;
        Ok(())
    }

    pub fn set_torque(&mut self, wheel: Wheel, nm: f32) -> Result<()> {
        let link = self.link.as_mut();
        match wheel {
            Wheel::Left => self.left.set_torque(link, nm)?,
            Wheel::Right => self.right.set_torque(link, nm)?,
        }
        Ok(())
    }

    pub fn set_control_mode(&mut self, mode: ControlMode) -> Result<()> {
        self.for_each_axis(|axis, link| axis.set_control_mode(link, mode))?;
        Ok(())
    }

    pub fn set_watchdog(&mut self, enabled: bool) -> Result<()> {
        self.for_each_axis(|axis, link| axis.set_watchdog(link, enabled))?;
        Ok(())
    }

    pub fn set_watchdog_timeout(&mut self, seconds: f32) -> Result<()> {
        self.for_each_axis(|axis, link| axis.set_watchdog_timeout(link, seconds))?;
        Ok(())
    }

    pub fn clear_errors(&mut self) -> Result<()> {
        self.for_each_axis(|axis, link| axis.clear_errors(link))?;
        Ok(())
    }

    /// True if either axis reports, or fails to report, its error state
    pub fn has_errors(&mut self) -> bool {
        let left = self.left.has_fault(self.link.as_mut());
        let right = self.right.has_fault(self.link.as_mut());
        left || right
    }

    /// Clear any axis that is faulted. Returns the wheels that were cleared.
    pub fn recover(&mut self) -> Result<Vec<Wheel>> {
        let mut cleared = Vec::new();
        for (wheel, axis) in [(Wheel::Left, &mut self.left), (Wheel::Right, &mut self.right)] {
            let link = self.link.as_mut();
            if axis.has_fault(link) {
                warn!("Error detected on {:?} axis, clearing", wheel);
                axis.clear_errors(link)?;
                cleared.push(wheel);
            }
        }
        Ok(cleared)
    }

    /// Read and decode every error register of both axes
    pub fn error_report(&mut self) -> ErrorReport {
        let mut report = ErrorReport::default();
        for axis in [&mut self.left, &mut self.right] {
            for source in ErrorSource::ALL {
                report.sources.push(axis.read_error(self.link.as_mut(), source));
            }
        }
        report
    }

    /// Position (turns) and speed (rpm) of a wheel
    pub fn feedback(&mut self, wheel: Wheel) -> Result<(f32, f32)> {
        let link = self.link.as_mut();
        let reading = match wheel {
            Wheel::Left => self.left.feedback(link)?,
            Wheel::Right => self.right.feedback(link)?,
        };
        Ok(reading)
    }
}

impl Drop for DriveController {
    fn drop(&mut self) {
        // Wheels left spinning at teardown get a best-effort stop
        if !self.commanded.is_zero() {
            if let Err(e) = self.stop() {
                warn!("Failed to stop motors on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Direction;
    use crate::motor::mock::MockLink;

    fn controller(link: &MockLink) -> DriveController {
        DriveController::new(
            Box::new(link.clone()),
            MotorDirections {
                left: Direction::Forward,
                right: Direction::Reversed,
            },
            DriveGeometry {
                wheel_base: 0.4,
                wheel_diameter: 0.165,
            },
        )
    }

    #[test]
    fn test_initialize_sequence() {
        let link = MockLink::new();
        let mut drive = controller(&link);
        drive.initialize().unwrap();
        assert_eq!(
            link.sent(),
            vec![
                "w axis0.requested_state 8",
                "w axis0.controller.config.control_mode 2",
                "w axis0.controller.config.input_mode 1",
                "w axis0.config.enable_watchdog 0",
                "w axis0.error 0",
                "w axis0.requested_state 8",
                "w axis1.requested_state 8",
                "w axis1.controller.config.control_mode 2",
                "w axis1.controller.config.input_mode 1",
                "w axis1.config.enable_watchdog 0",
                "w axis1.error 0",
                "w axis1.requested_state 8",
            ]
        );
        assert_eq!(drive.axis(Wheel::Left).control_mode(), ControlMode::Velocity);
        assert_eq!(drive.axis(Wheel::Right).control_mode(), ControlMode::Velocity);
    }

    #[test]
    fn test_initialize_reports_failing_axis() {
        let link = MockLink::new();
        link.break_link();
        let mut drive = controller(&link);
        let (axis, err) = drive.initialize().unwrap_err();
        assert_eq!(axis, AXIS_LEFT);
        assert!(err.is_link_failure());
    }

    #[test]
    fn test_set_velocity_left_then_right() {
        let link = MockLink::new();
        let mut drive = controller(&link);
        let wheels = drive.set_velocity(0.0, 1.2).unwrap();
        assert!((wheels.left + 0.24).abs() < 1e-6);
        assert!((wheels.right - 0.24).abs() < 1e-6);
        // right axis is mounted reversed
        assert_eq!(
            link.sent(),
            vec![
                "w axis0.controller.input_vel -0.4630",
                "w axis1.controller.input_vel -0.4630",
            ]
        );
        assert_eq!(drive.commanded(), wheels);
        drive.stop().unwrap();
    }

    #[test]
    fn test_halt_refuses_motion() {
        let link = MockLink::new();
        let mut drive = controller(&link);
        drive.set_velocity(0.2, 0.0).unwrap();
        drive.halt().unwrap();
        assert!(drive.commanded().is_zero());
        assert!(matches!(drive.set_velocity(0.2, 0.0), Err(DriveError::Halted)));
        assert_eq!(link.count("w axis0.controller.input_vel 0.0000"), 1);
        assert_eq!(link.count("w axis1.controller.input_vel 0.0000"), 1);
    }

    #[test]
    fn test_halt_zeroes_right_when_left_fails() {
        let link = MockLink::new();
        let mut drive = controller(&link);
        drive.set_velocity(0.2, 0.0).unwrap();
        link.clear();
        link.fail_lines_containing("axis0");

        let err = drive.halt().unwrap_err();
        assert!(err.is_link_failure());
        assert_eq!(link.sent(), vec!["w axis1.controller.input_vel 0.0000"]);
        assert_eq!(drive.commanded().right, 0.0);
        assert!(drive.commanded().left != 0.0);
        assert!(drive.is_halted());
    }

    #[test]
    fn test_clear_errors_reaches_right_when_left_fails() {
        let link = MockLink::new();
        let mut drive = controller(&link);
        link.fail_lines_containing("axis0");
        assert!(drive.clear_errors().is_err());
        assert_eq!(
            link.sent(),
            vec!["w axis1.error 0", "w axis1.requested_state 8"]
        );
    }

    #[test]
    fn test_stop_zeroes_right_when_left_fails() {
        let link = MockLink::new();
        let mut drive = controller(&link);
        drive.set_velocity(0.2, 0.0).unwrap();
        link.fail_lines_containing("axis0");
        assert!(drive.stop().is_err());
        assert_eq!(link.count("w axis1.controller.input_vel 0.0000"), 1);
        assert_eq!(link.count("w axis1.controller.input_torque 0.0000"), 1);
        assert_eq!(drive.commanded().right, 0.0);
    }

    #[test]
    fn test_control_mode_both_axes() {
        let link = MockLink::new();
        let mut drive = controller(&link);
        drive.set_control_mode(ControlMode::Torque).unwrap();
        assert_eq!(
            link.sent(),
            vec![
                "w axis0.controller.config.control_mode 1",
                "w axis0.controller.config.input_mode 1",
                "w axis1.controller.config.control_mode 1",
                "w axis1.controller.config.input_mode 1",
            ]
        );
        assert_eq!(drive.axis(Wheel::Right).control_mode(), ControlMode::Torque);

        link.clear();
        drive.set_control_mode(ControlMode::Idle).unwrap();
        assert_eq!(
            link.sent(),
            vec!["w axis0.requested_state 1", "w axis1.requested_state 1"]
        );
    }

    #[test]
    fn test_watchdog_both_axes() {
        let link = MockLink::new();
        let mut drive = controller(&link);
        drive.set_watchdog_timeout(0.5).unwrap();
        drive.set_watchdog(true).unwrap();
        assert_eq!(
            link.sent(),
            vec![
                "w axis0.config.watchdog_timeout 0.5",
                "w axis1.config.watchdog_timeout 0.5",
                "w axis0.config.enable_watchdog 1",
                "w axis1.config.enable_watchdog 1",
            ]
        );
        assert!(drive.axis(Wheel::Left).watchdog_enabled());
        assert!(drive.axis(Wheel::Right).watchdog_enabled());
    }

    #[test]
    fn test_drop_stops_moving_wheels() {
        let link = MockLink::new();
        {
            let mut drive = controller(&link);
            drive.set_velocity(0.2, 0.0).unwrap();
        }
        assert_eq!(link.count("w axis0.controller.input_vel 0.0000"), 1);
        assert_eq!(link.count("w axis1.controller.input_torque 0.0000"), 1);
    }

    #[test]
    fn test_drop_when_stopped_is_silent() {
        let link = MockLink::new();
        drop(controller(&link));
        assert!(link.sent().is_empty());
    }

    #[test]
    fn test_recover_clears_only_faulted_axis() {
        let link = MockLink::new();
        link.respond("r axis0.error", "0");
        link.respond("r axis1.error", "2048");
        let mut drive = controller(&link);
        assert!(drive.has_errors());
        let cleared = drive.recover().unwrap();
        assert_eq!(cleared, vec![Wheel::Right]);
        assert_eq!(link.count("w axis1.error 0"), 1);
        assert_eq!(link.count("w axis0.error 0"), 0);
    }

    #[test]
    fn test_error_report_covers_all_sources() {
        let link = MockLink::new();
        for register in [
            "axis0.error",
            "axis0.encoder.error",
            "axis0.controller.error",
            "axis0.motor.error",
            "axis1.error",
            "axis1.encoder.error",
            "axis1.controller.error",
        ] {
            link.respond(&format!("r {}", register), "0");
        }
        link.respond("r axis1.motor.error", "24");
        let mut drive = controller(&link);
        let report = drive.error_report();
        assert_eq!(report.sources.len(), 8);
        let text = report.to_string();
        assert!(text.contains("axis0.encoder.error=0x0: None"));
        assert!(text.contains("axis1.motor.error=0x18: drv fault, control deadline missed"));
        assert!(report.has_faults());
    }

    #[test]
    fn test_feedback_per_wheel() {
        let link = MockLink::new();
        link.respond("f 0", "1.0 0.5");
        link.respond("f 1", "1.0 0.5");
        let mut drive = controller(&link);
        assert_eq!(drive.feedback(Wheel::Left).unwrap(), (1.0, 30.0));
        assert_eq!(drive.feedback(Wheel::Right).unwrap(), (-1.0, -30.0));
    }

    #[test]
    fn test_torque_per_wheel() {
        let link = MockLink::new();
        let mut drive = controller(&link);
        drive.set_torque(Wheel::Right, 0.2).unwrap();
        assert_eq!(link.sent(), vec!["c 1 -0.2500", "u 1"]);
    }
}
