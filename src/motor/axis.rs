// One motor axis (wheel) on the ODrive
//
// Each operation formats request lines and hands them to the channel the
// caller holds. Multi-line operations (clear, torque) rely on the caller
// holding exclusive access to the channel for the whole call.

use tracing::{debug, info, warn};

use super::error_flags::{ErrorSource, SourceReport};
use super::kinematics::{mps_to_rps, rpm_to_rps, rps_to_rpm};
use super::odrive::{
    AXIS_STATE_CLOSED_LOOP_CONTROL, AXIS_STATE_IDLE, ControlMode, INPUT_MODE_PASSTHROUGH,
    ProtocolError, Request, Result, fixed4, parse_feedback, parse_float, parse_unsigned,
};
use super::serial::LineChannel;
use crate::config::{Direction, RESPONSE_TIMEOUT};

/// Torque added in the direction of travel to overcome static friction (Nm)
pub const TORQUE_BIAS: f32 = 0.05;

#[derive(Debug, Clone)]
pub struct Axis {
    index: u8,
    direction: Direction,
    wheel_diameter: f32,
    control_mode: ControlMode,
    watchdog_enabled: bool,
    // Cache of the most recent error read, not kept fresh
    last_error_code: Option<u64>,
}

impl Axis {
    pub fn new(index: u8, direction: Direction, wheel_diameter: f32) -> Self {
        Self {
            index,
            direction,
            wheel_diameter,
            control_mode: ControlMode::Idle,
            watchdog_enabled: false,
            last_error_code: None,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    pub fn watchdog_enabled(&self) -> bool {
        self.watchdog_enabled
    }

    pub fn last_error_code(&self) -> Option<u64> {
        self.last_error_code
    }

    fn path(&self, suffix: &str) -> String {
        format!("axis{}.{}", self.index, suffix)
    }

    /// Send a request, waiting for a reply only if the request produces one
    fn issue(&self, link: &mut dyn LineChannel, request: Request) -> Result<String> {
        let line = request.to_string();
        if request.expects_response() {
            link.send_and_receive(&line, RESPONSE_TIMEOUT)
        } else {
            link.send(&line)?;
            Ok(String::new())
        }
    }

    /// Read request where an empty reply means the controller never answered
    fn query(&self, link: &mut dyn LineChannel, request: Request) -> Result<String> {
        let line = request.to_string();
        let response = self.issue(link, request)?;
        if response.is_empty() {
            return Err(ProtocolError::Timeout { request: line });
        }
        Ok(response)
    }

    fn write(
        &self,
        link: &mut dyn LineChannel,
        suffix: &str,
        value: impl std::fmt::Display,
    ) -> Result<()> {
        self.issue(link, Request::write(self.path(suffix), value))?;
        Ok(())
    }

    /// Request closed-loop control
    pub fn start(&mut self, link: &mut dyn LineChannel) -> Result<()> {
        debug!("Axis {} requesting closed-loop control", self.index);
        self.write(link, "requested_state", AXIS_STATE_CLOSED_LOOP_CONTROL)
    }

    pub fn set_control_mode(
        &mut self,
        link: &mut dyn LineChannel,
        mode: ControlMode,
    ) -> Result<()> {
        match mode.code() {
            Some(code) => {
                self.write(link, "controller.config.control_mode", code)?;
                self.write(link, "controller.config.input_mode", INPUT_MODE_PASSTHROUGH)?;
            }
            None => self.write(link, "requested_state", AXIS_STATE_IDLE)?,
        }
        self.control_mode = mode;
        info!("Axis {} set to {:?} control mode", self.index, mode);
        Ok(())
    }

    /// Command a wheel ground speed in m/s. Not clamped; the controller
    /// applies its own velocity limit.
    pub fn set_velocity(&mut self, link: &mut dyn LineChannel, mps: f32) -> Result<()> {
        let rps = mps_to_rps(mps, self.wheel_diameter);
        self.write_input_vel(link, rps)
    }

    pub fn set_speed_rpm(&mut self, link: &mut dyn LineChannel, rpm: f32) -> Result<()> {
        self.write_input_vel(link, rpm_to_rps(rpm))
    }

    fn write_input_vel(&mut self, link: &mut dyn LineChannel, rps: f32) -> Result<()> {
        self.write(
            link,
            "controller.input_vel",
            fixed4(rps * self.direction.sign()),
        )
    }

    /// Command torque in Nm, biased in the direction of travel
    pub fn set_torque(&mut self, link: &mut dyn LineChannel, nm: f32) -> Result<()> {
        let sign = self.direction.sign();
        let travel = if nm >= 0.0 { 1.0 } else { -1.0 };
        let adjusted = nm * sign + TORQUE_BIAS * sign * travel;

        self.issue(
            link,
            Request::Torque {
                axis: self.index,
                value: adjusted,
            },
        )?;
        self.issue(link, Request::Update { axis: self.index })?;
        Ok(())
    }

    /// Read the axis error bitmask
    pub fn get_error_code(&mut self, link: &mut dyn LineChannel) -> Result<u64> {
        let request = Request::read(self.path("error"));
        let line = request.to_string();
        let response = self.issue(link, request)?;
        let code = parse_unsigned(&line, &response)?;
        self.last_error_code = Some(code);
        Ok(code)
    }

    /// True if the axis reports an error, or if its error register cannot be read
    pub fn has_fault(&mut self, link: &mut dyn LineChannel) -> bool {
        match self.get_error_code(link) {
            Ok(code) => code != 0,
            Err(e) => {
                warn!("Axis {} error state unknown, assuming fault: {}", self.index, e);
                true
            }
        }
    }

    /// Read one error register for diagnostics
    pub fn read_error(&mut self, link: &mut dyn LineChannel, source: ErrorSource) -> SourceReport {
        let register = source.register(self.index);
        let request = Request::read(register.clone());
        let line = request.to_string();
        let code = self
            .issue(link, request)
            .and_then(|response| parse_unsigned(&line, &response));
        if let (ErrorSource::Axis, Ok(value)) = (source, &code) {
            self.last_error_code = Some(*value);
        }
        SourceReport {
            register,
            source,
            code,
        }
    }

    /// Clear the error register and re-enter closed-loop control, which a
    /// cleared axis otherwise leaves
    pub fn clear_errors(&mut self, link: &mut dyn LineChannel) -> Result<()> {
        self.write(link, "error", 0)?;
        self.write(link, "requested_state", AXIS_STATE_CLOSED_LOOP_CONTROL)?;
        self.last_error_code = Some(0);
        debug!("Axis {} errors cleared", self.index);
        Ok(())
    }

    pub fn set_watchdog(&mut self, link: &mut dyn LineChannel, enabled: bool) -> Result<()> {
        self.write(link, "config.enable_watchdog", u8::from(enabled))?;
        self.watchdog_enabled = enabled;
        Ok(())
    }

    pub fn set_watchdog_timeout(&mut self, link: &mut dyn LineChannel, seconds: f32) -> Result<()> {
        self.write(link, "config.watchdog_timeout", seconds)
    }

    /// Zero velocity and torque. The axis stays in its control mode: going
    /// idle while producing torque can trip an overcurrent fault.
    pub fn stop(&mut self, link: &mut dyn LineChannel) -> Result<()> {
        self.write(link, "controller.input_vel", fixed4(0.0))?;
        self.write(link, "controller.input_torque", fixed4(0.0))
    }

    /// Measured wheel speed in rpm
    pub fn speed_rpm(&mut self, link: &mut dyn LineChannel) -> Result<f32> {
        let request = Request::read(self.path("encoder.vel_estimate"));
        let line = request.to_string();
        let response = self.query(link, request)?;
        Ok(rps_to_rpm(parse_float(&line, &response)? * self.direction.sign()))
    }

    /// Measured wheel position in turns
    pub fn position_turns(&mut self, link: &mut dyn LineChannel) -> Result<f32> {
        let request = Request::read(self.path("encoder.pos_estimate"));
        let line = request.to_string();
        let response = self.query(link, request)?;
        Ok(parse_float(&line, &response)? * self.direction.sign())
    }

    /// Position (turns) and speed (rpm) in a single exchange
    pub fn feedback(&mut self, link: &mut dyn LineChannel) -> Result<(f32, f32)> {
        let request = Request::Feedback { axis: self.index };
        let line = request.to_string();
        let response = self.query(link, request)?;
        let (pos, vel) = parse_feedback(&line, &response)?;
        let sign = self.direction.sign();
        Ok((pos * sign, rps_to_rpm(vel * sign)))
    }
}
