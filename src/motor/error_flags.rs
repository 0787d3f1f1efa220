// Named error bits reported by each error source of an axis
//
// Values follow the ODrive 0.5.x firmware enums.

use std::fmt;

use super::odrive::ProtocolError;

/// Where an error register lives on the axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    Axis,
    Encoder,
    Controller,
    Motor,
}

impl ErrorSource {
    pub const ALL: [ErrorSource; 4] = [
        ErrorSource::Axis,
        ErrorSource::Encoder,
        ErrorSource::Controller,
        ErrorSource::Motor,
    ];

    /// Register path for the given axis, e.g. `axis0.encoder.error`
    pub fn register(self, axis: u8) -> String {
        match self {
            ErrorSource::Axis => format!("axis{}.error", axis),
            ErrorSource::Encoder => format!("axis{}.encoder.error", axis),
            ErrorSource::Controller => format!("axis{}.controller.error", axis),
            ErrorSource::Motor => format!("axis{}.motor.error", axis),
        }
    }

    pub fn flags(self) -> &'static [(u64, &'static str)] {
        match self {
            ErrorSource::Axis => AXIS_FLAGS,
            ErrorSource::Encoder => ENCODER_FLAGS,
            ErrorSource::Controller => CONTROLLER_FLAGS,
            ErrorSource::Motor => MOTOR_FLAGS,
        }
    }
}

pub const AXIS_FLAGS: &[(u64, &str)] = &[
    (0x1, "INVALID_STATE"),
    (0x800, "WATCHDOG_TIMER_EXPIRED"),
    (0x1000, "MIN_ENDSTOP_PRESSED"),
    (0x2000, "MAX_ENDSTOP_PRESSED"),
    (0x4000, "ESTOP_REQUESTED"),
    (0x20000, "HOMING_WITHOUT_ENDSTOP"),
    (0x40000, "OVER_TEMP"),
    (0x80000, "UNKNOWN_POSITION"),
];

pub const ENCODER_FLAGS: &[(u64, &str)] = &[
    (0x1, "UNSTABLE_GAIN"),
    (0x2, "CPR_POLEPAIRS_MISMATCH"),
    (0x4, "NO_RESPONSE"),
    (0x8, "UNSUPPORTED_ENCODER_MODE"),
    (0x10, "ILLEGAL_HALL_STATE"),
    (0x20, "INDEX_NOT_FOUND_YET"),
    (0x40, "ABS_SPI_TIMEOUT"),
    (0x80, "ABS_SPI_COM_FAIL"),
    (0x100, "ABS_SPI_NOT_READY"),
    (0x200, "HALL_NOT_CALIBRATED_YET"),
];

pub const CONTROLLER_FLAGS: &[(u64, &str)] = &[
    (0x1, "OVERSPEED"),
    (0x2, "INVALID_INPUT_MODE"),
    (0x4, "UNSTABLE_GAIN"),
    (0x8, "INVALID_MIRROR_AXIS"),
    (0x10, "INVALID_LOAD_ENCODER"),
    (0x20, "INVALID_ESTIMATE"),
    (0x40, "INVALID_CIRCULAR_RANGE"),
    (0x80, "SPINOUT_DETECTED"),
];

pub const MOTOR_FLAGS: &[(u64, &str)] = &[
    (0x1, "PHASE_RESISTANCE_OUT_OF_RANGE"),
    (0x2, "PHASE_INDUCTANCE_OUT_OF_RANGE"),
    (0x8, "DRV_FAULT"),
    (0x10, "CONTROL_DEADLINE_MISSED"),
    (0x80, "MODULATION_MAGNITUDE"),
    (0x400, "CURRENT_SENSE_SATURATION"),
    (0x1000, "CURRENT_LIMIT_VIOLATION"),
    (0x10000, "MODULATION_IS_NAN"),
    (0x20000, "MOTOR_THERMISTOR_OVER_TEMP"),
    (0x40000, "FET_THERMISTOR_OVER_TEMP"),
    (0x80000, "TIMER_UPDATE_MISSED"),
    (0x100000, "CURRENT_MEASUREMENT_UNAVAILABLE"),
    (0x200000, "CONTROLLER_FAILED"),
    (0x400000, "I_BUS_OUT_OF_RANGE"),
    (0x800000, "BRAKE_RESISTOR_DISARMED"),
    (0x1000000, "SYSTEM_LEVEL"),
    (0x2000000, "BAD_TIMING"),
    (0x4000000, "UNKNOWN_PHASE_ESTIMATE"),
    (0x8000000, "UNKNOWN_PHASE_VEL"),
    (0x10000000, "UNKNOWN_TORQUE"),
    (0x20000000, "UNKNOWN_CURRENT_COMMAND"),
    (0x40000000, "UNKNOWN_CURRENT_MEASUREMENT"),
    (0x80000000, "UNKNOWN_VBUS_VOLTAGE"),
    (0x100000000, "UNKNOWN_VOLTAGE_COMMAND"),
    (0x200000000, "UNKNOWN_GAINS"),
    (0x400000000, "CONTROLLER_INITIALIZING"),
    (0x800000000, "UNBALANCED_PHASES"),
];

/// Human readable names of every flag set in `code`, in table order
/// (`OVER_TEMP` becomes `over temp`)
pub fn decode(code: u64, table: &[(u64, &str)]) -> Vec<String> {
    table
        .iter()
        .filter(|(bit, _)| code & bit != 0)
        .map(|(_, name)| name.to_lowercase().replace('_', " "))
        .collect()
}

/// One error register read
#[derive(Debug)]
pub struct SourceReport {
    pub register: String,
    pub source: ErrorSource,
    pub code: Result<u64, ProtocolError>,
}

impl SourceReport {
    /// Unreadable registers count as faulted
    pub fn is_faulted(&self) -> bool {
        !matches!(self.code, Ok(0))
    }
}

impl fmt::Display for SourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Ok(0) => write!(f, "{}=0x0: None", self.register),
            Ok(code) => write!(
                f,
                "{}={:#x}: {}",
                self.register,
                code,
                decode(*code, self.source.flags()).join(", ")
            ),
            Err(e) => write!(f, "{}: {}", self.register, e),
        }
    }
}

/// Error registers of every source on a set of axes
#[derive(Debug, Default)]
pub struct ErrorReport {
    pub sources: Vec<SourceReport>,
}

impl ErrorReport {
    pub fn has_faults(&self) -> bool {
        self.sources.iter().any(SourceReport::is_faulted)
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "======= ODrive Errors =======")?;
        for source in &self.sources {
            writeln!(f, "{}", source)?;
        }
        write!(f, "=============================")
    }
}
