// ODrive ASCII protocol
//
// One request per line, newline terminated:
//   w <path> <value>   write a parameter (no response)
//   r <path>           read a parameter (one response line)
//   f <axis>           feedback query, responds "<pos> <vel>"
//   c <axis> <torque>  set torque, followed by
//   u <axis>           update/trigger

use std::fmt;

/// `axisN.requested_state` values
pub const AXIS_STATE_IDLE: u8 = 1;
pub const AXIS_STATE_CLOSED_LOOP_CONTROL: u8 = 8;

/// `controller.config.input_mode` value for passthrough input
pub const INPUT_MODE_PASSTHROUGH: u8 = 1;

/// Control modes
///
/// The firmware has no idle control mode; `Idle` is reached through the
/// idle axis state instead of `controller.config.control_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Idle,
    Torque,
    Velocity,
}

impl ControlMode {
    /// `controller.config.control_mode` value, if the mode has one
    pub fn code(self) -> Option<u8> {
        match self {
            ControlMode::Idle => None,
            ControlMode::Torque => Some(1),
            ControlMode::Velocity => Some(2),
        }
    }
}

/// Error types for ODrive communication
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No response to '{request}'")]
    Timeout { request: String },

    #[error("Unparseable response to '{request}': {response:?}")]
    Parse { request: String, response: String },
}

impl ProtocolError {
    /// True when the link itself is broken, as opposed to a single bad exchange
    pub fn is_link_failure(&self) -> bool {
        matches!(self, ProtocolError::Serial(_) | ProtocolError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// A single request line
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Write { path: String, value: String },
    Read { path: String },
    Feedback { axis: u8 },
    Torque { axis: u8, value: f32 },
    Update { axis: u8 },
}

impl Request {
    pub fn write(path: impl Into<String>, value: impl fmt::Display) -> Self {
        Request::Write {
            path: path.into(),
            value: value.to_string(),
        }
    }

    pub fn read(path: impl Into<String>) -> Self {
        Request::Read { path: path.into() }
    }

    /// Whether the controller answers this request with a line
    pub fn expects_response(&self) -> bool {
        matches!(self, Request::Read { .. } | Request::Feedback { .. })
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Write { path, value } => write!(f, "w {} {}", path, value),
            Request::Read { path } => write!(f, "r {}", path),
            Request::Feedback { axis } => write!(f, "f {}", axis),
            Request::Torque { axis, value } => write!(f, "c {} {:.4}", axis, value),
            Request::Update { axis } => write!(f, "u {}", axis),
        }
    }
}

/// Format a float with the 4 decimals the controller expects.
/// Negative zero is written as plain zero.
pub fn fixed4(value: f32) -> String {
    let text = format!("{:.4}", value);
    if text == "-0.0000" {
        "0.0000".to_string()
    } else {
        text
    }
}

/// Parse an unsigned integer, discarding any non-digit decoration
/// (the firmware may append type markers to numeric replies)
pub fn parse_unsigned(request: &str, response: &str) -> Result<u64> {
    let digits: String = response.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().map_err(|_| ProtocolError::Parse {
        request: request.to_string(),
        response: response.to_string(),
    })
}

pub fn parse_float(request: &str, response: &str) -> Result<f32> {
    response.trim().parse().map_err(|_| ProtocolError::Parse {
        request: request.to_string(),
        response: response.to_string(),
    })
}

/// Parse a feedback reply of the form "<position> <velocity>"
pub fn parse_feedback(request: &str, response: &str) -> Result<(f32, f32)> {
    let mut fields = response.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(pos), Some(vel), None) => Ok((
            parse_float(request, pos)?,
            parse_float(request, vel)?,
        )),
        _ => Err(ProtocolError::Parse {
            request: request.to_string(),
            response: response.to_string(),
        }),
    }
}
