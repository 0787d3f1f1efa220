// Serial link, topic, geometry and calibration configuration
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dispatcher::SpeedPresets;
use crate::motor::kinematics::DriveGeometry;

// Serial link to the motor controller (ASCII protocol over UART)
pub const MOTOR_PORT: &str = "/dev/ttyAMA1";
pub const MOTOR_BAUDRATE: u32 = 115_200;

// Upper bound on waiting for a response line
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

// Zenoh topic carrying drive commands
pub const TOPIC_DRIVE: &str = "robot/drive";

// Robot geometry (meters)
pub const WHEEL_BASE: f32 = 0.4;
pub const WHEEL_DIAMETER: f32 = 0.165;

// Keyword command presets
pub const LINEAR_SPEED: f32 = 0.2; // m/s
pub const ANGULAR_SPEED: f32 = 1.2; // rad/s

// Per-robot wheel direction calibration
pub const DIRECTIONS_PATH: &str = "motor_dir.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed direction file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Rotation sense of a wheel relative to the controller's positive direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i8")]
pub enum Direction {
    Forward,
    Reversed,
}

impl Direction {
    pub fn sign(self) -> f32 {
        match self {
            Direction::Forward => 1.0,
            Direction::Reversed => -1.0,
        }
    }
}

impl TryFrom<i8> for Direction {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Direction::Forward),
            -1 => Ok(Direction::Reversed),
            other => Err(format!("direction must be 1 or -1, got {}", other)),
        }
    }
}

/// Contents of the direction file, e.g. `{"left": 1, "right": -1}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MotorDirections {
    pub left: Direction,
    pub right: Direction,
}

impl MotorDirections {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Everything the runtime needs, assembled by the binary from CLI flags
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub port: String,
    pub baudrate: u32,
    pub directions_path: PathBuf,
    pub topic: String,
    pub connect: Option<String>,
    pub geometry: DriveGeometry,
    pub presets: SpeedPresets,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            port: MOTOR_PORT.to_string(),
            baudrate: MOTOR_BAUDRATE,
            directions_path: PathBuf::from(DIRECTIONS_PATH),
            topic: TOPIC_DRIVE.to_string(),
            connect: None,
            geometry: DriveGeometry::default(),
            presets: SpeedPresets::default(),
        }
    }
}
