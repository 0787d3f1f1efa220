// Message types for the runtime

use serde::{Deserialize, Deserializer, Serialize};

/// Structured drive command from the vision pipeline or scripts
/// e.g. `{"linear_velocity": 0.2, "angular_velocity": 0.0}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveCommand {
    pub linear_velocity: f32,  // m/s
    pub angular_velocity: f32, // rad/s

    /// How long to apply the command before stopping, in centiseconds.
    /// Absent means "until the next command". Values that are not a
    /// usable count (negative, non-numeric, out of range) are ignored.
    #[serde(
        default,
        rename = "duration",
        deserialize_with = "lenient_centiseconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_cs: Option<u32>,
}

fn lenient_centiseconds<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_f64())
        .filter(|cs| cs.is_finite() && *cs >= 0.0 && *cs <= f64::from(u32::MAX))
        .map(|cs| cs.round() as u32))
}

impl DriveCommand {
    pub fn new(linear_velocity: f32, angular_velocity: f32) -> Self {
        Self {
            linear_velocity,
            angular_velocity,
            duration_cs: None,
        }
    }
}

/// Ground speed of each wheel in m/s
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelSpeedPair {
    pub left: f32,
    pub right: f32,
}

impl WheelSpeedPair {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}
