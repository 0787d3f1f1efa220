// Differential-drive kinematics for a two-wheeled base
// Converts body-frame velocities (linear, angular) to per-wheel ground speeds,
// and ground speeds to the controller's native unit (revolutions per second).

use std::f32::consts::PI;

use crate::config::{WHEEL_BASE, WHEEL_DIAMETER};
use crate::messages::WheelSpeedPair;

/// Fixed physical dimensions of the base (meters)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveGeometry {
    pub wheel_base: f32,
    pub wheel_diameter: f32,
}

impl Default for DriveGeometry {
    fn default() -> Self {
        Self {
            wheel_base: WHEEL_BASE,
            wheel_diameter: WHEEL_DIAMETER,
        }
    }
}

impl DriveGeometry {
    /// Convert body velocities to wheel ground speeds
    ///
    /// # Arguments
    /// * `linear` - Forward velocity in m/s (positive = forward)
    /// * `angular` - Rotational velocity in rad/s (positive = counter-clockwise)
    pub fn wheel_speeds(&self, linear: f32, angular: f32) -> WheelSpeedPair {
        let half_base = self.wheel_base / 2.0;
        WheelSpeedPair {
            left: linear - half_base * angular,
            right: linear + half_base * angular,
        }
    }

    /// Inverse of `wheel_speeds`: recover (linear, angular)
    pub fn body_velocity(&self, wheels: WheelSpeedPair) -> (f32, f32) {
        let linear = (wheels.left + wheels.right) / 2.0;
        let angular = (wheels.right - wheels.left) / self.wheel_base;
        (linear, angular)
    }
}

/// Ground speed (m/s) to wheel revolutions per second
pub fn mps_to_rps(mps: f32, wheel_diameter: f32) -> f32 {
    mps / (wheel_diameter * PI)
}

/// Wheel revolutions per second to ground speed (m/s)
pub fn rps_to_mps(rps: f32, wheel_diameter: f32) -> f32 {
    rps * wheel_diameter * PI
}

pub fn rpm_to_rps(rpm: f32) -> f32 {
    rpm / 60.0
}

pub fn rps_to_rpm(rps: f32) -> f32 {
    rps * 60.0
}
