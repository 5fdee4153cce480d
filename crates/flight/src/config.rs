use std::time::Duration;

use dm_types::{DrivetrainMode, YawMode};
use serde::Deserialize;

/// Shape of the survey flight. Times are in seconds, distances in meters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FlightPlanConfig {
    pub takeoff_timeout: f64,
    pub takeoff_settle: f64,

    /// Clockwise, in degrees.
    pub yaw_angle: f32,
    pub yaw_timeout: f64,

    /// Side length of the square flown after the turn.
    pub leg_size: f32,
    pub leg_speed: f32,
    pub drivetrain: DrivetrainMode,
    pub yaw_mode: YawMode,

    pub land_timeout: f64,
    pub land_settle: f64,
}

impl Default for FlightPlanConfig {
    fn default() -> Self {
        Self {
            takeoff_timeout: 1.0,
            takeoff_settle: 1.0,
            yaw_angle: 90.0,
            yaw_timeout: 3.0,
            leg_size: 10.0,
            leg_speed: 3.0,
            drivetrain: DrivetrainMode::ForwardOnly,
            yaw_mode: YawMode::default(),
            land_timeout: 60.0,
            land_settle: 3.0,
        }
    }
}

impl FlightPlanConfig {
    /// How long one side of the square takes at `leg_speed`.
    pub fn leg_duration(&self) -> Duration {
        if self.leg_speed > 0.0 {
            secs(f64::from(self.leg_size / self.leg_speed))
        } else {
            Duration::ZERO
        }
    }
}

pub(crate) fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}
