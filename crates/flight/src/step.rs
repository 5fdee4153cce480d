use std::time::Duration;

use dm_types::{DrivetrainMode, YawMode};

use crate::{config::secs, FlightPlanConfig, FlightState};

/// Altitude held by a velocity command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Altitude {
    /// Whatever the last [`FlightStep::CaptureAltitude`] recorded.
    Captured,
    /// A fixed NED `z`.
    Fixed(f32),
}

/// One vehicle command of the flight.
#[derive(Debug, Clone, PartialEq)]
pub enum FlightStep {
    EnableControl,
    DisableControl,
    Arm,
    Disarm,
    Takeoff {
        timeout: Duration,
    },
    Hover,
    RotateYaw {
        angle: f32,
        timeout: Duration,
    },
    MoveVelocityZ {
        vx: f32,
        vy: f32,
        z: Altitude,
        duration: Duration,
        drivetrain: DrivetrainMode,
        yaw_mode: YawMode,
    },
    Land {
        timeout: Duration,
    },
    /// Reads the current position and freezes its `z` for later legs.
    CaptureAltitude,
    Reset,
}

/// A step together with the phase it belongs to and how long to wait after
/// it returns.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub step: FlightStep,
    pub state: FlightState,
    pub settle: Duration,
}

impl PlannedStep {
    pub fn new(state: FlightState, step: FlightStep) -> Self {
        Self {
            step,
            state,
            settle: Duration::ZERO,
        }
    }

    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

/// The survey flight described by `config`.
pub fn survey_steps(config: &FlightPlanConfig) -> Vec<PlannedStep> {
    use FlightState::*;

    let speed = config.leg_speed;
    let duration = config.leg_duration();

    let leg = |state, vx, vy| {
        PlannedStep::new(
            state,
            FlightStep::MoveVelocityZ {
                vx,
                vy,
                z: Altitude::Captured,
                duration,
                drivetrain: config.drivetrain,
                yaw_mode: config.yaw_mode,
            },
        )
        .settle(duration)
    };

    vec![
        PlannedStep::new(Connecting, FlightStep::EnableControl),
        PlannedStep::new(Connecting, FlightStep::Arm),
        PlannedStep::new(
            TakingOff,
            FlightStep::Takeoff {
                timeout: secs(config.takeoff_timeout),
            },
        )
        .settle(secs(config.takeoff_settle)),
        PlannedStep::new(Hovering, FlightStep::Hover),
        PlannedStep::new(
            RotatingYaw,
            FlightStep::RotateYaw {
                angle: config.yaw_angle,
                timeout: secs(config.yaw_timeout),
            },
        )
        .settle(secs(config.yaw_timeout)),
        // control is requested again before the velocity legs
        PlannedStep::new(RotatingYaw, FlightStep::EnableControl),
        PlannedStep::new(RotatingYaw, FlightStep::CaptureAltitude),
        leg(LegForward, speed, 0.0),
        leg(LegRight, 0.0, speed),
        leg(LegBack, -speed, 0.0),
        leg(LegLeft, 0.0, -speed),
        PlannedStep::new(HoveringFinal, FlightStep::Hover),
        PlannedStep::new(
            Landing,
            FlightStep::Land {
                timeout: secs(config.land_timeout),
            },
        )
        .settle(secs(config.land_settle)),
        PlannedStep::new(Disarming, FlightStep::Disarm),
        PlannedStep::new(Disarming, FlightStep::Reset),
        PlannedStep::new(Disarming, FlightStep::DisableControl),
    ]
}
