use std::time::Duration;

use dm_async_util::sleep_or_cancel;
use dm_types::VelocityZ;
use dm_vehicle::{VehicleError, VehicleLink};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::{survey_steps, Altitude, FlightPlanConfig, FlightState, FlightStep, PlannedStep};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AbortReason {
    #[error(transparent)]
    Vehicle(#[from] VehicleError),

    #[error("flight was cancelled")]
    Cancelled,

    #[error("velocity leg flown before any altitude was captured")]
    NoCapturedAltitude,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlightOutcome {
    Terminal,
    Aborted {
        /// Phase the flight was in when it gave up.
        state: FlightState,
        reason: AbortReason,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlightReport {
    pub outcome: FlightOutcome,
    /// Every phase entered, in order, ending in `Terminal` or `Aborted`.
    pub visited: Vec<FlightState>,
}

impl FlightReport {
    pub fn completed(&self) -> bool {
        self.outcome == FlightOutcome::Terminal
    }
}

/// How far the flight got, which decides what the safety sequence has to
/// undo.
#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    control_requested: bool,
    takeoff_attempted: bool,
    landed: bool,
}

pub struct FlightPlan {
    link: VehicleLink,
    steps: Vec<PlannedStep>,
    land_timeout: Duration,
}

impl FlightPlan {
    pub fn new(config: &FlightPlanConfig, link: VehicleLink) -> Self {
        Self {
            link,
            steps: survey_steps(config),
            land_timeout: crate::config::secs(config.land_timeout),
        }
    }

    /// A plan running `steps` instead of the survey flight. `land_timeout`
    /// bounds the landing of the safety sequence.
    pub fn with_steps(link: VehicleLink, steps: Vec<PlannedStep>, land_timeout: Duration) -> Self {
        Self {
            link,
            steps,
            land_timeout,
        }
    }

    /// Flies every step in order. Stops at the first error or at
    /// cancellation, then runs the safety sequence before returning.
    pub async fn run(self, cancel: CancellationToken) -> FlightReport {
        let mut visited = vec![FlightState::Idle];
        let mut progress = Progress::default();
        let mut altitude = None;
        let mut state = FlightState::Idle;

        for planned in &self.steps {
            if planned.state != state {
                info!("flight: {state} -> {}", planned.state);
                state = planned.state;
                visited.push(state);
            }

            if cancel.is_cancelled() {
                return self.abort(state, AbortReason::Cancelled, progress, visited).await;
            }

            if let Err(reason) = self
                .execute(&planned.step, &mut progress, &mut altitude)
                .await
            {
                return self.abort(state, reason, progress, visited).await;
            }

            if !planned.settle.is_zero()
                && sleep_or_cancel(planned.settle, &cancel).await.is_err()
            {
                return self.abort(state, AbortReason::Cancelled, progress, visited).await;
            }
        }

        info!("flight: {state} -> {}", FlightState::Terminal);
        visited.push(FlightState::Terminal);

        FlightReport {
            outcome: FlightOutcome::Terminal,
            visited,
        }
    }

    async fn execute(
        &self,
        step: &FlightStep,
        progress: &mut Progress,
        altitude: &mut Option<f32>,
    ) -> Result<(), AbortReason> {
        debug!("flight step {step:?}");
        let link = &self.link;

        match step {
            FlightStep::EnableControl => {
                progress.control_requested = true;
                link.enable_api_control(true).await?;
            }
            FlightStep::DisableControl => link.enable_api_control(false).await?,
            FlightStep::Arm => {
                progress.control_requested = true;
                link.arm_disarm(true).await?;
            }
            FlightStep::Disarm => link.arm_disarm(false).await?,
            FlightStep::Takeoff { timeout } => {
                progress.takeoff_attempted = true;
                link.takeoff(*timeout).await?;
            }
            FlightStep::Hover => link.hover().await?,
            FlightStep::RotateYaw { angle, timeout } => {
                link.rotate_to_yaw(*angle, *timeout).await?
            }
            FlightStep::MoveVelocityZ {
                vx,
                vy,
                z,
                duration,
                drivetrain,
                yaw_mode,
            } => {
                let z = match z {
                    Altitude::Fixed(z) => *z,
                    Altitude::Captured => altitude.ok_or(AbortReason::NoCapturedAltitude)?,
                };

                link.move_by_velocity_z(VelocityZ {
                    vx: *vx,
                    vy: *vy,
                    z,
                    duration: *duration,
                    drivetrain: *drivetrain,
                    yaw_mode: *yaw_mode,
                })
                .await?;
            }
            FlightStep::Land { timeout } => {
                link.land(*timeout).await?;
                progress.landed = true;
            }
            FlightStep::CaptureAltitude => {
                let position = link.get_position().await?;
                debug!("holding altitude z = {}", position.z);
                *altitude = Some(position.z);
            }
            FlightStep::Reset => link.reset().await?,
        }

        Ok(())
    }

    async fn abort(
        &self,
        state: FlightState,
        reason: AbortReason,
        progress: Progress,
        mut visited: Vec<FlightState>,
    ) -> FlightReport {
        error!("flight aborted while {state}: {reason}");
        visited.push(FlightState::Aborted);

        self.safety_sequence(progress).await;

        FlightReport {
            outcome: FlightOutcome::Aborted { state, reason },
            visited,
        }
    }

    /// Best effort: every command is attempted even if the ones before it
    /// failed, and failures are only logged.
    async fn safety_sequence(&self, progress: Progress) {
        let link = &self.link;
        let airborne = progress.takeoff_attempted && !progress.landed;

        if airborne {
            log_failure("hover", link.hover().await);
            log_failure("land", link.land(self.land_timeout).await);
        }

        if progress.control_requested {
            log_failure("disarm", link.arm_disarm(false).await);
            log_failure("reset", link.reset().await);
            log_failure("disable control", link.enable_api_control(false).await);
        }

        info!("safety sequence finished");
    }
}

fn log_failure(what: &str, result: Result<(), VehicleError>) {
    if let Err(err) = result {
        warn!("safety {what} failed: {err}");
    }
}
