use std::time::Duration;

use dm_flight::{
    AbortReason, Altitude, FlightOutcome, FlightPlan, FlightPlanConfig, FlightState, FlightStep,
    PlannedStep,
};
use dm_types::{DrivetrainMode, YawMode};
use dm_client::Task;
use dm_vehicle::{
    testing::{Failure, Journal, ScriptedVehicleInterface},
    VehicleError, VehicleLink, VehicleTask,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

async fn connected(interface: ScriptedVehicleInterface) -> (VehicleLink, Journal) {
    let journal = interface.journal();
    let task = VehicleTask::new(Box::new(interface), Duration::from_secs(10));
    let link = task.link();
    tokio::spawn(Box::new(task).run(CancellationToken::new()));

    link.connect().await.unwrap();
    (link, journal)
}

fn position_of(calls: &[String], call: &str) -> usize {
    calls
        .iter()
        .position(|c| c == call)
        .unwrap_or_else(|| panic!("{call} never happened: {calls:?}"))
}

#[tokio::test(start_paused = true)]
async fn survey_runs_every_step_in_order() {
    let (link, journal) = connected(ScriptedVehicleInterface::new()).await;
    let start = Instant::now();

    let report = FlightPlan::new(&FlightPlanConfig::default(), link)
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.outcome, FlightOutcome::Terminal);
    assert!(report.completed());
    assert_eq!(
        report.visited,
        vec![
            FlightState::Idle,
            FlightState::Connecting,
            FlightState::TakingOff,
            FlightState::Hovering,
            FlightState::RotatingYaw,
            FlightState::LegForward,
            FlightState::LegRight,
            FlightState::LegBack,
            FlightState::LegLeft,
            FlightState::HoveringFinal,
            FlightState::Landing,
            FlightState::Disarming,
            FlightState::Terminal,
        ]
    );

    assert_eq!(
        journal.calls(),
        vec![
            "connect",
            "enable_api_control(true)",
            "arm_disarm(true)",
            "takeoff",
            "hover",
            "rotate_to_yaw",
            "enable_api_control(true)",
            "get_position",
            "move_by_velocity_z",
            "move_by_velocity_z",
            "move_by_velocity_z",
            "move_by_velocity_z",
            "hover",
            "land",
            "arm_disarm(false)",
            "reset",
            "enable_api_control(false)",
        ]
    );

    // takeoff, yaw and landing settles plus four legs of 10 m at 3 m/s
    let expected = Duration::from_secs_f64(1.0 + 3.0 + 4.0 * 10.0 / 3.0 + 3.0);
    assert!(start.elapsed() >= expected - Duration::from_millis(1));
}

#[tokio::test(start_paused = true)]
async fn failed_takeoff_lands_and_disarms() {
    let interface = ScriptedVehicleInterface::new().fail("takeoff", Failure::Timeout);
    let (link, journal) = connected(interface).await;

    let report = FlightPlan::new(&FlightPlanConfig::default(), link)
        .run(CancellationToken::new())
        .await;

    assert_eq!(
        report.outcome,
        FlightOutcome::Aborted {
            state: FlightState::TakingOff,
            reason: AbortReason::Vehicle(VehicleError::CommandTimeout {
                op: "takeoff",
                timeout: Duration::from_secs(1),
            }),
        }
    );
    assert_eq!(report.visited.last(), Some(&FlightState::Aborted));

    let calls = journal.calls();
    assert_eq!(journal.count("rotate_to_yaw"), 0);

    let disarm = position_of(&calls, "arm_disarm(false)");
    let reset = position_of(&calls, "reset");
    let release = position_of(&calls, "enable_api_control(false)");
    assert!(position_of(&calls, "takeoff") < position_of(&calls, "land"));
    assert!(disarm < reset && reset < release);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_leg_runs_the_safety_sequence() {
    let (link, journal) = connected(ScriptedVehicleInterface::new()).await;
    let cancel = CancellationToken::new();

    // the first leg starts 4 s in and lasts about 3.3 s
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let report = FlightPlan::new(&FlightPlanConfig::default(), link)
        .run(cancel)
        .await;

    assert_eq!(
        report.outcome,
        FlightOutcome::Aborted {
            state: FlightState::LegForward,
            reason: AbortReason::Cancelled,
        }
    );

    assert_eq!(journal.count("move_by_velocity_z"), 1);
    assert_eq!(
        &journal.calls()[journal.calls().len() - 5..],
        &["hover", "land", "arm_disarm(false)", "reset", "enable_api_control(false)"]
    );
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_touches_nothing() {
    let (link, journal) = connected(ScriptedVehicleInterface::new()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = FlightPlan::new(&FlightPlanConfig::default(), link)
        .run(cancel)
        .await;

    assert_eq!(
        report.visited,
        vec![FlightState::Idle, FlightState::Connecting, FlightState::Aborted]
    );
    assert_eq!(journal.calls(), vec!["connect"]);
}

#[tokio::test(start_paused = true)]
async fn safety_sequence_keeps_going_past_failures() {
    let interface = ScriptedVehicleInterface::new()
        .fail("takeoff", Failure::Rejected)
        .fail("land", Failure::Rejected)
        .fail("arm_disarm", Failure::Rejected);
    let (link, journal) = connected(interface).await;

    let report = FlightPlan::new(&FlightPlanConfig::default(), link)
        .run(CancellationToken::new())
        .await;

    // arming already fails, so takeoff is never attempted
    assert!(matches!(
        report.outcome,
        FlightOutcome::Aborted {
            state: FlightState::Connecting,
            reason: AbortReason::Vehicle(VehicleError::Rejected { op: "arm_disarm", .. }),
        }
    ));
    assert_eq!(
        journal.calls(),
        vec![
            "connect",
            "enable_api_control(true)",
            "arm_disarm(true)",
            "arm_disarm(false)",
            "reset",
            "enable_api_control(false)",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn legs_need_a_captured_altitude() {
    let (link, journal) = connected(ScriptedVehicleInterface::new()).await;

    let leg = |z| {
        PlannedStep::new(
            FlightState::LegForward,
            FlightStep::MoveVelocityZ {
                vx: 1.0,
                vy: 0.0,
                z,
                duration: Duration::from_secs(1),
                drivetrain: DrivetrainMode::MaxDegreeOfFreedom,
                yaw_mode: YawMode::default(),
            },
        )
    };

    let fixed = FlightPlan::with_steps(
        link.clone(),
        vec![leg(Altitude::Fixed(-5.0))],
        Duration::from_secs(10),
    )
    .run(CancellationToken::new())
    .await;
    assert!(fixed.completed());

    let captured = FlightPlan::with_steps(link, vec![leg(Altitude::Captured)], Duration::from_secs(10))
        .run(CancellationToken::new())
        .await;
    assert_eq!(
        captured.outcome,
        FlightOutcome::Aborted {
            state: FlightState::LegForward,
            reason: AbortReason::NoCapturedAltitude,
        }
    );

    assert_eq!(journal.calls(), vec!["connect", "move_by_velocity_z"]);
}
