use std::fmt;

use anyhow::Context;
use dm_async_util::retry_async;
use dm_capture::{CaptureConfig, CaptureEvent, CaptureTask};
use dm_client::Task;
use dm_flight::{FlightOutcome, FlightPlan};
use dm_vehicle::{VehicleConfig, VehicleError, VehicleInterface, VehicleLink, VehicleTask};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::MissionConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissionState {
    Idle,
    Running,
    Completed,
    Failed(String),
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissionState::Idle => f.write_str("idle"),
            MissionState::Running => f.write_str("running"),
            MissionState::Completed => f.write_str("completed"),
            MissionState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTally {
    pub persisted: usize,
    pub missed: usize,
    pub dropped: usize,
}

/// Runs one survey: connects to the vehicle, captures depth frames while the
/// flight plan runs, then shuts everything down in order.
pub struct MissionRunner {
    config: MissionConfig,
    interface: Option<Box<dyn VehicleInterface>>,
    state_tx: watch::Sender<MissionState>,
}

impl MissionRunner {
    pub fn new(config: MissionConfig) -> Self {
        let (state_tx, _) = watch::channel(MissionState::Idle);

        Self {
            config,
            interface: None,
            state_tx,
        }
    }

    /// Flies `interface` instead of the vehicle named in the config.
    pub fn with_interface(config: MissionConfig, interface: Box<dyn VehicleInterface>) -> Self {
        Self {
            interface: Some(interface),
            ..Self::new(config)
        }
    }

    pub fn state(&self) -> watch::Receiver<MissionState> {
        self.state_tx.subscribe()
    }

    /// Returns the final state once every task has stopped. An aborted flight
    /// is a `Failed` state, not an error; errors are reserved for missions
    /// that never got off the ground.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<MissionState> {
        let Self {
            config,
            interface,
            state_tx,
        } = self;
        let MissionConfig {
            vehicle: vehicle_config,
            capture: capture_config,
            flight: flight_config,
        } = config;

        state_tx.send_replace(MissionState::Running);

        let (vehicle, capture, preview) =
            match create_tasks(interface, &vehicle_config, capture_config) {
                Ok(tasks) => tasks,
                Err(err) => {
                    error!("{err:#}");
                    state_tx.send_replace(MissionState::Failed(format!("{err:#}")));
                    return Err(err);
                }
            };
        let link = vehicle.link();

        info!("saving frames to {}", capture.save_dir().display());

        // the vehicle outlives the flight plan, so it does not follow the
        // mission token
        let vehicle_cancel = CancellationToken::new();
        debug!("starting {} task", vehicle.name());
        let vehicle_handle = tokio::spawn(Box::new(vehicle).run(vehicle_cancel.clone()));

        if let Err(err) = connect(&link, &vehicle_config).await {
            error!("could not connect to vehicle: {err}");
            vehicle_cancel.cancel();
            let _ = vehicle_handle.await;

            state_tx.send_replace(MissionState::Failed(err.to_string()));
            return Err(err).context("could not connect to vehicle");
        }
        info!("connected to vehicle");

        let tally = tokio::spawn(tally_events(capture.events()));

        let capture_cancel = CancellationToken::new();
        debug!("starting {} task", capture.name());
        let capture_handle = tokio::spawn(Box::new(capture).run(capture_cancel.clone()));

        let preview_handle = preview.map(|preview| {
            debug!("starting {} task", preview.name());
            tokio::spawn(preview.run(capture_cancel.clone()))
        });

        let report = FlightPlan::new(&flight_config, link).run(cancel).await;
        debug!("flight visited {:?}", report.visited);

        capture_cancel.cancel();
        let capture_result = join("capture", capture_handle).await;

        if let Some(handle) = preview_handle {
            if let Err(err) = join("preview", handle).await {
                warn!("{err:#}");
            }
        }

        match tally.await {
            Ok(tally) => info!(
                "captured {} frames ({} missed, {} dropped)",
                tally.persisted, tally.missed, tally.dropped
            ),
            Err(err) => warn!("lost capture statistics: {err}"),
        }

        vehicle_cancel.cancel();
        if let Err(err) = join("vehicle", vehicle_handle).await {
            warn!("{err:#}");
        }

        let state = match (report.outcome, capture_result) {
            (FlightOutcome::Aborted { state, reason }, _) => {
                MissionState::Failed(format!("flight aborted while {state}: {reason}"))
            }
            (FlightOutcome::Terminal, Err(err)) => MissionState::Failed(format!("{err:#}")),
            (FlightOutcome::Terminal, Ok(())) => MissionState::Completed,
        };

        info!("mission {state}");
        state_tx.send_replace(state.clone());

        Ok(state)
    }
}

fn create_tasks(
    interface: Option<Box<dyn VehicleInterface>>,
    vehicle_config: &VehicleConfig,
    capture_config: CaptureConfig,
) -> anyhow::Result<(VehicleTask, CaptureTask, Option<Box<dyn Task>>)> {
    let vehicle = match interface {
        Some(interface) => VehicleTask::new(interface, vehicle_config.rpc_timeout()),
        None => dm_vehicle::create_task(vehicle_config)
            .context("failed to initialize vehicle task")?,
    };

    debug!("initializing capture tasks");
    let (capture, preview) = dm_capture::create_tasks(capture_config, vehicle.link())
        .context("failed to initialize capture tasks")?;

    Ok((vehicle, capture, preview))
}

async fn connect(link: &VehicleLink, config: &VehicleConfig) -> Result<(), VehicleError> {
    retry_async(
        config.connect_attempts,
        Some(config.connect_spacing()),
        move || async move {
            link.connect().await?;
            link.confirm_connection().await
        },
    )
    .await
}

async fn join(
    name: &str,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
) -> anyhow::Result<()> {
    match handle.await {
        Ok(Ok(())) => {
            debug!("exited {name} task");
            Ok(())
        }
        Ok(Err(err)) => Err(err).with_context(|| format!("{name} task terminated with error")),
        Err(err) => Err(err).with_context(|| format!("{name} task failed")),
    }
}

async fn tally_events(events: flume::Receiver<CaptureEvent>) -> CaptureTally {
    let mut tally = CaptureTally::default();

    while let Ok(event) = events.recv_async().await {
        match event {
            CaptureEvent::Persisted { .. } => tally.persisted += 1,
            CaptureEvent::Missed { .. } => tally.missed += 1,
            CaptureEvent::Dropped { .. } => tally.dropped += 1,
        }
    }

    tally
}
