use std::time::Duration;

use async_trait::async_trait;
use dm_client::{ChannelCommandSink, ChannelCommandSource, Task};
use tokio::{select, sync::watch};
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::{
    interface::{create_interface, VehicleInterface},
    LinkState, VehicleConfig, VehicleError, VehicleLink, VehicleRequest, VehicleResponse,
};

pub struct VehicleTask {
    interface: Box<dyn VehicleInterface>,
    rpc_timeout: Duration,
    cmd_tx: ChannelCommandSink<VehicleRequest, VehicleResponse, VehicleError>,
    cmd_rx: ChannelCommandSource<VehicleRequest, VehicleResponse, VehicleError>,
    state_tx: watch::Sender<LinkState>,
}

pub fn create_task(config: &VehicleConfig) -> anyhow::Result<VehicleTask> {
    Ok(VehicleTask::new(
        create_interface(config),
        config.rpc_timeout(),
    ))
}

impl VehicleTask {
    /// `rpc_timeout` is the grace a request gets on top of its own timeout
    /// before it is abandoned.
    pub fn new(interface: Box<dyn VehicleInterface>, rpc_timeout: Duration) -> Self {
        let (cmd_tx, cmd_rx) = flume::bounded(256);
        let (state_tx, _) = watch::channel(LinkState::Disconnected);

        Self {
            interface,
            rpc_timeout,
            cmd_tx,
            cmd_rx,
            state_tx,
        }
    }

    pub fn link(&self) -> VehicleLink {
        VehicleLink::new(self.cmd_tx.clone(), self.state_tx.subscribe())
    }
}

#[async_trait]
impl Task for VehicleTask {
    fn name(&self) -> &'static str {
        "vehicle"
    }

    async fn run(self: Box<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        let Self {
            mut interface,
            rpc_timeout,
            cmd_rx,
            state_tx,
            ..
        } = *self;

        let loop_fut = async {
            while let Ok((req, ret_tx)) = cmd_rx.recv_async().await {
                let state = *state_tx.borrow();
                let op = req.name();

                let result = match state.check(&req) {
                    Ok(()) => {
                        let guard = rpc_timeout + req.timeout();
                        trace!("executing {op} in state {state}");

                        match tokio::time::timeout(guard, execute(&mut *interface, req.clone()))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => {
                                interface.abandon();
                                Err(VehicleError::CommandTimeout { op, timeout: guard })
                            }
                        }
                    }
                    Err(err) => Err(err),
                };

                let next = match &result {
                    Ok(_) => state.after(&req),
                    Err(err) => {
                        warn!("{op} failed: {err}");
                        state.after_error(err)
                    }
                };

                if next != state {
                    debug!("vehicle link {state} -> {next}");
                    state_tx.send_replace(next);
                }

                // the caller may have given up waiting
                let _ = ret_tx.send(result);
            }

            Ok::<_, anyhow::Error>(())
        };

        select! {
          _ = cancel.cancelled() => {}
          res = loop_fut => { res? }
        }

        Ok(())
    }
}

async fn execute(
    interface: &mut dyn VehicleInterface,
    req: VehicleRequest,
) -> Result<VehicleResponse, VehicleError> {
    let unit = |result: Result<(), VehicleError>| result.map(|_| VehicleResponse::Unit);

    match req {
        VehicleRequest::Connect => unit(interface.connect().await),
        VehicleRequest::ConfirmConnection => unit(interface.confirm_connection().await),
        VehicleRequest::EnableApiControl(enabled) => {
            unit(interface.enable_api_control(enabled).await)
        }
        VehicleRequest::ArmDisarm(arm) => unit(interface.arm_disarm(arm).await),
        VehicleRequest::Takeoff { timeout } => unit(interface.takeoff(timeout).await),
        VehicleRequest::Land { timeout } => unit(interface.land(timeout).await),
        VehicleRequest::Hover => unit(interface.hover().await),
        VehicleRequest::RotateToYaw { angle, timeout } => {
            unit(interface.rotate_to_yaw(angle, timeout).await)
        }
        VehicleRequest::MoveByVelocityZ(command) => {
            unit(interface.move_by_velocity_z(command).await)
        }
        VehicleRequest::GetPosition => interface
            .get_position()
            .await
            .map(VehicleResponse::Position),
        VehicleRequest::SimGetImages(requests) => interface
            .sim_get_images(requests)
            .await
            .map(VehicleResponse::Images),
        VehicleRequest::Reset => unit(interface.reset().await),
    }
}

#[cfg(test)]
mod tests {
    use dm_types::{ImageRequest, ImageType};

    use super::*;
    use crate::testing::{Failure, ScriptedVehicleInterface};

    fn spawn(interface: ScriptedVehicleInterface) -> (VehicleLink, CancellationToken) {
        let task = VehicleTask::new(Box::new(interface), Duration::from_secs(10));
        let link = task.link();
        let cancel = CancellationToken::new();

        tokio::spawn(Box::new(task).run(cancel.clone()));

        (link, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn fails_fast_while_disconnected() {
        let interface = ScriptedVehicleInterface::new();
        let journal = interface.journal();
        let (link, _cancel) = spawn(interface);

        assert!(matches!(
            link.takeoff(Duration::from_secs(1)).await,
            Err(VehicleError::Connection { .. })
        ));
        assert!(matches!(
            link.sim_get_images(vec![]).await,
            Err(VehicleError::Connection { .. })
        ));

        assert!(journal.calls().is_empty());
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn tracks_link_state() {
        let (link, _cancel) = spawn(ScriptedVehicleInterface::new());

        link.connect().await.unwrap();
        assert_eq!(link.state(), LinkState::Connected);

        link.enable_api_control(true).await.unwrap();
        link.arm_disarm(true).await.unwrap();
        assert_eq!(link.state(), LinkState::Armed);

        link.reset().await.unwrap();
        assert_eq!(link.state(), LinkState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_failure_disconnects() {
        let interface = ScriptedVehicleInterface::new().fail("hover", Failure::Connection);
        let journal = interface.journal();
        let (link, _cancel) = spawn(interface);

        link.connect().await.unwrap();
        assert!(link.hover().await.is_err());
        assert_eq!(link.state(), LinkState::Disconnected);

        // nothing but connect reaches the vehicle afterwards
        assert!(link.hover().await.is_err());
        assert_eq!(journal.calls(), vec!["connect", "hover"]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_serialized() {
        let interface =
            ScriptedVehicleInterface::new().with_image_delay(Duration::from_secs(2));
        let journal = interface.journal();
        let (link, _cancel) = spawn(interface);

        link.connect().await.unwrap();

        let images = {
            let link = link.clone();
            tokio::spawn(async move {
                link.sim_get_images(vec![ImageRequest::float("1", ImageType::DepthVis)])
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        link.hover().await.unwrap();

        // hover was queued behind the slow image query
        assert_eq!(images.await.unwrap().unwrap().len(), 1);
        assert_eq!(journal.calls(), vec!["connect", "sim_get_images", "hover"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_request_is_abandoned() {
        let interface =
            ScriptedVehicleInterface::new().with_image_delay(Duration::from_secs(60));
        let journal = interface.journal();
        let task = VehicleTask::new(Box::new(interface), Duration::from_secs(5));
        let link = task.link();
        tokio::spawn(Box::new(task).run(CancellationToken::new()));

        link.connect().await.unwrap();

        assert_eq!(
            link.sim_get_images(vec![]).await,
            Err(VehicleError::CommandTimeout {
                op: "sim_get_images",
                timeout: Duration::from_secs(5),
            })
        );
        assert_eq!(link.state(), LinkState::Connected);

        // the transport is told to throw away the half-finished exchange
        assert_eq!(journal.calls(), vec!["connect", "sim_get_images", "abandon"]);
    }

    #[tokio::test]
    async fn stopped_task_reports_disconnected() {
        let (link, cancel) = spawn(ScriptedVehicleInterface::new());
        cancel.cancel();

        // the receiver is dropped once the task winds down
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(link.connect().await, Err(VehicleError::Disconnected));
    }
}
