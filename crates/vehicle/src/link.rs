use std::time::Duration;

use dm_client::{ChannelCommandSink, CommandSink};
use dm_types::{ImageRequest, ImageResponse, Position, VelocityZ};
use tokio::sync::watch;

use crate::{LinkState, VehicleError, VehicleRequest, VehicleResponse};

/// Cloneable handle to the vehicle owned by a [`crate::VehicleTask`]. Each
/// call waits for its own reply; calls from different clones are serialized
/// by the task.
#[derive(Clone, Debug)]
pub struct VehicleLink {
    cmd_tx: ChannelCommandSink<VehicleRequest, VehicleResponse, VehicleError>,
    state_rx: watch::Receiver<LinkState>,
}

impl VehicleLink {
    pub(crate) fn new(
        cmd_tx: ChannelCommandSink<VehicleRequest, VehicleResponse, VehicleError>,
        state_rx: watch::Receiver<LinkState>,
    ) -> Self {
        Self { cmd_tx, state_rx }
    }

    /// Last state published by the owning task.
    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    async fn unit(&self, request: VehicleRequest) -> Result<(), VehicleError> {
        let op = request.name();

        match self.cmd_tx.command(request).await? {
            VehicleResponse::Unit => Ok(()),
            other => Err(unexpected(op, &other)),
        }
    }

    pub async fn connect(&self) -> Result<(), VehicleError> {
        self.unit(VehicleRequest::Connect).await
    }

    pub async fn confirm_connection(&self) -> Result<(), VehicleError> {
        self.unit(VehicleRequest::ConfirmConnection).await
    }

    pub async fn enable_api_control(&self, enabled: bool) -> Result<(), VehicleError> {
        self.unit(VehicleRequest::EnableApiControl(enabled)).await
    }

    pub async fn arm_disarm(&self, arm: bool) -> Result<(), VehicleError> {
        self.unit(VehicleRequest::ArmDisarm(arm)).await
    }

    pub async fn takeoff(&self, timeout: Duration) -> Result<(), VehicleError> {
        self.unit(VehicleRequest::Takeoff { timeout }).await
    }

    pub async fn land(&self, timeout: Duration) -> Result<(), VehicleError> {
        self.unit(VehicleRequest::Land { timeout }).await
    }

    pub async fn hover(&self) -> Result<(), VehicleError> {
        self.unit(VehicleRequest::Hover).await
    }

    pub async fn rotate_to_yaw(&self, angle: f32, timeout: Duration) -> Result<(), VehicleError> {
        self.unit(VehicleRequest::RotateToYaw { angle, timeout }).await
    }

    pub async fn move_by_velocity_z(&self, command: VelocityZ) -> Result<(), VehicleError> {
        self.unit(VehicleRequest::MoveByVelocityZ(command)).await
    }

    pub async fn reset(&self) -> Result<(), VehicleError> {
        self.unit(VehicleRequest::Reset).await
    }

    pub async fn get_position(&self) -> Result<Position, VehicleError> {
        match self.cmd_tx.command(VehicleRequest::GetPosition).await? {
            VehicleResponse::Position(position) => Ok(position),
            other => Err(unexpected("get_position", &other)),
        }
    }

    pub async fn sim_get_images(
        &self,
        requests: Vec<ImageRequest>,
    ) -> Result<Vec<ImageResponse>, VehicleError> {
        match self.cmd_tx.command(VehicleRequest::SimGetImages(requests)).await? {
            VehicleResponse::Images(images) => Ok(images),
            other => Err(unexpected("sim_get_images", &other)),
        }
    }

    /// Queries images and returns the first float image among the responses.
    /// An empty or byte-only answer is reported as
    /// [`VehicleError::ImageUnavailable`] for the first requested camera.
    pub async fn capture_depth(
        &self,
        requests: Vec<ImageRequest>,
    ) -> Result<ImageResponse, VehicleError> {
        let camera = requests
            .first()
            .map(|request| request.camera_name.clone())
            .unwrap_or_default();

        self.sim_get_images(requests)
            .await?
            .into_iter()
            .find(|image| image.pixels_as_float && !image.image_data_float.is_empty())
            .ok_or(VehicleError::ImageUnavailable { camera })
    }
}

fn unexpected(op: &'static str, response: &VehicleResponse) -> VehicleError {
    VehicleError::protocol(op, format!("unexpected response {response:?}"))
}
