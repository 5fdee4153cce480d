use std::time::Duration;

use async_trait::async_trait;
use dm_types::{ImageRequest, ImageResponse, Position, VelocityZ};

// vehicle controller reached over msgpack-rpc
pub mod rpc;

// simulated vehicle
pub mod software;

pub use rpc::*;
pub use software::*;

use crate::{VehicleConfig, VehicleError, VehicleKind};

/// Transport-level access to a vehicle. Implementations are driven by a
/// single [`crate::VehicleTask`] and never shared, hence `&mut self`.
#[async_trait]
pub trait VehicleInterface: Send {
    async fn connect(&mut self) -> Result<(), VehicleError>;

    /// Fails unless the remote side positively acknowledges.
    async fn confirm_connection(&mut self) -> Result<(), VehicleError>;

    async fn enable_api_control(&mut self, enabled: bool) -> Result<(), VehicleError>;

    async fn arm_disarm(&mut self, arm: bool) -> Result<(), VehicleError>;

    /// Blocks until the vehicle reports the takeoff complete.
    async fn takeoff(&mut self, timeout: Duration) -> Result<(), VehicleError>;

    /// Blocks until the vehicle reports it has landed.
    async fn land(&mut self, timeout: Duration) -> Result<(), VehicleError>;

    async fn hover(&mut self) -> Result<(), VehicleError>;

    async fn rotate_to_yaw(&mut self, angle: f32, timeout: Duration) -> Result<(), VehicleError>;

    /// Starts the velocity command and returns without waiting for it to end.
    async fn move_by_velocity_z(&mut self, command: VelocityZ) -> Result<(), VehicleError>;

    async fn get_position(&mut self) -> Result<Position, VehicleError>;

    async fn sim_get_images(
        &mut self,
        requests: Vec<ImageRequest>,
    ) -> Result<Vec<ImageResponse>, VehicleError>;

    async fn reset(&mut self) -> Result<(), VehicleError>;

    /// Called when a request was cut off before it finished. The transport
    /// may hold half a message and must not be reused as is.
    fn abandon(&mut self) {}
}

pub fn create_interface(config: &VehicleConfig) -> Box<dyn VehicleInterface> {
    match &config.interface {
        VehicleKind::Rpc { address } => Box::new(RpcVehicleInterface::new(
            address.clone(),
            config.vehicle_name.clone(),
        )),
        VehicleKind::Software => Box::new(SoftwareVehicleInterface::new()),
    }
}
