use std::time::Duration;

use dm_types::{ImageRequest, ImageResponse, Position, VelocityZ};

use crate::VehicleError;

#[derive(Debug, Clone, PartialEq)]
pub enum VehicleRequest {
    Connect,
    ConfirmConnection,
    EnableApiControl(bool),
    ArmDisarm(bool),
    Takeoff { timeout: Duration },
    Land { timeout: Duration },
    Hover,
    RotateToYaw { angle: f32, timeout: Duration },
    MoveByVelocityZ(VelocityZ),
    GetPosition,
    SimGetImages(Vec<ImageRequest>),
    Reset,
}

impl VehicleRequest {
    pub fn name(&self) -> &'static str {
        match self {
            VehicleRequest::Connect => "connect",
            VehicleRequest::ConfirmConnection => "confirm_connection",
            VehicleRequest::EnableApiControl(_) => "enable_api_control",
            VehicleRequest::ArmDisarm(_) => "arm_disarm",
            VehicleRequest::Takeoff { .. } => "takeoff",
            VehicleRequest::Land { .. } => "land",
            VehicleRequest::Hover => "hover",
            VehicleRequest::RotateToYaw { .. } => "rotate_to_yaw",
            VehicleRequest::MoveByVelocityZ(_) => "move_by_velocity_z",
            VehicleRequest::GetPosition => "get_position",
            VehicleRequest::SimGetImages(_) => "sim_get_images",
            VehicleRequest::Reset => "reset",
        }
    }

    /// How long the vehicle itself is allowed to take to complete the request.
    pub fn timeout(&self) -> Duration {
        match self {
            VehicleRequest::Takeoff { timeout }
            | VehicleRequest::Land { timeout }
            | VehicleRequest::RotateToYaw { timeout, .. } => *timeout,
            _ => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VehicleResponse {
    Unit,
    Position(Position),
    Images(Vec<ImageResponse>),
}

pub type VehicleCommand = dm_client::Command<VehicleRequest, VehicleResponse, VehicleError>;
