use std::time::Duration;

use async_trait::async_trait;
use dm_types::{ImageRequest, ImageResponse, Position, VelocityZ};
use tokio::time::Instant;
use tracing::*;

use super::VehicleInterface;
use crate::VehicleError;

/// Altitude a takeoff climbs to, NED (negative is up).
const TAKEOFF_ALTITUDE: f32 = -3.0;

// seconds the simulated vehicle needs for the slow maneuvers
const TAKEOFF_TIME: f32 = 0.5;
const LAND_TIME: f32 = 0.5;

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

/// Distance to the simulated ground plane that depth frames look at.
const MAX_DEPTH: f32 = 100.0;

/// A kinematic multirotor living in-process. Velocity commands are integrated
/// on every call, so its position reflects the time that passed between
/// requests. Depth frames are synthesized from the current altitude.
#[derive(Debug)]
pub struct SoftwareVehicleInterface {
    connected: bool,
    api_control: bool,
    armed: bool,
    position: Position,
    yaw: f32,
    velocity: Option<Velocity>,
    last_tick: Instant,
    epoch: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Velocity {
    vx: f32,
    vy: f32,
    until: Instant,
}

impl SoftwareVehicleInterface {
    pub fn new() -> Self {
        let now = Instant::now();

        Self {
            connected: false,
            api_control: false,
            armed: false,
            position: Position::default(),
            yaw: 0.0,
            velocity: None,
            last_tick: now,
            epoch: now,
        }
    }

    /// Advances the simulation to the current time.
    fn tick(&mut self) {
        let now = Instant::now();

        if let Some(velocity) = self.velocity {
            let end = now.min(velocity.until);
            if end > self.last_tick {
                let dt = (end - self.last_tick).as_secs_f32();
                self.position.x += velocity.vx * dt;
                self.position.y += velocity.vy * dt;
            }

            if now >= velocity.until {
                self.velocity = None;
            }
        }

        self.last_tick = now;
    }

    fn require_connected(&self, op: &'static str) -> Result<(), VehicleError> {
        if self.connected {
            Ok(())
        } else {
            Err(VehicleError::connection(format!("{op} before connect")))
        }
    }

    fn require_control(&self, op: &'static str) -> Result<(), VehicleError> {
        self.require_connected(op)?;

        if !self.api_control {
            return Err(VehicleError::Rejected {
                op,
                reason: "api control is not enabled".into(),
            });
        }

        if !self.armed {
            return Err(VehicleError::Rejected {
                op,
                reason: "vehicle is not armed".into(),
            });
        }

        Ok(())
    }

    fn depth_frame(&self, request: &ImageRequest) -> ImageResponse {
        // looking straight down: the ground is |z| away, a little further
        // toward the edges of the frame
        let altitude = self.position.z.abs().max(0.1);
        let (cx, cy) = (FRAME_WIDTH as f32 / 2.0, FRAME_HEIGHT as f32 / 2.0);

        let image_data_float = (0..FRAME_HEIGHT)
            .flat_map(|y| (0..FRAME_WIDTH).map(move |x| (x as f32, y as f32)))
            .map(|(x, y)| {
                let r = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt() / cx;
                (altitude * (1.0 + 0.25 * r * r)).min(MAX_DEPTH)
            })
            .collect();

        ImageResponse {
            camera_name: request.camera_name.clone(),
            image_type: Some(request.image_type),
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            time_stamp: self.epoch.elapsed().as_nanos() as u64,
            pixels_as_float: true,
            image_data_float,
            image_data_uint8: vec![],
            message: String::new(),
        }
    }

    fn scene_frame(&self, request: &ImageRequest) -> ImageResponse {
        let len = (FRAME_WIDTH * FRAME_HEIGHT * 3) as usize;

        ImageResponse {
            camera_name: request.camera_name.clone(),
            image_type: Some(request.image_type),
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            time_stamp: self.epoch.elapsed().as_nanos() as u64,
            pixels_as_float: false,
            image_data_float: vec![],
            image_data_uint8: vec![127; len],
            message: String::new(),
        }
    }
}

impl Default for SoftwareVehicleInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VehicleInterface for SoftwareVehicleInterface {
    async fn connect(&mut self) -> Result<(), VehicleError> {
        info!("connected to software vehicle");
        self.connected = true;
        Ok(())
    }

    async fn confirm_connection(&mut self) -> Result<(), VehicleError> {
        self.require_connected("confirm_connection")
    }

    async fn enable_api_control(&mut self, enabled: bool) -> Result<(), VehicleError> {
        self.require_connected("enable_api_control")?;
        self.api_control = enabled;
        Ok(())
    }

    async fn arm_disarm(&mut self, arm: bool) -> Result<(), VehicleError> {
        self.require_connected("arm_disarm")?;

        if arm && !self.api_control {
            return Err(VehicleError::Rejected {
                op: "arm_disarm",
                reason: "api control is not enabled".into(),
            });
        }

        self.armed = arm;
        Ok(())
    }

    async fn takeoff(&mut self, timeout: Duration) -> Result<(), VehicleError> {
        self.require_control("takeoff")?;
        self.tick();

        let needed = Duration::from_secs_f32(TAKEOFF_TIME);
        tokio::time::sleep(needed.min(timeout)).await;

        self.position.z = TAKEOFF_ALTITUDE;
        self.last_tick = Instant::now();

        debug!("software vehicle took off to {:?}", self.position);
        Ok(())
    }

    async fn land(&mut self, timeout: Duration) -> Result<(), VehicleError> {
        self.require_control("land")?;
        self.tick();
        self.velocity = None;

        let needed = Duration::from_secs_f32(LAND_TIME);
        if timeout < needed {
            tokio::time::sleep(timeout).await;
            return Err(VehicleError::CommandTimeout { op: "land", timeout });
        }

        tokio::time::sleep(needed).await;
        self.position.z = 0.0;
        self.last_tick = Instant::now();

        Ok(())
    }

    async fn hover(&mut self) -> Result<(), VehicleError> {
        self.require_connected("hover")?;
        self.tick();
        self.velocity = None;
        Ok(())
    }

    async fn rotate_to_yaw(&mut self, angle: f32, _timeout: Duration) -> Result<(), VehicleError> {
        self.require_control("rotate_to_yaw")?;
        self.tick();
        self.yaw = angle.rem_euclid(360.0);
        Ok(())
    }

    async fn move_by_velocity_z(&mut self, command: VelocityZ) -> Result<(), VehicleError> {
        self.require_control("move_by_velocity_z")?;
        self.tick();

        self.position.z = command.z;
        self.velocity = Some(Velocity {
            vx: command.vx,
            vy: command.vy,
            until: Instant::now() + command.duration,
        });

        Ok(())
    }

    async fn get_position(&mut self) -> Result<Position, VehicleError> {
        self.require_connected("get_position")?;
        self.tick();
        Ok(self.position)
    }

    async fn sim_get_images(
        &mut self,
        requests: Vec<ImageRequest>,
    ) -> Result<Vec<ImageResponse>, VehicleError> {
        self.require_connected("sim_get_images")?;
        self.tick();

        Ok(requests
            .iter()
            .map(|request| {
                if request.pixels_as_float {
                    self.depth_frame(request)
                } else {
                    self.scene_frame(request)
                }
            })
            .collect())
    }

    async fn reset(&mut self) -> Result<(), VehicleError> {
        self.require_connected("reset")?;

        *self = Self {
            connected: true,
            ..Self::new()
        };

        Ok(())
    }
}
