//! A scripted vehicle for tests. Every call is recorded in a [`Journal`],
//! operations can be told to fail, and image queries replay a prepared queue.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use dm_types::{ImageRequest, ImageResponse, ImageType, Position, VelocityZ};

use crate::{VehicleError, VehicleInterface};

/// Shared record of the calls a [`ScriptedVehicleInterface`] received, in
/// order. Boolean arguments are part of the entry, e.g. `arm_disarm(false)`.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == op).count()
    }

    fn record(&self, call: impl Into<String>) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(call.into());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Timeout,
    Rejected,
    Connection,
}

impl Failure {
    fn error(self, op: &'static str) -> VehicleError {
        match self {
            Failure::Timeout => VehicleError::CommandTimeout {
                op,
                timeout: Duration::from_secs(1),
            },
            Failure::Rejected => VehicleError::Rejected {
                op,
                reason: "scripted failure".into(),
            },
            Failure::Connection => VehicleError::connection("scripted failure"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedVehicleInterface {
    journal: Journal,
    failures: HashMap<&'static str, Failure>,
    images: VecDeque<Vec<ImageResponse>>,
    image_delay: Option<Duration>,
    next_timestamp: u64,
    position: Position,
}

impl ScriptedVehicleInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call to `op` fail with `failure`.
    pub fn fail(mut self, op: &'static str, failure: Failure) -> Self {
        self.failures.insert(op, failure);
        self
    }

    /// Responses for successive `sim_get_images` calls. Once they run out,
    /// each call returns a freshly generated depth frame.
    pub fn with_images(mut self, images: Vec<Vec<ImageResponse>>) -> Self {
        self.images = images.into();
        self
    }

    /// Makes `sim_get_images` take `delay` before answering.
    pub fn with_image_delay(mut self, delay: Duration) -> Self {
        self.image_delay = Some(delay);
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn call(&mut self, op: &'static str, entry: impl Into<String>) -> Result<(), VehicleError> {
        self.journal.record(entry);

        match self.failures.get(op) {
            Some(failure) => Err(failure.error(op)),
            None => Ok(()),
        }
    }
}

/// A depth image as the vehicle returns it: `width * height` floats counting
/// up from zero.
pub fn depth_response(width: u32, height: u32, time_stamp: u64) -> ImageResponse {
    ImageResponse {
        camera_name: "1".into(),
        image_type: Some(ImageType::DepthVis),
        width,
        height,
        time_stamp,
        pixels_as_float: true,
        image_data_float: (0..width * height).map(|i| i as f32).collect(),
        ..Default::default()
    }
}

#[async_trait]
impl VehicleInterface for ScriptedVehicleInterface {
    async fn connect(&mut self) -> Result<(), VehicleError> {
        self.call("connect", "connect")
    }

    async fn confirm_connection(&mut self) -> Result<(), VehicleError> {
        self.call("confirm_connection", "confirm_connection")
    }

    async fn enable_api_control(&mut self, enabled: bool) -> Result<(), VehicleError> {
        self.call("enable_api_control", format!("enable_api_control({enabled})"))
    }

    async fn arm_disarm(&mut self, arm: bool) -> Result<(), VehicleError> {
        self.call("arm_disarm", format!("arm_disarm({arm})"))
    }

    async fn takeoff(&mut self, _timeout: Duration) -> Result<(), VehicleError> {
        self.call("takeoff", "takeoff")?;
        self.position.z = -3.0;
        Ok(())
    }

    async fn land(&mut self, _timeout: Duration) -> Result<(), VehicleError> {
        self.call("land", "land")?;
        self.position.z = 0.0;
        Ok(())
    }

    async fn hover(&mut self) -> Result<(), VehicleError> {
        self.call("hover", "hover")
    }

    async fn rotate_to_yaw(&mut self, _angle: f32, _timeout: Duration) -> Result<(), VehicleError> {
        self.call("rotate_to_yaw", "rotate_to_yaw")
    }

    async fn move_by_velocity_z(&mut self, command: VelocityZ) -> Result<(), VehicleError> {
        self.call("move_by_velocity_z", "move_by_velocity_z")?;
        self.position.z = command.z;
        Ok(())
    }

    async fn get_position(&mut self) -> Result<Position, VehicleError> {
        self.call("get_position", "get_position")?;
        Ok(self.position)
    }

    async fn sim_get_images(
        &mut self,
        requests: Vec<ImageRequest>,
    ) -> Result<Vec<ImageResponse>, VehicleError> {
        self.call("sim_get_images", "sim_get_images")?;

        if let Some(delay) = self.image_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(images) = self.images.pop_front() {
            return Ok(images);
        }

        self.next_timestamp += 1;
        Ok(requests
            .iter()
            .filter(|request| request.pixels_as_float)
            .map(|_| depth_response(4, 2, self.next_timestamp))
            .collect())
    }

    async fn reset(&mut self) -> Result<(), VehicleError> {
        self.call("reset", "reset")?;
        self.position = Position::default();
        Ok(())
    }

    fn abandon(&mut self) {
        self.journal.record("abandon");
    }
}
