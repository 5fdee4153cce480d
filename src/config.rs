use std::path::Path;

use config::{Config, ConfigError};
use dm_capture::CaptureConfig;
use dm_flight::FlightPlanConfig;
use dm_vehicle::VehicleConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MissionConfig {
    pub vehicle: VehicleConfig,
    pub capture: CaptureConfig,
    #[serde(default)]
    pub flight: FlightPlanConfig,
}

impl MissionConfig {
    /// Reads the config file at `path`, then applies overrides from the
    /// environment, e.g. `DEPTH_MISSION_CAPTURE__FRAME_RATE=1`.
    pub fn read_from_path(path: &Path) -> Result<Self, ConfigError> {
        let mut c = Config::new();

        c.merge(config::File::from(path))?;
        c.merge(config::Environment::with_prefix("DEPTH_MISSION").separator("__"))?;

        c.try_into()
    }
}
