use std::time::Duration;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VehicleKind {
    /// Vehicle controller reachable over msgpack-rpc, e.g. `127.0.0.1:41451`.
    Rpc { address: String },
    /// In-process simulated multirotor.
    Software,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VehicleConfig {
    pub interface: VehicleKind,

    /// Name of the vehicle on the controller; empty selects the default one.
    #[serde(default)]
    pub vehicle_name: String,

    /// Seconds a request may take on top of its own timeout before the link
    /// gives up on it.
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout: f64,

    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: usize,

    /// Seconds between connection attempts.
    #[serde(default = "default_connect_spacing")]
    pub connect_spacing: f64,
}

impl VehicleConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.rpc_timeout.max(0.0))
    }

    pub fn connect_spacing(&self) -> Duration {
        Duration::from_secs_f64(self.connect_spacing.max(0.0))
    }
}

fn default_rpc_timeout() -> f64 {
    10.0
}

fn default_connect_attempts() -> usize {
    3
}

fn default_connect_spacing() -> f64 {
    1.0
}
