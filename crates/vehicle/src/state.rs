use std::fmt;

use crate::{VehicleError, VehicleRequest};

/// Connection state of the link as seen from this side. Ordered: each state
/// implies the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkState {
    Disconnected,
    Connected,
    ApiControlEnabled,
    Armed,
}

impl LinkState {
    /// Rejects requests that cannot be issued in this state. Only `connect`
    /// is allowed while disconnected.
    pub fn check(self, request: &VehicleRequest) -> Result<(), VehicleError> {
        match (self, request) {
            (LinkState::Disconnected, VehicleRequest::Connect) => Ok(()),
            (LinkState::Disconnected, request) => Err(VehicleError::connection(format!(
                "{} issued while disconnected",
                request.name()
            ))),
            _ => Ok(()),
        }
    }

    /// State after `request` completed successfully.
    pub fn after(self, request: &VehicleRequest) -> LinkState {
        match request {
            VehicleRequest::Connect => self.max(LinkState::Connected),
            VehicleRequest::EnableApiControl(true) => self.max(LinkState::ApiControlEnabled),
            VehicleRequest::EnableApiControl(false) | VehicleRequest::Reset => {
                LinkState::Connected
            }
            VehicleRequest::ArmDisarm(true) => LinkState::Armed,
            VehicleRequest::ArmDisarm(false) => self.min(LinkState::ApiControlEnabled),
            _ => self,
        }
    }

    /// State after `request` failed with `err`.
    pub fn after_error(self, err: &VehicleError) -> LinkState {
        if err.is_connection_level() {
            LinkState::Disconnected
        } else {
            self
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connected => "connected",
            LinkState::ApiControlEnabled => "api control enabled",
            LinkState::Armed => "armed",
        };

        f.write_str(name)
    }
}
