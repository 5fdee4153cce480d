use std::time::Duration;

use dm_client::ChannelError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VehicleError {
    /// The link could not be established or confirmed, or was lost.
    #[error("vehicle connection failed: {reason}")]
    Connection { reason: String },

    #[error("{op} did not complete within {timeout:?}")]
    CommandTimeout { op: &'static str, timeout: Duration },

    #[error("no image returned by camera {camera:?}")]
    ImageUnavailable { camera: String },

    #[error("{op} was rejected by the vehicle: {reason}")]
    Rejected { op: &'static str, reason: String },

    #[error("protocol error during {op}: {reason}")]
    Protocol { op: &'static str, reason: String },

    /// The task owning the vehicle is gone.
    #[error("vehicle link is closed")]
    Disconnected,
}

impl VehicleError {
    pub fn connection(reason: impl ToString) -> Self {
        VehicleError::Connection {
            reason: reason.to_string(),
        }
    }

    pub fn protocol(op: &'static str, reason: impl ToString) -> Self {
        VehicleError::Protocol {
            op,
            reason: reason.to_string(),
        }
    }

    /// Errors after which the link cannot be trusted for further commands.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            VehicleError::Connection { .. } | VehicleError::Disconnected
        )
    }
}

impl From<ChannelError> for VehicleError {
    fn from(_: ChannelError) -> Self {
        VehicleError::Disconnected
    }
}
