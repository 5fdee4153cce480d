//! Single-owner access to the remote vehicle.
//!
//! The connection to the vehicle controller is owned by exactly one task,
//! [`VehicleTask`]. Everything else talks to it through a cloneable
//! [`VehicleLink`], which sends requests over a channel and waits for the
//! reply. Requests are executed one at a time in arrival order, so the flight
//! plan and the capture loop can share the vehicle without ever touching the
//! transport concurrently.

pub mod command;
pub mod config;
pub mod error;
pub mod interface;
pub mod link;
pub mod state;
pub mod task;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use command::*;
pub use config::*;
pub use error::VehicleError;
pub use interface::VehicleInterface;
pub use link::VehicleLink;
pub use state::LinkState;
pub use task::*;
