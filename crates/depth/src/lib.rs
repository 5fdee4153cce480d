//! Depth frames as they come off the vehicle: reshaping the flat sensor
//! buffer into an image, and writing it to disk.

pub mod frame;
pub mod persist;

pub use frame::*;
pub use persist::*;
