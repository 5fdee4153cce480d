//! The scripted survey flight: take off, turn, fly a square at constant
//! altitude, land. Any failure along the way brings the vehicle down through
//! a best-effort safety sequence.

pub mod config;
pub mod plan;
pub mod state;
pub mod step;

pub use config::*;
pub use plan::*;
pub use state::*;
pub use step::*;
