//! Compute module - Wave engine, scheduler and built-in kernels.

mod display;
mod driver;
mod error;
mod raster;
mod registry;
mod scheduler;
mod tile;

pub mod gpu;
pub mod kernels;

pub use display::*;
pub use driver::*;
pub use error::*;
pub use gpu::{DeviceError, DeviceOffload, WaveParams};
pub use kernels::Viewport;
pub use raster::*;
pub use registry::*;
pub use scheduler::*;
pub use tile::*;
