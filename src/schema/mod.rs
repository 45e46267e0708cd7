//! Schema module - Run configuration, trace flags and raster seeding.

mod config;
mod seed;
mod trace;

pub use config::*;
pub use seed::*;
pub use trace::*;
