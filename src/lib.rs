//! Raster Waves - Wave-synchronized tile engine for evolving rasters.
//!
//! This crate drives a square, double-buffered raster through a sequence of
//! compute waves. Each wave is computed by one of several interchangeable
//! backends selected by `(kernel, variant)` name at startup: sequential,
//! tiled, scheduled on a work-stealing worker pool, rayon, or offloaded to a
//! GPU through wgpu.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Run configuration, trace flags and initial raster seeds
//! - `compute`: Raster, partitioner, scheduler, registry, driver and kernels
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use raster_waves::{
//!     compute::{Engine, Headless, Registry},
//!     schema::{Parallelism, RunConfig},
//! };
//!
//! let config = RunConfig {
//!     kernel: "mandel".to_string(),
//!     variant: "sched".to_string(),
//!     dim: 512,
//!     max_iter: 50,
//!     threads: Parallelism::Fixed(4),
//!     ..Default::default()
//! };
//!
//! let registry = Registry::with_builtin();
//! let mut engine = Engine::from_registry(config, &registry)?;
//! let summary = engine.run(&mut Headless, &AtomicBool::new(false))?;
//!
//! println!("{} iterations, checksum {:016x}", summary.iterations, summary.checksum);
//! # Ok::<(), raster_waves::compute::EngineError>(())
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{Engine, EngineError, Registry, RunSummary};
pub use schema::{RunConfig, Seed, TraceFlags};
