//! Engine error taxonomy.
//!
//! Every variant is fatal for the run. Partition remainders are not errors
//! (they are traced), and out-of-range cell access is a panic.

use super::gpu::DeviceError;
use crate::schema::ConfigError;

/// Errors raised while setting up or driving a backend.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot resolve compute entry point for kernel '{kernel}', variant '{variant}'")]
    Configuration { kernel: String, variant: String },

    #[error("Backend '{kernel}/{variant}' requires a scheduler but none was initialized")]
    MissingScheduler { kernel: String, variant: String },

    #[error("Failed to start worker pool: {0}")]
    SchedulerInit(#[source] std::io::Error),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}
