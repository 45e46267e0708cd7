//! Device offload path.
//!
//! Runs whole-frame waves on a GPU through WebGPU (wgpu). The host uploads
//! the raster once, enqueues one dispatch per iteration without blocking, and
//! reads the result back on `wait`.

mod offload;

pub use offload::{DeviceKernel, DeviceOffload, WaveParams};

/// Error type for device operations. All of them abort the run.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("Buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("Waiting for the device failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("Device readback was abandoned before completion")]
    ReadbackLost,

    #[error("No device kernel named '{0}'")]
    UnsupportedKernel(String),

    #[error("Device offload requested but no device was initialized")]
    NotInitialized,
}
