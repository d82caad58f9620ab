use lux_core::SceneError;
use thiserror::Error;

/// Errors raised by the GPU path tracer.
#[derive(Error, Debug)]
pub enum TracerError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("device limit {limit} is {supported}, need at least {required}")]
    UnsupportedDevice {
        limit: &'static str,
        supported: u64,
        required: u64,
    },

    #[error("failed to allocate {label} ({bytes} bytes): {reason}")]
    Allocation {
        label: String,
        bytes: u64,
        reason: String,
    },

    #[error("failed to build {stage} pipeline: {reason}")]
    Pipeline { stage: &'static str, reason: String },

    #[error("output readback failed: {0}")]
    Readback(String),

    #[error("no output image has been allocated yet")]
    NoOutput,

    #[error(transparent)]
    Scene(#[from] SceneError),
}

pub type TracerResult<T> = Result<T, TracerError>;
