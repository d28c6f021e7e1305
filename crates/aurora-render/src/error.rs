//! Renderer error types.

use thiserror::Error;

/// Rendering errors.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Error from the GPU layer.
    #[error("GPU error: {0}")]
    Gpu(#[from] aurora_gpu::GpuError),

    /// No supported depth attachment format.
    #[error("No supported depth format found")]
    NoDepthFormat,

    /// Requested environment index does not exist in the scene.
    #[error("Environment index {index} out of range ({count} available)")]
    EnvironmentOutOfRange { index: u32, count: usize },
}

impl From<ash::vk::Result> for RenderError {
    fn from(value: ash::vk::Result) -> Self {
        RenderError::Gpu(aurora_gpu::GpuError::from(value))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
