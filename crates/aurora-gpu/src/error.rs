//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No accelerator passed mandatory capability checks.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Mandatory instance or device extension unavailable.
    #[error("Required extension not supported: {0}")]
    MissingExtension(String),

    /// Mandatory validation layer unavailable.
    #[error("Required validation layer not available: {0}")]
    MissingLayer(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Fixed-capacity descriptor pool is exhausted.
    #[error("Descriptor pool exhausted: {requested} set(s) requested, {available} available")]
    DescriptorPoolExhausted { requested: u32, available: u32 },

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Builder was given an invalid pipeline description.
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// Pipeline creation failed at the API level.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
