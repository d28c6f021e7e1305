//! Vulkan abstraction layer for the Aurora engine.
//!
//! This crate provides:
//! - Vulkan instance creation and physical device negotiation
//! - Logical device and queue management
//! - Memory allocation via gpu-allocator
//! - Swapchain handling and frames-in-flight synchronization
//! - Declarative descriptor set layout and pipeline builders

pub mod command;
pub mod config;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod frame;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use config::ContextConfig;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    write_combined_image_sampler, write_uniform_buffer, DescriptorPool, DescriptorSetLayoutBuilder,
    PipelineLayoutBuilder,
};
pub use error::{GpuError, Result};
pub use frame::{FrameContext, FrameManager};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineBuilder};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use sync::{create_fence, create_semaphore, FrameSlot};
