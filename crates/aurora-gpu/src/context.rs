//! Execution context: logical device, queues, pools, allocator.

use crate::command::CommandPool;
use crate::config::ContextConfig;
use crate::descriptors::DescriptorPool;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
///
/// Exactly one live context per process is expected; every GPU resource in
/// the system is created through it and must be destroyed before it is
/// torn down. Teardown runs in strict reverse-creation order after a full
/// device idle-wait.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) allocator: Mutex<GpuAllocator>,
    pub(crate) command_pool: CommandPool,
    pub(crate) descriptor_pool: Mutex<DescriptorPool>,
    pub(crate) max_msaa_samples: vk::SampleCountFlags,

    // The graphics queue doubles as the presentation queue; the selected
    // family must support both.
    pub(crate) graphics_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the presentation queue. Coincides with the graphics queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get the command pool for reusable command buffers.
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Get access to the fixed-capacity descriptor pool.
    pub fn descriptor_pool(&self) -> &Mutex<DescriptorPool> {
        &self.descriptor_pool
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Maximum usable MSAA sample count for color+depth targets.
    pub fn max_msaa_samples(&self) -> vk::SampleCountFlags {
        self.max_msaa_samples
    }

    /// Wait for the device to be idle.
    ///
    /// Must complete before the context is dropped while other components
    /// still hold GPU resources.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Reverse creation order: allocator frees all VkDeviceMemory
            // before the pools and device go away.
            self.allocator.lock().shutdown();
            self.descriptor_pool.lock().destroy(&self.device);
            self.command_pool.destroy(&self.device);

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
#[derive(Default)]
pub struct GpuContextBuilder {
    config: ContextConfig,
}

impl GpuContextBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit configuration.
    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.config.validation = enable;
        self
    }

    /// Build the GPU context.
    ///
    /// Performs negotiation: enumerates accelerators, discards any failing
    /// mandatory device-extension support, and selects the highest-scoring
    /// remainder. A failed negotiation is fatal to startup.
    pub fn build(self) -> Result<GpuContext> {
        let config = self.config;

        // Load Vulkan entry point
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        // Create Vulkan instance
        let instance = unsafe { create_instance(&entry, &config) }?;

        // Negotiate the physical device
        let physical_device = unsafe { select_physical_device(&instance, &config) }?;

        // Find a graphics-capable queue family
        let graphics_queue_family = unsafe { find_graphics_queue_family(&instance, physical_device) }?;

        // Create logical device and fetch its queue
        let (device, graphics_queue) = unsafe {
            create_device(
                &instance,
                physical_device,
                graphics_queue_family,
                &config,
            )?
        };

        let device = Arc::new(device);

        // Command pool for reusable, individually resettable buffers
        let command_pool = unsafe {
            CommandPool::new(
                &device,
                graphics_queue_family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };

        // Descriptor pool with fixed static capacity
        let descriptor_pool = unsafe {
            DescriptorPool::new(
                &device,
                config.max_descriptor_sets,
                &[
                    vk::DescriptorPoolSize::default()
                        .ty(vk::DescriptorType::UNIFORM_BUFFER)
                        .descriptor_count(config.max_uniform_buffers),
                    vk::DescriptorPoolSize::default()
                        .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .descriptor_count(config.max_combined_image_samplers),
                ],
            )?
        };

        let max_msaa_samples = unsafe { max_usable_sample_count(&instance, physical_device) };

        // GPU memory allocator bound to the chosen accelerator
        let allocator = unsafe { GpuAllocator::new(&instance, device.clone(), physical_device) }?;

        Ok(GpuContext {
            entry,
            instance,
            physical_device,
            device,
            allocator: Mutex::new(allocator),
            command_pool,
            descriptor_pool: Mutex::new(descriptor_pool),
            max_msaa_samples,
            graphics_queue_family,
            graphics_queue,
        })
    }
}

/// Find a graphics-capable queue family.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    let families = instance.get_physical_device_queue_family_properties(physical_device);

    families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|index| index as u32)
        .ok_or(GpuError::NoSuitableDevice)
}

/// Create the logical device and retrieve the graphics queue.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    graphics_queue_family: u32,
    config: &ContextConfig,
) -> Result<(ash::Device, vk::Queue)> {
    let queue_priority = 1.0_f32;
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority))];

    let extension_names: Vec<*const i8> = config
        .device_extensions
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    // Dynamic rendering and synchronization2 are core in 1.3
    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let features = vk::PhysicalDeviceFeatures::default()
        .sampler_anisotropy(true)
        .sample_rate_shading(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .features(features)
        .push_next(&mut vulkan_1_3_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(GpuError::from)?;

    let graphics_queue = device.get_device_queue(graphics_queue_family, 0);

    Ok((device, graphics_queue))
}

/// Query the maximum sample count usable for both color and depth targets.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn max_usable_sample_count(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> vk::SampleCountFlags {
    let limits = instance
        .get_physical_device_properties(physical_device)
        .limits;

    let counts =
        limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;

    for candidate in [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ] {
        if counts.contains(candidate) {
            return candidate;
        }
    }

    vk::SampleCountFlags::TYPE_1
}

#[cfg(test)]
mod tests {
    use super::*;

    // Requires a live driver; exercised on developer machines only.
    #[test]
    #[ignore = "Requires GPU hardware"]
    fn context_creation_and_idle_wait() {
        let context = GpuContextBuilder::new()
            .app_name("aurora-test")
            .validation(false)
            .build()
            .unwrap();
        context.wait_idle().unwrap();
    }
}
