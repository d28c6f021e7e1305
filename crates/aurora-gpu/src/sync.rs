//! Synchronization primitives and per-frame slots.

use crate::error::Result;
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = device.create_semaphore(&create_info, None)?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = device.create_fence(&create_info, None)?;
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(
    device: &ash::Device,
    fence: vk::Fence,
    timeout_ns: u64,
) -> Result<()> {
    device.wait_for_fences(&[fence], true, timeout_ns)?;
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    device.reset_fences(&[fence])?;
    Ok(())
}

/// One of N reusable frame slots: the synchronization primitives and the
/// command buffer for a single frame in flight.
///
/// The command buffer must not be re-recorded until `in_flight` has been
/// observed signaled for the slot's previous submission.
pub struct FrameSlot {
    /// Signaled when the swapchain image is available.
    pub image_available: vk::Semaphore,
    /// Signaled when rendering of this slot's submission completes.
    pub render_finished: vk::Semaphore,
    /// Signaled when the GPU has finished this slot's prior submission.
    /// Created signaled so the first wait passes immediately.
    pub in_flight: vk::Fence,
    /// Command buffer recorded for this slot.
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSlot {
    /// Create a frame slot with a freshly allocated command buffer.
    ///
    /// # Safety
    /// The device and command pool must be valid.
    pub unsafe fn new(device: &ash::Device, command_buffer: vk::CommandBuffer) -> Result<Self> {
        Ok(Self {
            image_available: create_semaphore(device)?,
            render_finished: create_semaphore(device)?,
            in_flight: create_fence(device, true)?,
            command_buffer,
        })
    }

    /// Block until this slot's previous submission has completed.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait(&self, device: &ash::Device) -> Result<()> {
        wait_for_fence(device, self.in_flight, u64::MAX)
    }

    /// Reset the completion fence before resubmission.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        reset_fence(device, self.in_flight)
    }

    /// Destroy the slot's synchronization primitives. The command buffer
    /// is returned to its pool when the pool is destroyed.
    ///
    /// # Safety
    /// The device must be valid and the slot must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_available, None);
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_fence(self.in_flight, None);
    }
}
