//! Swapchain management.

use crate::error::{GpuError, Result};
use ash::vk;

/// Outcome of an image acquisition attempt.
pub enum AcquireResult {
    /// An image was acquired. `suboptimal` marks the swapchain stale for
    /// the next iteration without invalidating this acquisition.
    Acquired { index: u32, suboptimal: bool },
    /// No image was acquired; the swapchain must be recreated.
    OutOfDate,
}

/// Ordered set of presentable images tied to the current window size.
///
/// Becomes stale the instant the window is resized or the presentation
/// engine reports out-of-date; stale swapchains are rebuilt between frame
/// iterations, never mid-submission.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain.
    ///
    /// # Safety
    /// All handles must be valid.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn new(
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        extent: vk::Extent2D,
        old_swapchain: Option<vk::SwapchainKHR>,
        graphics_queue_family: u32,
    ) -> Result<Self> {
        let image_count = clamp_image_count(
            surface_capabilities.min_image_count + 1,
            surface_capabilities.min_image_count,
            surface_capabilities.max_image_count,
        );

        let queue_families = [graphics_queue_family];
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_families)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain.unwrap_or(vk::SwapchainKHR::null()));

        let swapchain = swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let images = swapchain_loader.get_swapchain_images(swapchain)?;

        let image_views: Vec<_> = images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );

                device.create_image_view(&view_info, None)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
        })
    }

    /// Number of presentable images. Fixed at creation; need not equal the
    /// number of frame slots.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire the next presentable image.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn acquire_next_image(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<AcquireResult> {
        let result = swapchain_loader.acquire_next_image(
            self.swapchain,
            timeout_ns,
            semaphore,
            vk::Fence::null(),
        );

        match result {
            Ok((index, suboptimal)) => Ok(AcquireResult::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Present an image. Returns `true` if the swapchain is stale and must
    /// be recreated before the next acquisition.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = swapchain_loader.queue_present(queue, &present_info);

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Destroy the swapchain and its image views.
    ///
    /// # Safety
    /// All handles must be valid and swapchain must not be in use.
    pub unsafe fn destroy(
        &self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        for &view in &self.image_views {
            device.destroy_image_view(view, None);
        }
        swapchain_loader.destroy_swapchain(self.swapchain, None);
    }
}

/// Clamp the desired image count into the supported range. A max of zero
/// means "no upper bound".
pub fn clamp_image_count(desired: u32, min: u32, max: u32) -> u32 {
    let clamped = desired.max(min);
    if max > 0 {
        clamped.min(max)
    } else {
        clamped
    }
}

/// Select the best surface format, preferring SRGB.
///
/// A surface reporting no formats cannot be presented to; that is a
/// creation failure, not a panic.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    for format in available {
        if format.format == vk::Format::B8G8R8A8_SRGB
            && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        {
            return Ok(*format);
        }
    }

    available.first().copied().ok_or_else(|| {
        GpuError::SwapchainCreation("surface reports no supported formats".to_string())
    })
}

/// Select the best present mode for the vertical-sync preference.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        // FIFO is always supported
        vk::PresentModeKHR::FIFO
    } else {
        for &mode in available {
            if mode == vk::PresentModeKHR::MAILBOX {
                return mode;
            }
        }
        for &mode in available {
            if mode == vk::PresentModeKHR::IMMEDIATE {
                return mode;
            }
        }
        vk::PresentModeKHR::FIFO
    }
}

/// Calculate the swapchain extent for the current window size, clamped to
/// the surface's supported range.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_clamps_into_supported_range() {
        assert_eq!(clamp_image_count(3, 2, 8), 3);
        assert_eq!(clamp_image_count(1, 2, 8), 2);
        assert_eq!(clamp_image_count(9, 2, 8), 8);
        // max == 0 means unbounded
        assert_eq!(clamp_image_count(9, 2, 0), 9);
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        let selected = select_surface_format(&[unorm, srgb]).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);

        // Falls back to the first available otherwise
        let selected = select_surface_format(&[unorm]).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn empty_format_list_is_an_error() {
        let result = select_surface_format(&[]);
        assert!(matches!(result, Err(GpuError::SwapchainCreation(_))));
    }

    #[test]
    fn present_mode_honors_vsync_preference() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];

        assert_eq!(
            select_present_mode(&available, true),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            select_present_mode(&available, false),
            vk::PresentModeKHR::MAILBOX
        );
        // FIFO fallback when nothing faster exists
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_clamps_when_surface_leaves_it_free() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };

        let extent = calculate_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));

        let extent = calculate_extent(&capabilities, 8000, 10);
        assert_eq!((extent.width, extent.height), (4096, 64));
    }

    #[test]
    fn extent_follows_surface_when_fixed() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };

        let extent = calculate_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (1280, 720));
    }
}
