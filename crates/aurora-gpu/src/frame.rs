//! Frames-in-flight orchestration.
//!
//! The frame manager cycles through a fixed ring of frame slots while the
//! swapchain hands out images in whatever order the presentation engine
//! chooses. Image count and slot count are independent, so a per-image
//! fence table remembers which slot last rendered into each image and
//! blocks re-acquisition until that work is done.

use crate::command::submit_command_buffers;
use crate::context::GpuContext;
use crate::error::Result;
use crate::surface::SurfaceContext;
use crate::swapchain::{AcquireResult, Swapchain};
use crate::sync::FrameSlot;
use ash::vk;
use tracing::debug;

/// Advance a slot index around the ring.
fn next_slot_index(current: usize, slot_count: usize) -> usize {
    (current + 1) % slot_count
}

/// Tracks, per swapchain image, the in-flight fence of the slot that last
/// submitted work targeting it.
///
/// Purely bookkeeping; the caller waits on whatever fence `assign`
/// displaces.
pub struct ImageFenceTable {
    fences: Vec<Option<vk::Fence>>,
}

impl ImageFenceTable {
    /// Create a table for `image_count` swapchain images.
    pub fn new(image_count: usize) -> Self {
        Self {
            fences: vec![None; image_count],
        }
    }

    /// Record `fence` as the owner of `image_index`, returning the fence
    /// previously tracked for that image, if any. The caller must wait on
    /// the returned fence before reusing the image.
    pub fn assign(&mut self, image_index: usize, fence: vk::Fence) -> Option<vk::Fence> {
        let previous = self.fences[image_index].take();
        self.fences[image_index] = Some(fence);
        previous
    }

    /// All fences currently tracked. Waiting on these is sufficient to
    /// retire every submission that targets the current swapchain.
    pub fn tracked(&self) -> Vec<vk::Fence> {
        self.fences.iter().filter_map(|f| *f).collect()
    }

    /// Drop all entries, resizing for a new swapchain.
    pub fn reset(&mut self, image_count: usize) {
        self.fences.clear();
        self.fences.resize(image_count, None);
    }
}

/// Everything a caller needs to record one frame.
pub struct FrameContext {
    /// Index of the frame slot in the ring.
    pub frame_index: usize,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// Command buffer, already reset and ready for recording.
    pub command_buffer: vk::CommandBuffer,
    /// The acquired swapchain image.
    pub image: vk::Image,
    /// View of the acquired swapchain image.
    pub image_view: vk::ImageView,
    /// Current swapchain extent.
    pub extent: vk::Extent2D,
    /// Swapchain color format.
    pub format: vk::Format,
}

/// Drives the begin/record/end frame protocol over N frame slots.
pub struct FrameManager {
    slots: Vec<FrameSlot>,
    swapchain: Swapchain,
    image_fences: ImageFenceTable,
    current_slot: usize,
    stale: bool,
    vsync: bool,
    window_extent: vk::Extent2D,
}

impl FrameManager {
    /// Create a frame manager with `frames_in_flight` slots and an initial
    /// swapchain sized to the window.
    ///
    /// # Safety
    /// The GPU context and surface must be valid.
    pub unsafe fn new(
        gpu: &GpuContext,
        surface: &SurfaceContext,
        width: u32,
        height: u32,
        frames_in_flight: usize,
        vsync: bool,
    ) -> Result<Self> {
        let swapchain = surface.create_swapchain(gpu, width, height, vsync, None)?;
        let image_count = swapchain.image_count();

        let command_buffers = gpu
            .command_pool()
            .allocate_command_buffers(gpu.device(), frames_in_flight as u32)?;

        let slots = command_buffers
            .into_iter()
            .map(|cb| FrameSlot::new(gpu.device(), cb))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            frames_in_flight,
            image_count, "frame manager initialized"
        );

        Ok(Self {
            slots,
            swapchain,
            image_fences: ImageFenceTable::new(image_count),
            current_slot: 0,
            stale: false,
            vsync,
            window_extent: vk::Extent2D { width, height },
        })
    }

    /// Number of frame slots in the ring.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot the next frame will use. Cycles 0..N.
    pub fn current_frame(&self) -> usize {
        self.current_slot
    }

    /// The current swapchain.
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Note a window resize. The swapchain is marked stale and rebuilt at
    /// the start of the next frame; nothing is recreated mid-frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.window_extent = vk::Extent2D { width, height };
        self.stale = true;
    }

    /// Begin a frame: wait for the slot's previous submission, acquire a
    /// swapchain image, and hand back a recording context.
    ///
    /// Returns `Ok(None)` when no frame can be produced this iteration,
    /// either because the window has zero area or because the swapchain
    /// had to be recreated twice in a row.
    ///
    /// # Safety
    /// The GPU context and surface must be valid.
    pub unsafe fn begin_frame(
        &mut self,
        gpu: &GpuContext,
        surface: &SurfaceContext,
    ) -> Result<Option<FrameContext>> {
        // A zero-area window cannot back a swapchain; skip the frame and
        // stay stale until a usable size arrives.
        if self.window_extent.width == 0 || self.window_extent.height == 0 {
            return Ok(None);
        }

        if self.stale {
            self.recreate_swapchain(gpu, surface)?;
        }

        let slot = &self.slots[self.current_slot];
        slot.wait(gpu.device())?;

        let mut acquired = self.swapchain.acquire_next_image(
            &surface.swapchain_loader,
            slot.image_available,
            u64::MAX,
        )?;

        // Out-of-date during acquisition: recreate once and retry once.
        if matches!(acquired, AcquireResult::OutOfDate) {
            self.recreate_swapchain(gpu, surface)?;
            let slot = &self.slots[self.current_slot];
            acquired = self.swapchain.acquire_next_image(
                &surface.swapchain_loader,
                slot.image_available,
                u64::MAX,
            )?;
        }

        let (image_index, suboptimal) = match acquired {
            AcquireResult::Acquired { index, suboptimal } => (index, suboptimal),
            AcquireResult::OutOfDate => {
                // Still out of date after a rebuild; give up on this frame.
                self.stale = true;
                return Ok(None);
            }
        };

        if suboptimal {
            // Usable this frame, rebuilt before the next one.
            self.stale = true;
        }

        let slot = &self.slots[self.current_slot];

        // Another slot may still be rendering into this image.
        if let Some(fence) = self.image_fences.assign(image_index as usize, slot.in_flight) {
            crate::sync::wait_for_fence(gpu.device(), fence, u64::MAX)?;
        }

        slot.reset(gpu.device())?;

        gpu.device().reset_command_buffer(
            slot.command_buffer,
            vk::CommandBufferResetFlags::empty(),
        )?;

        let begin_info = vk::CommandBufferBeginInfo::default();
        gpu.device()
            .begin_command_buffer(slot.command_buffer, &begin_info)?;

        Ok(Some(FrameContext {
            frame_index: self.current_slot,
            image_index,
            command_buffer: slot.command_buffer,
            image: self.swapchain.images[image_index as usize],
            image_view: self.swapchain.image_views[image_index as usize],
            extent: self.swapchain.extent,
            format: self.swapchain.format,
        }))
    }

    /// End a frame: close the command buffer, submit it, and present the
    /// image. Advances to the next slot regardless of presentation staleness.
    ///
    /// # Safety
    /// The frame context must come from the matching `begin_frame` call.
    pub unsafe fn end_frame(
        &mut self,
        gpu: &GpuContext,
        surface: &SurfaceContext,
        frame: &FrameContext,
    ) -> Result<()> {
        let slot = &self.slots[self.current_slot];

        gpu.device().end_command_buffer(frame.command_buffer)?;

        submit_command_buffers(
            gpu.device(),
            gpu.graphics_queue(),
            &[frame.command_buffer],
            &[slot.image_available],
            &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            &[slot.render_finished],
            slot.in_flight,
        )?;

        let stale = self.swapchain.present(
            &surface.swapchain_loader,
            gpu.present_queue(),
            frame.image_index,
            &[slot.render_finished],
        )?;

        if stale {
            self.stale = true;
        }

        self.current_slot = next_slot_index(self.current_slot, self.slots.len());
        Ok(())
    }

    /// Rebuild the swapchain for the current window extent.
    ///
    /// Waits only on the fences tracked for the outgoing swapchain's
    /// images; unrelated GPU work keeps running.
    ///
    /// # Safety
    /// The GPU context and surface must be valid.
    unsafe fn recreate_swapchain(
        &mut self,
        gpu: &GpuContext,
        surface: &SurfaceContext,
    ) -> Result<()> {
        let tracked = self.image_fences.tracked();
        if !tracked.is_empty() {
            gpu.device().wait_for_fences(&tracked, true, u64::MAX)?;
        }

        let new_swapchain = surface.create_swapchain(
            gpu,
            self.window_extent.width,
            self.window_extent.height,
            self.vsync,
            Some(self.swapchain.swapchain),
        )?;

        self.swapchain
            .destroy(gpu.device(), &surface.swapchain_loader);
        self.image_fences.reset(new_swapchain.image_count());
        self.swapchain = new_swapchain;
        self.stale = false;

        debug!(
            width = self.swapchain.extent.width,
            height = self.swapchain.extent.height,
            images = self.swapchain.image_count(),
            "swapchain recreated"
        );

        Ok(())
    }

    /// Drain all in-flight work and destroy the slots and swapchain.
    ///
    /// # Safety
    /// The GPU context and surface must be valid; no further frames may be
    /// begun afterwards.
    pub unsafe fn shutdown(&mut self, gpu: &GpuContext, surface: &SurfaceContext) -> Result<()> {
        for slot in &self.slots {
            slot.wait(gpu.device())?;
        }

        for slot in &self.slots {
            slot.destroy(gpu.device());
        }
        self.slots.clear();

        self.swapchain
            .destroy(gpu.device(), &surface.swapchain_loader);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    #[test]
    fn slot_index_cycles_through_ring() {
        let mut index = 0;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(index);
            index = next_slot_index(index, 3);
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn assigning_fresh_image_displaces_nothing() {
        let mut table = ImageFenceTable::new(3);
        assert_eq!(table.assign(0, fence(1)), None);
        assert_eq!(table.assign(1, fence(2)), None);
    }

    #[test]
    fn reacquired_image_yields_previous_owner() {
        let mut table = ImageFenceTable::new(2);
        table.assign(0, fence(1));
        table.assign(1, fence(2));

        // Image 0 comes around again under a different slot's fence.
        assert_eq!(table.assign(0, fence(3)), Some(fence(1)));
        assert_eq!(table.assign(0, fence(1)), Some(fence(3)));
    }

    #[test]
    fn tracked_returns_only_live_entries() {
        let mut table = ImageFenceTable::new(4);
        table.assign(1, fence(7));
        table.assign(3, fence(9));

        let tracked = table.tracked();
        assert_eq!(tracked.len(), 2);
        assert!(tracked.contains(&fence(7)));
        assert!(tracked.contains(&fence(9)));
    }

    #[test]
    fn reset_clears_entries_and_resizes() {
        let mut table = ImageFenceTable::new(2);
        table.assign(0, fence(1));
        table.assign(1, fence(2));

        table.reset(4);
        assert!(table.tracked().is_empty());
        assert_eq!(table.assign(3, fence(5)), None);
    }
}
