//! Hardware-backed frame loop checks.
//!
//! These tests require a GPU, a Vulkan driver, and a display; run them
//! manually with `cargo test -- --ignored`.

use std::sync::Arc;

use ash::vk;
use aurora_app::AppContext;
use aurora_gpu::{FrameContext, GpuContextBuilder};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

const FRAMES_IN_FLIGHT: usize = 3;

struct CycleHarness {
    observed: Vec<usize>,
    outcome: Option<anyhow::Result<()>>,
}

impl ApplicationHandler for CycleHarness {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.outcome.is_some() {
            return;
        }
        self.outcome = Some(run_frames(event_loop, &mut self.observed));
        event_loop.exit();
    }

    fn window_event(&mut self, _: &ActiveEventLoop, _: WindowId, _: WindowEvent) {}
}

fn run_frames(event_loop: &ActiveEventLoop, observed: &mut Vec<usize>) -> anyhow::Result<()> {
    let window_attrs = Window::default_attributes()
        .with_title("frame cycle")
        .with_inner_size(PhysicalSize::new(320, 240));
    let window = Arc::new(event_loop.create_window(window_attrs)?);

    let gpu = GpuContextBuilder::new()
        .app_name("frame cycle")
        .validation(false)
        .build()?;
    let mut ctx = unsafe { AppContext::new(window, gpu, FRAMES_IN_FLIGHT, true)? };

    for _ in 0..2 * FRAMES_IN_FLIGHT {
        let slot = ctx.frame_manager.current_frame();
        let frame = unsafe { ctx.frame_manager.begin_frame(&ctx.gpu, &ctx.surface)? };
        let Some(frame) = frame else { continue };

        assert_eq!(frame.frame_index, slot);
        observed.push(frame.frame_index);

        unsafe {
            record_present_transition(&ctx, &frame);
            ctx.frame_manager.end_frame(&ctx.gpu, &ctx.surface, &frame)?;
        }
    }

    unsafe {
        ctx.gpu.wait_idle()?;
        ctx.cleanup();
    }
    Ok(())
}

/// Minimal frame body: move the swapchain image to the present layout.
unsafe fn record_present_transition(ctx: &AppContext, frame: &FrameContext) {
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(frame.image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .level_count(1)
                .layer_count(1),
        );

    unsafe {
        ctx.gpu.device().cmd_pipeline_barrier(
            frame.command_buffer,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

#[test]
#[ignore = "Requires GPU hardware"]
fn frame_indices_cycle_through_slots() {
    let event_loop = EventLoop::new().unwrap();
    let mut harness = CycleHarness {
        observed: Vec::new(),
        outcome: None,
    };

    event_loop.run_app(&mut harness).unwrap();
    harness.outcome.take().unwrap().unwrap();

    assert_eq!(harness.observed, vec![0, 1, 2, 0, 1, 2]);
}
