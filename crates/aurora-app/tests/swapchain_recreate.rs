//! Hardware-backed swapchain recreation checks.
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

#[derive(Debug, PartialEq, Eq)]
struct SwapchainShape {
    extent: (u32, u32),
    format: vk::Format,
    image_count: usize,
}

struct RecreateHarness {
    shapes: Vec<SwapchainShape>,
    outcome: Option<anyhow::Result<()>>,
}

impl ApplicationHandler for RecreateHarness {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.outcome.is_some() {
            return;
        }
        self.outcome = Some(run_recreation(event_loop, &mut self.shapes));
        event_loop.exit();
    }

    fn window_event(&mut self, _: &ActiveEventLoop, _: WindowId, _: WindowEvent) {}
}

fn run_recreation(
    event_loop: &ActiveEventLoop,
    shapes: &mut Vec<SwapchainShape>,
) -> anyhow::Result<()> {
    let window_attrs = Window::default_attributes()
        .with_title("swapchain recreate")
        .with_inner_size(PhysicalSize::new(320, 240));
    let window = Arc::new(event_loop.create_window(window_attrs)?);

    let gpu = GpuContextBuilder::new()
        .app_name("swapchain recreate")
        .validation(false)
        .build()?;
    let mut ctx = unsafe { AppContext::new(window, gpu, 2, true)? };

    render_one_frame(&mut ctx)?;
    shapes.push(shape_of(&ctx));

    // Same window size marked stale again: the rebuild at the next
    // begin_frame must reproduce the same swapchain shape.
    let size = ctx.window.inner_size();
    ctx.frame_manager.resize(size.width, size.height);

    render_one_frame(&mut ctx)?;
    shapes.push(shape_of(&ctx));

    unsafe {
        ctx.gpu.wait_idle()?;
        ctx.cleanup();
    }
    Ok(())
}

fn shape_of(ctx: &AppContext) -> SwapchainShape {
    let swapchain = ctx.frame_manager.swapchain();
    SwapchainShape {
        extent: (swapchain.extent.width, swapchain.extent.height),
        format: swapchain.format,
        image_count: swapchain.image_count(),
    }
}

fn render_one_frame(ctx: &mut AppContext) -> anyhow::Result<()> {
    let frame = unsafe { ctx.frame_manager.begin_frame(&ctx.gpu, &ctx.surface)? };
    let Some(frame) = frame else {
        anyhow::bail!("no frame produced");
    };

    unsafe {
        record_present_transition(ctx, &frame);
        ctx.frame_manager.end_frame(&ctx.gpu, &ctx.surface, &frame)?;
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
fn recreation_with_unchanged_inputs_is_idempotent() {
    let event_loop = EventLoop::new().unwrap();
    let mut harness = RecreateHarness {
        shapes: Vec::new(),
        outcome: None,
    };

    event_loop.run_app(&mut harness).unwrap();
    harness.outcome.take().unwrap().unwrap();

    assert_eq!(harness.shapes.len(), 2);
    assert_eq!(harness.shapes[0], harness.shapes[1]);
}
