//! `AuroraApp` trait definition.

use crate::context::AppContext;
use aurora_gpu::FrameContext;
use winit::event::WindowEvent;

/// Trait for Aurora applications.
///
/// The framework handles window creation, GPU initialization, swapchain
/// management, and the frame protocol; implementors record their rendering
/// into the frame's command buffer.
pub trait AuroraApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window, GPU context, and frame manager exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before rendering with the delta time in seconds.
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record rendering commands for one frame.
    ///
    /// The frame's command buffer is already in the recording state; the
    /// framework submits and presents after this returns. The swapchain
    /// image must be left in `PRESENT_SRC_KHR` layout.
    fn render(&mut self, ctx: &AppContext, frame: &FrameContext) -> anyhow::Result<()>;

    /// Handle a window resize.
    ///
    /// The framework already marked the swapchain for recreation; override
    /// this to rebuild size-dependent resources of your own.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events. Return `true` to consume the event.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Cleanup resources before shutdown. The device is idle when called.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
