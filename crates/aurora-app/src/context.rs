//! Application context shared with the running app.

use std::sync::Arc;
use std::time::Instant;

use aurora_gpu::{FrameManager, GpuContext, SurfaceContext};
use tracing::error;
use winit::window::Window;

/// Everything an application needs during its lifetime: the window, the
/// GPU context, the presentation surface, and the frame manager.
pub struct AppContext {
    /// The application window.
    pub window: Arc<Window>,
    /// The GPU context. Dropped last; its teardown idles the device.
    pub gpu: GpuContext,
    /// The presentation surface.
    pub surface: SurfaceContext,
    /// Frame synchronization and swapchain ownership.
    pub frame_manager: FrameManager,
    /// Frames rendered since startup.
    pub frame_count: u64,
    /// Timestamp of the previous frame, for delta-time computation.
    pub last_frame_time: Instant,
    start_time: Instant,
}

impl AppContext {
    /// Create the context for a window.
    ///
    /// # Safety
    /// The window must outlive the context.
    pub unsafe fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        frames_in_flight: usize,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        let size = window.inner_size();

        let surface = SurfaceContext::from_window(&gpu, window.as_ref())?;
        let frame_manager = FrameManager::new(
            &gpu,
            &surface,
            size.width,
            size.height,
            frames_in_flight,
            vsync,
        )?;

        let now = Instant::now();
        Ok(Self {
            window,
            gpu,
            surface,
            frame_manager,
            frame_count: 0,
            last_frame_time: now,
            start_time: now,
        })
    }

    /// Seconds since the context was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.start_time.elapsed().as_secs_f32()
    }

    /// Tear down frame resources and the surface.
    ///
    /// The GPU context itself is destroyed when the `AppContext` drops,
    /// after everything created through it is gone.
    ///
    /// # Safety
    /// The device must be idle and no frame may be in flight.
    pub unsafe fn cleanup(&mut self) {
        if let Err(e) = self.frame_manager.shutdown(&self.gpu, &self.surface) {
            error!("Frame manager shutdown failed: {e}");
        }
        self.surface.destroy();
    }
}
