//! Application runner and event loop.

use std::sync::Arc;
use std::time::Instant;

use aurora_gpu::GpuContextBuilder;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::AuroraApp;
use crate::config::AppConfig;
use crate::context::AppContext;

/// Run an [`AuroraApp`] with the given configuration.
///
/// Initializes logging, creates the window and GPU context, and drives the
/// event loop until the application exits.
pub fn run_app<A: AuroraApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
    };

    if let Err(e) = event_loop.run_app(&mut runner) {
        error!("Event loop error: {e}");
    }

    Ok(())
}

/// Internal application runner implementing winit's `ApplicationHandler`.
struct AppRunner<A: AuroraApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
}

struct AppState<A: AuroraApp> {
    ctx: AppContext,
    app: A,
}

impl<A: AuroraApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready");
            }
            Err(e) => {
                error!("Failed to initialize application: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app handle the event first
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        error!("Render error: {e}");
                    }
                    state.ctx.window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e}");
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: AuroraApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build()?;

        let mut ctx = unsafe {
            AppContext::new(window, gpu, self.config.frames_in_flight, self.config.vsync)?
        };

        let app = A::init(&mut ctx)?;

        Ok(AppState { ctx, app })
    }
}

impl<A: AuroraApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = now;

        self.app.update(&self.ctx, dt);

        let frame = unsafe {
            self.ctx
                .frame_manager
                .begin_frame(&self.ctx.gpu, &self.ctx.surface)?
        };

        // Zero-area window or a swapchain rebuild in progress: skip the
        // frame without submitting anything.
        let Some(frame) = frame else {
            return Ok(());
        };

        self.app.render(&self.ctx, &frame)?;

        unsafe {
            self.ctx
                .frame_manager
                .end_frame(&self.ctx.gpu, &self.ctx.surface, &frame)?;
        }

        self.ctx.frame_count += 1;
        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        // Staleness is only marked here; the swapchain is rebuilt between
        // frame iterations.
        self.ctx.frame_manager.resize(width, height);
        self.app.on_resize(&mut self.ctx, width, height)?;

        info!("Resized to {width}x{height}");
        Ok(())
    }

    fn cleanup(&mut self) {
        info!(
            frames = self.ctx.frame_count,
            "Shutting down after rendering"
        );

        unsafe {
            if let Err(e) = self.ctx.gpu.wait_idle() {
                error!("Failed to wait idle: {e}");
            }

            // App resources first, then frame resources and the surface;
            // the GPU context drops last.
            self.app.cleanup(&mut self.ctx);
            self.ctx.cleanup();
        }

        info!("Cleanup complete");
    }
}
