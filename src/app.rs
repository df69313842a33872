// =============================================================================
// APPLICATION - window lifecycle and the frame loop
// =============================================================================
//
// Bootstrap runs once, when winit first resumes the app. After that every
// redraw request drives one frame through `FrameState::draw`. Resizes only
// raise the rebuild flag; the rebuild itself happens right before the next
// frame, once the framebuffer has a nonzero size.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};
use crate::backend::{
    DefaultPolicy, FrameOutcome, FrameState, GpuBuffer, VulkanContext, TRIANGLE,
};
use crate::config::Config;
use crate::platform::{self, SurfaceProvider};

/// Main application struct.
///
/// IMPORTANT: Field order matters for Drop! GPU resources go before the
/// context, the context before the window it presents to.
pub struct App {
    config: Config,
    frame: FrameState,

    vertex_buffer: Option<GpuBuffer>,
    context: Option<VulkanContext>,
    window: Option<Arc<Window>>,

    is_minimized: bool,
    /// First fatal error; main turns it into a non-zero exit
    error: Option<anyhow::Error>,

    // Frame counter for the periodic stats line
    frames_presented: u64,
    last_stats: Instant,
}

impl App {
    pub fn new(config: Config) -> Self {
        let frame = FrameState::new(config.frames_in_flight(), config.acquire_timeout_ns());
        Self {
            config,
            frame,
            vertex_buffer: None,
            context: None,
            window: None,
            is_minimized: false,
            error: None,
            frames_presented: 0,
            last_stats: Instant::now(),
        }
    }

    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = platform::create_window(event_loop, &self.config.window)
            .context("Failed to create window")?;

        let policy = DefaultPolicy {
            preferred_present_mode: self.config.present_mode(),
        };
        let context = VulkanContext::bootstrap(&*window, &self.config, Box::new(policy))
            .context("Failed to initialize Vulkan")?;

        let vertex_buffer = GpuBuffer::vertex_buffer(context.device().clone(), &TRIANGLE)
            .context("Failed to upload vertex buffer")?;
        log::debug!(
            "Uploaded {} vertices ({} bytes) to '{}'",
            TRIANGLE.len(),
            vertex_buffer.size,
            context.selected_device().profile.name
        );

        self.is_minimized = platform::is_minimized(window.framebuffer_size());
        self.vertex_buffer = Some(vertex_buffer);
        self.context = Some(context);
        self.window = Some(window);
        Ok(())
    }

    /// Rebuild if needed, then draw one frame
    fn render_frame(&mut self) -> Result<()> {
        let (Some(window), Some(context)) = (self.window.as_ref(), self.context.as_mut()) else {
            return Ok(());
        };
        if self.is_minimized {
            return Ok(());
        }

        if self.frame.rebuild_pending() {
            let framebuffer = window.framebuffer_size();
            if platform::is_minimized(framebuffer) {
                // Wait for a Resized event with a real size
                self.is_minimized = true;
                return Ok(());
            }
            context
                .rebuild_swapchain(framebuffer)
                .context("Failed to rebuild swapchain")?;
            self.frame.complete_rebuild();
        }

        match self.frame.draw(context.renderer_mut()) {
            Ok(FrameOutcome::Presented { .. }) => {
                self.frames_presented += 1;
                Ok(())
            }
            Ok(FrameOutcome::Skipped) => Ok(()),
            Err(e) => {
                log::error!(
                    "Frame failed in {:?} phase (slot {}, image {:?})",
                    self.frame.phase(),
                    self.frame.slot(),
                    self.frame.image_index()
                );
                Err(e).context("Failed to render frame")
            }
        }
    }

    fn log_stats(&mut self) {
        let elapsed = self.last_stats.elapsed();
        if elapsed.as_secs() < 5 {
            return;
        }

        let fps = self.frames_presented as f64 / elapsed.as_secs_f64();
        log::debug!("{:.1} FPS", fps);
        self.frames_presented = 0;
        self.last_stats = Instant::now();
    }

    fn wait_idle(&self) {
        if let Some(context) = &self.context {
            if let Err(e) = context.device().wait_idle() {
                log::warn!("Device wait idle failed: {:?}", e);
            }
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.wait_idle();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                self.is_minimized = platform::is_minimized((size.width, size.height));
                if !self.is_minimized {
                    self.frame.request_rebuild();
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_frame() {
                    self.fail(event_loop, e);
                    return;
                }
                self.log_stats();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.wait_idle();
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Keep redrawing continuously while there is something to draw
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.is_minimized {
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.wait_idle();
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        self.wait_idle();

        // Buffer, then swapchain/device/surface/instance, then the window
        self.vertex_buffer.take();
        self.context.take();
        self.window.take();

        log::info!("Cleanup complete");
    }
}
