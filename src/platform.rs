// Platform layer - the window the renderer draws into
//
// The backend only needs two things from a window: raw handles to build a
// surface from, and the framebuffer size in physical pixels.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;
use winit::{
    event_loop::ActiveEventLoop,
    window::{Window, WindowAttributes},
};
use crate::backend::BootstrapError;
use crate::config::WindowConfig;

/// A window the Vulkan backend can present to
pub trait SurfaceProvider {
    /// Raw display and window handles for surface creation
    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle), BootstrapError>;

    /// Drawable size in physical pixels (not logical points)
    fn framebuffer_size(&self) -> (u32, u32);
}

impl SurfaceProvider for Window {
    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle), BootstrapError> {
        let display = self
            .display_handle()
            .map_err(|e| BootstrapError::Initialization(format!("no display handle: {e}")))?
            .as_raw();
        let window = self
            .window_handle()
            .map_err(|e| BootstrapError::WindowCreation(format!("no window handle: {e}")))?
            .as_raw();
        Ok((display, window))
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        // inner_size is already in physical pixels
        let size = self.inner_size();
        (size.width, size.height)
    }
}

pub fn window_attributes(config: &WindowConfig) -> WindowAttributes {
    WindowAttributes::default()
        .with_title(&config.title)
        .with_inner_size(winit::dpi::PhysicalSize::new(config.width, config.height))
        .with_resizable(config.resizable)
}

pub fn create_window(
    event_loop: &ActiveEventLoop,
    config: &WindowConfig,
) -> Result<Arc<Window>, BootstrapError> {
    let window = event_loop
        .create_window(window_attributes(config))
        .map_err(|e| BootstrapError::WindowCreation(e.to_string()))?;

    log::trace!("Window created: {}x{} '{}'", config.width, config.height, config.title);
    Ok(Arc::new(window))
}

/// A zero-sized framebuffer means the window is minimized
pub fn is_minimized((width, height): (u32, u32)) -> bool {
    width == 0 || height == 0
}
