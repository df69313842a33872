// Vulkan context - the bootstrap sequence
//
// instance -> surface -> physical device -> logical device -> swapchain ->
// renderer, always in that order. Any failure returns early and the pieces
// built so far are dropped in reverse.

use ash::vk;
use std::sync::Arc;
use crate::config::Config;
use crate::platform::SurfaceProvider;
use super::device::VulkanDevice;
use super::error::BootstrapError;
use super::instance::GraphicsInstance;
use super::policy::BootstrapPolicy;
use super::renderer::Renderer;
use super::selector::{select_physical_device, SelectedDevice};
use super::surface::Surface;
use super::swapchain::{Swapchain, SwapchainSettings};

/// Everything bootstrap creates. Field order is drop order.
pub struct VulkanContext {
    renderer: Renderer,
    device: Arc<VulkanDevice>,
    surface: Surface,
    selected: SelectedDevice,
    policy: Box<dyn BootstrapPolicy>,
    _instance: Arc<GraphicsInstance>,
}

impl VulkanContext {
    /// Bring up Vulkan for `window`
    ///
    /// # Arguments
    /// * `window` - Surface provider, also supplies the initial extent
    /// * `config` - Application name, validation, frames in flight, clear color
    /// * `policy` - Device scoring, surface format and present mode choices
    pub fn bootstrap<W>(
        window: &W,
        config: &Config,
        policy: Box<dyn BootstrapPolicy>,
    ) -> Result<Self, BootstrapError>
    where
        W: SurfaceProvider + ?Sized,
    {
        let (display, _) = window.raw_handles()?;
        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;

        let instance = Arc::new(GraphicsInstance::new(
            &config.window.title,
            display,
            enable_validation,
        )?);
        let surface = Surface::new(instance.clone(), window)?;

        let selected = select_physical_device(&instance, &surface, policy.as_ref())?;
        let device = VulkanDevice::new(instance.clone(), &selected)?;

        let support = surface.support(selected.physical_device)?;
        let settings = SwapchainSettings::negotiate(
            &support,
            window.framebuffer_size(),
            selected.queue_families,
            policy.as_ref(),
        )?;
        let swapchain = Swapchain::new(device.clone(), &surface, settings, None)?;

        let renderer = Renderer::new(
            device.clone(),
            swapchain,
            config.frames_in_flight(),
            config.graphics.clear_color,
        )?;

        log::info!(
            "Vulkan bootstrap complete on '{}' (score {})",
            selected.profile.name,
            selected.score
        );
        Ok(Self {
            renderer,
            device,
            surface,
            selected,
            policy,
            _instance: instance,
        })
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    pub fn selected_device(&self) -> &SelectedDevice {
        &self.selected
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.renderer.swapchain().extent()
    }

    /// Recreate the swapchain for a new framebuffer size.
    ///
    /// Waits for the device to go idle first; surface capabilities are
    /// queried again since they change with the window.
    pub fn rebuild_swapchain(&mut self, framebuffer: (u32, u32)) -> Result<(), BootstrapError> {
        self.device.wait_idle()?;

        let support = self.surface.support(self.device.physical_device)?;
        let settings = SwapchainSettings::negotiate(
            &support,
            framebuffer,
            self.selected.queue_families,
            self.policy.as_ref(),
        )?;
        self.renderer.rebuild_swapchain(&self.surface, settings)?;

        let extent = self.extent();
        log::info!("Swapchain rebuilt at {}x{}", extent.width, extent.height);
        Ok(())
    }
}
