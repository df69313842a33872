// Window surface - the drawable a swapchain presents into

use ash::vk;
use std::sync::Arc;
use crate::platform::SurfaceProvider;
use super::error::BootstrapError;
use super::instance::GraphicsInstance;

/// What a surface offers a given physical device
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A swapchain needs at least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

pub struct Surface {
    pub handle: vk::SurfaceKHR,
    pub loader: ash::khr::surface::Instance,
    // Keeps the instance alive until the surface is gone
    _instance: Arc<GraphicsInstance>,
}

impl Surface {
    pub fn new<W>(instance: Arc<GraphicsInstance>, window: &W) -> Result<Self, BootstrapError>
    where
        W: SurfaceProvider + ?Sized,
    {
        let (display, window_handle) = window.raw_handles()?;
        let loader = ash::khr::surface::Instance::new(&instance.entry, &instance.instance);

        let handle = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                display,
                window_handle,
                None,
            )
        }
        .map_err(BootstrapError::SurfaceCreation)?;
        log::trace!("Window surface created");

        Ok(Self {
            handle,
            loader,
            _instance: instance,
        })
    }

    /// Can queue family `family` of `device` present to this surface?
    pub fn supports_present(
        &self,
        device: vk::PhysicalDevice,
        family: u32,
    ) -> Result<bool, vk::Result> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(device, family, self.handle)
        }
    }

    pub fn support(&self, device: vk::PhysicalDevice) -> Result<SurfaceSupport, BootstrapError> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                self.loader
                    .get_physical_device_surface_capabilities(device, self.handle)?,
                self.loader
                    .get_physical_device_surface_formats(device, self.handle)?,
                self.loader
                    .get_physical_device_surface_present_modes(device, self.handle)?,
            )
        };

        Ok(SurfaceSupport {
            capabilities,
            formats,
            present_modes,
        })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        if self.handle == vk::SurfaceKHR::null() {
            log::warn!("Attempted to destroy a null window surface");
            return;
        }

        unsafe { self.loader.destroy_surface(self.handle, None) };
        self.handle = vk::SurfaceKHR::null();
        log::trace!("Window surface destroyed");
    }
}
