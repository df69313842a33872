// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Negotiation (format, present mode, extent, image count, sharing) is pure
// so it can be checked without a GPU; `Swapchain` owns the Vulkan objects.

use ash::vk;
use std::sync::Arc;
use super::error::BootstrapError;
use super::policy::BootstrapPolicy;
use super::selector::QueueFamilies;
use super::surface::{Surface, SurfaceSupport};
use super::VulkanDevice;

/// Everything needed to create a swapchain, decided up front
#[derive(Debug, Clone)]
pub struct SwapchainSettings {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing_mode: vk::SharingMode,
    /// Only filled for CONCURRENT sharing
    pub queue_family_indices: Vec<u32>,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainSettings {
    /// Decide swapchain parameters for a surface
    ///
    /// # Arguments
    /// * `support` - What the surface offers the selected device
    /// * `framebuffer` - Window framebuffer size in pixels
    /// * `families` - Graphics and present queue families
    /// * `policy` - Format and present mode preferences
    pub fn negotiate<P>(
        support: &SurfaceSupport,
        framebuffer: (u32, u32),
        families: QueueFamilies,
        policy: &P,
    ) -> Result<Self, BootstrapError>
    where
        P: BootstrapPolicy + ?Sized,
    {
        if !support.is_adequate() {
            return Err(BootstrapError::SurfaceUnsupported);
        }

        let format = policy
            .choose_surface_format(&support.formats)
            .ok_or(BootstrapError::SurfaceUnsupported)?;
        let present_mode = policy.choose_present_mode(&support.present_modes);
        let (sharing_mode, queue_family_indices) = sharing_for(families);

        Ok(Self {
            format,
            present_mode,
            extent: choose_extent(&support.capabilities, framebuffer),
            image_count: choose_image_count(&support.capabilities),
            sharing_mode,
            queue_family_indices,
            pre_transform: support.capabilities.current_transform,
        })
    }
}

/// One more than the minimum so we never wait on the driver for an image,
/// clamped to the maximum when the surface has one (0 means unbounded)
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

/// The surface's current extent when it has one, otherwise the framebuffer
/// size clamped to what the surface allows
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, (width, height): (u32, u32)) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Images are used by both queues when the families differ; exclusive
/// ownership across families would need explicit transfers
pub fn sharing_for(families: QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, families.unique())
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    /// One per image, signaled by the submit that renders it and waited on
    /// by its present
    pub render_finished: Vec<vk::Semaphore>,
    pub settings: SwapchainSettings,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(
        device: Arc<VulkanDevice>,
        surface: &Surface,
        settings: SwapchainSettings,
        old: Option<&Swapchain>,
    ) -> Result<Self, BootstrapError> {
        log::info!(
            "Creating swapchain: {}x{}, {:?}/{:?}, {:?}, {} images requested",
            settings.extent.width,
            settings.extent.height,
            settings.format.format,
            settings.format.color_space,
            settings.present_mode,
            settings.image_count,
        );

        let swapchain_loader =
            ash::khr::swapchain::Device::new(&device.instance.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(settings.image_count)
            .image_format(settings.format.format)
            .image_color_space(settings.format.color_space)
            .image_extent(settings.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(settings.sharing_mode)
            .queue_family_indices(&settings.queue_family_indices)
            .pre_transform(settings.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(settings.present_mode)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |old| old.swapchain));

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(BootstrapError::SwapchainCreationFailed)?;

        // Owned from here: an early return below destroys whatever was created
        let mut chain = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            render_finished: Vec::new(),
            settings,
            device,
        };

        chain.images = unsafe { chain.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(BootstrapError::SwapchainCreationFailed)?;

        for &image in &chain.images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(chain.settings.format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { chain.device.device.create_image_view(&create_info, None) }
                .map_err(BootstrapError::SwapchainCreationFailed)?;
            chain.image_views.push(view);
        }

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        for _ in 0..chain.images.len() {
            let semaphore = unsafe { chain.device.device.create_semaphore(&semaphore_info, None) }?;
            chain.render_finished.push(semaphore);
        }

        log::info!("Created swapchain with {} images", chain.images.len());
        Ok(chain)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.settings.extent
    }

    /// Acquire next image for rendering
    ///
    /// `Ok((index, true))` means suboptimal, `Err(ERROR_OUT_OF_DATE_KHR)`
    /// means the chain must be rebuilt before it can be used again.
    pub fn acquire_next_image(
        &self,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Present rendered image to screen. `Ok(true)` means suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if self.swapchain == vk::SwapchainKHR::null() {
            log::warn!("Attempted to destroy a null swapchain");
            return;
        }

        unsafe {
            for &semaphore in &self.render_finished {
                self.device.device.destroy_semaphore(semaphore, None);
            }
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        log::trace!("Swapchain destroyed ({} views)", self.image_views.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::policy::DefaultPolicy;

    const SHARED: QueueFamilies = QueueFamilies { graphics: 0, present: 0 };

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D { width: 800, height: 600 },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn support(capabilities: vk::SurfaceCapabilitiesKHR) -> SurfaceSupport {
        SurfaceSupport {
            capabilities,
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    #[test]
    fn image_count_is_min_plus_one_when_unbounded() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(1, 0)), 2);
    }

    #[test]
    fn image_count_clamped_to_max() {
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
    }

    #[test]
    fn extent_follows_surface_when_defined() {
        let extent = choose_extent(&caps(2, 0), (1920, 1080));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_uses_framebuffer_when_surface_undefined() {
        let mut capabilities = caps(2, 0);
        capabilities.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };

        let extent = choose_extent(&capabilities, (1600, 1200));
        assert_eq!((extent.width, extent.height), (1600, 1200));

        let extent = choose_extent(&capabilities, (8000, 0));
        assert_eq!((extent.width, extent.height), (4096, 1));
    }

    #[test]
    fn shared_family_is_exclusive() {
        let (mode, indices) = sharing_for(SHARED);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());
    }

    #[test]
    fn split_families_are_concurrent() {
        let (mode, indices) = sharing_for(QueueFamilies { graphics: 0, present: 2 });
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn negotiate_picks_preferences() {
        let settings =
            SwapchainSettings::negotiate(&support(caps(2, 0)), (800, 600), SHARED, &DefaultPolicy::default())
                .unwrap();

        assert_eq!(settings.format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(settings.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(settings.image_count, 3);
        assert_eq!(settings.sharing_mode, vk::SharingMode::EXCLUSIVE);
    }

    #[test]
    fn negotiate_rejects_surface_without_formats() {
        let mut surface = support(caps(2, 0));
        surface.formats.clear();
        let result = SwapchainSettings::negotiate(&surface, (800, 600), SHARED, &DefaultPolicy::default());
        assert!(matches!(result, Err(BootstrapError::SurfaceUnsupported)));
    }

    #[test]
    fn negotiate_rejects_surface_without_present_modes() {
        let mut surface = support(caps(2, 0));
        surface.present_modes.clear();
        let result = SwapchainSettings::negotiate(&surface, (800, 600), SHARED, &DefaultPolicy::default());
        assert!(matches!(result, Err(BootstrapError::SurfaceUnsupported)));
    }

    #[test]
    fn renegotiating_same_extent_is_stable() {
        let surface = support(caps(2, 3));
        let policy = DefaultPolicy::default();

        let first = SwapchainSettings::negotiate(&surface, (800, 600), SHARED, &policy).unwrap();
        let second = SwapchainSettings::negotiate(&surface, (800, 600), SHARED, &policy).unwrap();

        assert_eq!(first.image_count, second.image_count);
        assert_eq!(first.format.format, second.format.format);
        assert_eq!(first.format.color_space, second.format.color_space);
        assert_eq!(first.present_mode, second.present_mode);
        assert_eq!(
            (first.extent.width, first.extent.height),
            (second.extent.width, second.extent.height)
        );
    }
}
