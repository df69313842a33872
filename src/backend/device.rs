// Vulkan logical device - queues and GPU memory
//
// Responsibilities:
// - Logical device creation for the selected GPU
// - One queue per distinct queue family (graphics, present)
// - Memory allocator setup

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use std::sync::Arc;
use super::error::BootstrapError;
use super::instance::GraphicsInstance;
use super::selector::{QueueFamilies, SelectedDevice};

const QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// Logical device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Taken and dropped before the device is destroyed
    allocator: Mutex<Option<Allocator>>,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: Arc<GraphicsInstance>,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilies,
}

impl VulkanDevice {
    /// Create the logical device for `selected`
    pub fn new(
        instance: Arc<GraphicsInstance>,
        selected: &SelectedDevice,
    ) -> Result<Arc<Self>, BootstrapError> {
        let physical_device = selected.physical_device;
        let queue_families = selected.queue_families;

        let queue_create_infos: Vec<_> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&QUEUE_PRIORITIES)
            })
            .collect();

        let mut extensions = vec![ash::khr::swapchain::NAME.as_ptr()];
        if selected.profile.supports_portability_subset {
            extensions.push(ash::khr::portability_subset::NAME.as_ptr());
        }

        let features = vk::PhysicalDeviceFeatures::default();
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .instance
                .create_device(physical_device, &create_info, None)
        }
        .map_err(|e| {
            log::error!("Cannot create logical device: {:?}", e);
            BootstrapError::DeviceCreationFailed(e)
        })?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        let properties = unsafe {
            instance
                .instance
                .get_physical_device_properties(physical_device)
        };
        log::info!(
            "Logical device ready on '{}', API {}.{}.{} (graphics family {}, present family {})",
            selected.profile.name,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version),
            queue_families.graphics,
            queue_families.present,
        );

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                // Nothing owns the device yet
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        Ok(Arc::new(Self {
            allocator: Mutex::new(Some(allocator)),
            device,
            physical_device,
            instance,
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    /// Run `f` with exclusive access to the memory allocator
    pub fn with_allocator<T>(
        &self,
        f: impl FnOnce(&mut Allocator) -> Result<T, BootstrapError>,
    ) -> Result<T, BootstrapError> {
        let mut guard = self.allocator.lock();
        let allocator = guard.as_mut().ok_or_else(|| {
            BootstrapError::Initialization("memory allocator already released".to_string())
        })?;
        f(allocator)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<(), vk::Result> {
        unsafe { self.device.device_wait_idle() }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        if self.device.handle() == vk::Device::null() {
            log::warn!("Attempted to destroy a null logical device");
            return;
        }

        if let Err(e) = self.wait_idle() {
            log::warn!("Device wait idle failed during teardown: {:?}", e);
        }

        // Allocator frees its memory blocks through the device
        drop(self.allocator.lock().take());

        unsafe { self.device.destroy_device(None) };
        log::trace!("Logical device destroyed");
    }
}
