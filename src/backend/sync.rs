// Synchronization primitives
//
// The acquire semaphore and the fence belong to a frame slot: the CPU waits
// on the fence before reusing the slot. The render-finished semaphore
// belongs to a swapchain image (see `Swapchain::render_finished`), since a
// slot's fence says nothing about when the present waiting on it is done.

use ash::vk;
use super::error::BootstrapError;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> Result<Self, BootstrapError> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Start signaled so the first wait on this slot returns immediately
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
        };

        // Clean up whatever was created if a later call fails
        let result = unsafe {
            (|| {
                sync.image_available = device.create_semaphore(&semaphore_info, None)?;
                sync.in_flight_fence = device.create_fence(&fence_info, None)?;
                Ok::<(), vk::Result>(())
            })()
        };

        match result {
            Ok(()) => Ok(sync),
            Err(e) => {
                sync.destroy(device);
                Err(e.into())
            }
        }
    }

    /// Destroy the objects. Null handles are skipped.
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            if self.image_available != vk::Semaphore::null() {
                device.destroy_semaphore(self.image_available, None);
            }
            if self.in_flight_fence != vk::Fence::null() {
                device.destroy_fence(self.in_flight_fence, None);
            }
        }
    }
}

/// The semaphore pair one frame's submit and present use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSemaphores {
    /// Waited on by the submit
    pub image_available: vk::Semaphore,
    /// Signaled by the submit, waited on by the present
    pub render_finished: vk::Semaphore,
}

impl FrameSemaphores {
    /// `slots` is indexed by frame slot, `per_image` by swapchain image
    pub fn for_frame(
        slots: &[FrameSync],
        per_image: &[vk::Semaphore],
        slot: usize,
        image_index: u32,
    ) -> Self {
        Self {
            image_available: slots[slot].image_available,
            render_finished: per_image[image_index as usize],
        }
    }
}
