// Renderer - the Vulkan implementation of `PresentationEngine`
//
// Owns the swapchain, one command buffer and one `FrameSync` per frame in
// flight. Each frame clears the acquired image to the configured color.
// Render-finished semaphores live on the swapchain, one per image.

use ash::vk;
use std::sync::Arc;
use super::error::BootstrapError;
use super::frame::PresentationEngine;
use super::surface::Surface;
use super::swapchain::{Swapchain, SwapchainSettings};
use super::sync::{FrameSemaphores, FrameSync};
use super::VulkanDevice;

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

pub struct Renderer {
    frame_sync: Vec<FrameSync>,
    command_pool: vk::CommandPool,
    /// One per frame in flight, re-recorded every frame
    command_buffers: Vec<vk::CommandBuffer>,
    swapchain: Swapchain,
    clear_color: [f32; 4],
    device: Arc<VulkanDevice>,
}

impl Renderer {
    pub fn new(
        device: Arc<VulkanDevice>,
        swapchain: Swapchain,
        frames_in_flight: usize,
        clear_color: [f32; 4],
    ) -> Result<Self, BootstrapError> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.queue_families.graphics)
            // TRANSIENT: Command buffers are short-lived
            // RESET: Allow individual buffer reset
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }?;

        // Owned from here, Drop releases whatever exists on an early return
        let mut renderer = Self {
            frame_sync: Vec::with_capacity(frames_in_flight),
            command_pool,
            command_buffers: Vec::new(),
            swapchain,
            clear_color,
            device,
        };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frames_in_flight as u32);
        renderer.command_buffers =
            unsafe { renderer.device.device.allocate_command_buffers(&alloc_info) }?;

        for _ in 0..frames_in_flight {
            let sync = FrameSync::new(&renderer.device.device)?;
            renderer.frame_sync.push(sync);
        }

        log::info!("Renderer ready with {} frame(s) in flight", frames_in_flight);
        Ok(renderer)
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    fn semaphores(&self, slot: usize, image_index: u32) -> FrameSemaphores {
        FrameSemaphores::for_frame(
            &self.frame_sync,
            &self.swapchain.render_finished,
            slot,
            image_index,
        )
    }

    /// Destroy the current swapchain and build a new one with `settings`.
    /// The caller must make sure the device is idle.
    pub fn rebuild_swapchain(
        &mut self,
        surface: &Surface,
        settings: SwapchainSettings,
    ) -> Result<(), BootstrapError> {
        // The old chain is retired by the new one, then destroyed here
        let new = Swapchain::new(self.device.clone(), surface, settings, Some(&self.swapchain))?;
        self.swapchain = new;
        Ok(())
    }
}

impl PresentationEngine for Renderer {
    fn wait_for_slot(&mut self, slot: usize, timeout: u64) -> Result<(), vk::Result> {
        let fence = self.frame_sync[slot].in_flight_fence;
        unsafe { self.device.device.wait_for_fences(&[fence], true, timeout) }
    }

    fn acquire_next_image(&mut self, slot: usize, timeout: u64) -> Result<(u32, bool), vk::Result> {
        self.swapchain
            .acquire_next_image(timeout, self.frame_sync[slot].image_available)
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<(), vk::Result> {
        let device = &self.device.device;
        let cmd = self.command_buffers[slot];
        let image = self.swapchain.images[image_index as usize];
        let clear_color = vk::ClearColorValue {
            float32: self.clear_color,
        };

        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(cmd, &begin_info)?;

            // UNDEFINED -> TRANSFER_DST: old contents are discarded
            let barrier_to_transfer = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(COLOR_RANGE);

            // Source stage matches the submit's semaphore wait stage
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier_to_transfer],
            );

            device.cmd_clear_color_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear_color,
                &[COLOR_RANGE],
            );

            // TRANSFER_DST -> PRESENT_SRC for the presentation engine
            let barrier_to_present = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::empty())
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(COLOR_RANGE);

            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier_to_present],
            );

            device.end_command_buffer(cmd)
        }
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<(), vk::Result> {
        let semaphores = self.semaphores(slot, image_index);
        let fence = self.frame_sync[slot].in_flight_fence;
        let wait_semaphores = [semaphores.image_available];
        let wait_stages = [vk::PipelineStageFlags::TRANSFER];
        let signal_semaphores = [semaphores.render_finished];
        let command_buffers = [self.command_buffers[slot]];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            // Reset only now: a frame skipped after the wait keeps the fence signaled
            self.device.device.reset_fences(&[fence])?;
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info], fence)
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<bool, vk::Result> {
        let semaphores = self.semaphores(slot, image_index);
        self.swapchain.present(
            self.device.present_queue,
            image_index,
            &[semaphores.render_finished],
        )
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device wait idle failed during renderer teardown: {:?}", e);
        }

        for sync in &self.frame_sync {
            sync.destroy(&self.device.device);
        }

        if self.command_pool == vk::CommandPool::null() {
            log::warn!("Attempted to destroy a null command pool");
        } else {
            // Also frees the command buffers
            unsafe { self.device.device.destroy_command_pool(self.command_pool, None) };
        }
        // Swapchain drops after this, device after that
    }
}
