// Vertex data and GPU buffers
//
// Buffers are host-visible and coherent so the CPU writes vertices straight
// into mapped memory; gpu-allocator picks the memory type.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;
use super::error::BootstrapError;
use super::VulkanDevice;

/// Position + color, laid out as the vertex shader expects it
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec2,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(position: [f32; 2], color: [f32; 3]) -> Self {
        Self {
            position: Vec2::from_array(position),
            color: Vec3::from_array(color),
        }
    }
}

/// The classic RGB triangle
pub const TRIANGLE: [Vertex; 3] = [
    Vertex::new([0.0, -0.5], [1.0, 0.0, 0.0]), // Top, red
    Vertex::new([0.5, 0.5], [0.0, 1.0, 0.0]),  // Bottom right, green
    Vertex::new([-0.5, 0.5], [0.0, 0.0, 1.0]), // Bottom left, blue
];

/// A GPU buffer with its memory, released on drop
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl GpuBuffer {
    /// Create a host-visible buffer and fill it with `data`
    pub fn with_data<T: Pod>(
        device: Arc<VulkanDevice>,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self, BootstrapError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len() as vk::DeviceSize;

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }?;

        // Owned from here, Drop cleans up on any early return
        let mut gpu_buffer = Self {
            buffer,
            size,
            allocation: None,
            device,
        };

        let requirements = unsafe {
            gpu_buffer
                .device
                .device
                .get_buffer_memory_requirements(buffer)
        };
        let allocation = gpu_buffer.device.with_allocator(|allocator| {
            Ok(allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?)
        })?;

        unsafe {
            gpu_buffer.device.device.bind_buffer_memory(
                buffer,
                allocation.memory(),
                allocation.offset(),
            )
        }?;
        let allocation = gpu_buffer.allocation.insert(allocation);

        let mapped = allocation.mapped_slice_mut().ok_or_else(|| {
            BootstrapError::Initialization(format!("buffer '{name}' memory is not host visible"))
        })?;
        mapped[..bytes.len()].copy_from_slice(bytes);

        log::trace!("Buffer '{}' created ({} bytes)", name, size);
        Ok(gpu_buffer)
    }

    /// Upload vertices into a new vertex buffer
    pub fn vertex_buffer(
        device: Arc<VulkanDevice>,
        vertices: &[Vertex],
    ) -> Result<Self, BootstrapError> {
        Self::with_data(
            device,
            "vertex buffer",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vertices,
        )
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if self.buffer == vk::Buffer::null() {
            log::warn!("Attempted to destroy a null buffer");
            return;
        }

        unsafe { self.device.device.destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take() {
            let freed = self
                .device
                .with_allocator(|allocator| Ok(allocator.free(allocation)?));
            if let Err(e) = freed {
                log::warn!("Failed to free buffer memory: {}", e);
            }
        }
    }
}
