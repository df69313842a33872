// Error types for the Vulkan bootstrap and the frame loop
//
// Bootstrap errors are fatal: they propagate to main and the process exits
// non-zero. Frame errors only cover conditions that cannot be downgraded to
// a swapchain rebuild.

use ash::vk;
use thiserror::Error;

/// Everything that can stop the bootstrap sequence before the render loop starts
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Windowing system or Vulkan loader unavailable
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("failed to create window: {0}")]
    WindowCreation(String),

    #[error("failed to create Vulkan instance: {0:?}")]
    InstanceCreation(vk::Result),

    #[error("failed to create window surface: {0:?}")]
    SurfaceCreation(vk::Result),

    #[error("no Vulkan-capable physical devices found")]
    NoDevicesFound,

    #[error("no physical device supports graphics and presentation to this surface")]
    NoSuitableDevice,

    #[error("failed to create logical device: {0:?}")]
    DeviceCreationFailed(vk::Result),

    #[error("surface reports no formats or no present modes")]
    SurfaceUnsupported,

    #[error("failed to create swapchain: {0:?}")]
    SwapchainCreationFailed(vk::Result),

    #[error("GPU memory allocation failed: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),

    /// Any other Vulkan call failing during bootstrap queries
    #[error("Vulkan call failed: {0:?}")]
    Vulkan(#[from] vk::Result),
}

impl From<ash::LoadingError> for BootstrapError {
    fn from(err: ash::LoadingError) -> Self {
        Self::Initialization(format!("failed to load Vulkan library: {err}"))
    }
}

/// Per-frame failures that a swapchain rebuild cannot fix
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("waiting for frame slot {slot} failed: {result:?}")]
    Wait { slot: usize, result: vk::Result },

    #[error("failed to acquire swapchain image: {0:?}")]
    Acquire(vk::Result),

    #[error("failed to record commands for image {image_index}: {result:?}")]
    Record { image_index: u32, result: vk::Result },

    #[error("queue submission failed: {0:?}")]
    Submit(vk::Result),

    #[error("presentation failed: {0:?}")]
    Present(vk::Result),
}

/// Acquire/present results that mean "rebuild the swapchain", not "fail"
pub fn is_stale_swapchain(result: vk::Result) -> bool {
    matches!(
        result,
        vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR
    )
}
