// Backend module - Vulkan abstraction layer
//
// Thin RAII wrappers around ash. Every wrapper destroys its handle in Drop
// and holds an Arc to whatever must outlive it, so teardown runs in reverse
// creation order no matter where bootstrap stops.

pub mod buffer;
pub mod context;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod policy;
pub mod renderer;
pub mod selector;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::{GpuBuffer, TRIANGLE};
pub use context::VulkanContext;
pub use device::VulkanDevice;
pub use error::BootstrapError;
pub use frame::{FrameOutcome, FrameState};
pub use policy::DefaultPolicy;
