// Bootstrap policy - the choices Vulkan leaves to the application
//
// Device scoring, surface format and present mode choice are injected into
// the bootstrap pipeline through this trait, so the sequence itself never
// changes when a policy does.

use ash::vk;
use super::selector::DeviceProfile;

/// Bonus added to discrete GPUs on top of their max 2D image dimension
pub const DISCRETE_GPU_BONUS: u32 = 1000;

/// Strategy object consulted by the device selector and swapchain builder
pub trait BootstrapPolicy {
    /// Score a physical device. Zero means "ineligible".
    fn score_device(&self, profile: &DeviceProfile) -> u32 {
        default_device_score(profile)
    }

    /// Pick a surface format. Returns `None` only when `formats` is empty.
    fn choose_surface_format(
        &self,
        formats: &[vk::SurfaceFormatKHR],
    ) -> Option<vk::SurfaceFormatKHR> {
        default_surface_format(formats)
    }

    /// Pick a present mode from what the surface supports
    fn choose_present_mode(&self, modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR;
}

/// Policy used by the application: stock scoring and format choice,
/// configurable present mode preference
#[derive(Debug, Clone, Copy)]
pub struct DefaultPolicy {
    pub preferred_present_mode: vk::PresentModeKHR,
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self {
            // Lowest latency without tearing
            preferred_present_mode: vk::PresentModeKHR::MAILBOX,
        }
    }
}

impl BootstrapPolicy for DefaultPolicy {
    fn choose_present_mode(&self, modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
        if modes.contains(&self.preferred_present_mode) {
            self.preferred_present_mode
        } else {
            // Every implementation must support FIFO
            vk::PresentModeKHR::FIFO
        }
    }
}

/// Discrete GPUs get a fixed bonus, everyone gets their max 2D image size.
/// Devices missing a graphics or present family, or the swapchain
/// extension, score zero.
pub fn default_device_score(profile: &DeviceProfile) -> u32 {
    if !profile.is_eligible() {
        return 0;
    }

    let mut score = 0u32;
    if profile.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += DISCRETE_GPU_BONUS;
    }
    score.saturating_add(profile.max_image_dimension_2d)
}

/// Prefer 8-bit BGRA sRGB, then 8-bit BGRA UNORM, both with the non-linear
/// sRGB color space. Falls back to the first listed format.
pub fn default_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    const PREFERRED: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM];

    // A lone UNDEFINED entry means the surface has no preference
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return Some(vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            });
        }
    }

    PREFERRED
        .iter()
        .find_map(|&wanted| {
            formats.iter().copied().find(|f| {
                f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
        })
        .or_else(|| formats.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::selector::QueueFamilyIndices;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn profile(device_type: vk::PhysicalDeviceType, max_dim: u32) -> DeviceProfile {
        DeviceProfile {
            name: "test gpu".to_string(),
            device_type,
            max_image_dimension_2d: max_dim,
            queue_families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
            },
            supports_swapchain: true,
            supports_portability_subset: false,
        }
    }

    #[test]
    fn discrete_gpu_gets_bonus() {
        let discrete = profile(vk::PhysicalDeviceType::DISCRETE_GPU, 4096);
        let integrated = profile(vk::PhysicalDeviceType::INTEGRATED_GPU, 8192);

        assert_eq!(default_device_score(&discrete), 5096);
        assert_eq!(default_device_score(&integrated), 8192);
    }

    #[test]
    fn incomplete_queues_score_zero() {
        let mut device = profile(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        device.queue_families.present = None;
        assert_eq!(default_device_score(&device), 0);
    }

    #[test]
    fn missing_swapchain_extension_scores_zero() {
        let mut device = profile(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        device.supports_swapchain = false;
        assert_eq!(default_device_score(&device), 0);
    }

    #[test]
    fn prefers_bgra_srgb() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = default_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn falls_back_to_bgra_unorm_then_first() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            default_surface_format(&formats).unwrap().format,
            vk::Format::B8G8R8A8_UNORM
        );

        let formats = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::HDR10_ST2084_EXT),
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(
            default_surface_format(&formats).unwrap().format,
            vk::Format::A2B10G10R10_UNORM_PACK32
        );
    }

    #[test]
    fn srgb_format_in_wrong_color_space_is_not_preferred() {
        let formats = [
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        let chosen = default_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn undefined_format_means_anything() {
        let formats = [format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let chosen = default_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn empty_format_list_has_no_choice() {
        assert!(default_surface_format(&[]).is_none());
    }

    #[test]
    fn fifo_only_surface_gets_fifo() {
        let policy = DefaultPolicy::default();
        assert_eq!(
            policy.choose_present_mode(&[vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn mailbox_preferred_when_available() {
        let policy = DefaultPolicy::default();
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(policy.choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn configured_preference_wins_over_mailbox() {
        let policy = DefaultPolicy {
            preferred_present_mode: vk::PresentModeKHR::IMMEDIATE,
        };
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(policy.choose_present_mode(&modes), vk::PresentModeKHR::IMMEDIATE);

        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(policy.choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }
}
