// Physical device selection
//
// Enumerates GPUs, builds a profile for each (type, limits, queue families,
// extension support) and lets the policy score them. Highest score wins,
// ties go to the device enumerated first.

use ash::vk;
use std::ffi::CStr;
use super::error::BootstrapError;
use super::instance::GraphicsInstance;
use super::policy::BootstrapPolicy;
use super::surface::Surface;

/// Queue families found on a device, either may still be missing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

/// Queue families of a selected device, both guaranteed present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Scan families in index order. The first family with the graphics bit
    /// becomes the graphics family, the first one that can present to the
    /// surface becomes the present family. Stops as soon as both are known.
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> Self
    where
        F: FnMut(u32) -> bool,
    {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if indices.present.is_none() && supports_present(index) {
                indices.present = Some(index);
            }
            if indices.is_complete() {
                break;
            }
        }

        indices
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn resolve(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

impl QueueFamilies {
    /// Distinct family indices, graphics first
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// Everything the policy needs to judge a physical device
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub queue_families: QueueFamilyIndices,
    pub supports_swapchain: bool,
    pub supports_portability_subset: bool,
}

impl DeviceProfile {
    /// Can this device be used at all for presenting to the surface
    pub fn is_eligible(&self) -> bool {
        self.queue_families.is_complete() && self.supports_swapchain
    }
}

/// The device chosen by [`select_physical_device`]
#[derive(Debug, Clone)]
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub profile: DeviceProfile,
    pub queue_families: QueueFamilies,
    pub score: u32,
}

/// Pick the best candidate by policy score. Devices without a graphics
/// and a present family, or without the swapchain extension, score zero
/// whatever the policy says.
///
/// Returns the index into `candidates` and its score.
pub fn select_best<P>(candidates: &[DeviceProfile], policy: &P) -> Result<(usize, u32), BootstrapError>
where
    P: BootstrapPolicy + ?Sized,
{
    if candidates.is_empty() {
        return Err(BootstrapError::NoDevicesFound);
    }

    let mut best: Option<(usize, u32)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = if candidate.is_eligible() {
            policy.score_device(candidate)
        } else {
            0
        };
        log::debug!("GPU candidate {} '{}': score {}", index, candidate.name, score);

        // Strictly greater: the first device seen keeps a tie
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    match best {
        Some((index, score)) if score > 0 => Ok((index, score)),
        _ => Err(BootstrapError::NoSuitableDevice),
    }
}

/// Enumerate physical devices, profile them against the surface, and
/// return the one the policy likes best
pub fn select_physical_device<P>(
    instance: &GraphicsInstance,
    surface: &Surface,
    policy: &P,
) -> Result<SelectedDevice, BootstrapError>
where
    P: BootstrapPolicy + ?Sized,
{
    let devices = unsafe { instance.instance.enumerate_physical_devices() }?;
    log::trace!("Found {} Vulkan physical device(s)", devices.len());

    if devices.is_empty() {
        return Err(BootstrapError::NoDevicesFound);
    }

    let profiles = devices
        .iter()
        .map(|&device| profile_device(instance, surface, device))
        .collect::<Result<Vec<_>, _>>()?;

    let (index, score) = select_best(&profiles, policy)?;
    let profile = profiles[index].clone();
    let queue_families = profile
        .queue_families
        .resolve()
        .ok_or(BootstrapError::NoSuitableDevice)?;

    log::info!(
        "Selected GPU '{}' ({:?}, score {})",
        profile.name,
        profile.device_type,
        score
    );

    Ok(SelectedDevice {
        physical_device: devices[index],
        profile,
        queue_families,
        score,
    })
}

fn profile_device(
    instance: &GraphicsInstance,
    surface: &Surface,
    device: vk::PhysicalDevice,
) -> Result<DeviceProfile, BootstrapError> {
    let properties = unsafe { instance.instance.get_physical_device_properties(device) };
    let families = unsafe {
        instance
            .instance
            .get_physical_device_queue_family_properties(device)
    };
    let extensions = unsafe {
        instance
            .instance
            .enumerate_device_extension_properties(device)
    }?;

    // A failed support query counts as "cannot present" for that family
    let queue_families = QueueFamilyIndices::find(&families, |index| {
        surface
            .supports_present(device, index)
            .unwrap_or_else(|e| {
                log::warn!("Surface support query failed for family {}: {:?}", index, e);
                false
            })
    });

    let has_extension = |wanted: &CStr| {
        extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str().map_or(false, |name| name == wanted))
    };

    let name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed device>".to_string());

    Ok(DeviceProfile {
        name,
        device_type: properties.device_type,
        max_image_dimension_2d: properties.limits.max_image_dimension2_d,
        queue_families,
        supports_swapchain: has_extension(ash::khr::swapchain::NAME),
        supports_portability_subset: has_extension(ash::khr::portability_subset::NAME),
    })
}
