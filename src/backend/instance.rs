// Vulkan instance - the root of every other Vulkan object
//
// Loads the Vulkan library, creates the instance with the extensions the
// window system needs, and optionally hooks validation output into `log`.

use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use super::error::BootstrapError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper, destroyed last
pub struct GraphicsInstance {
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    pub entry: Entry,
}

impl GraphicsInstance {
    /// Create the instance for windows on `display`
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `display` - Display the surface will live on, decides the surface extensions
    /// * `enable_validation` - Request the Khronos validation layer and a debug messenger
    pub fn new(
        app_name: &str,
        display: RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<Self, BootstrapError> {
        let entry = unsafe { Entry::load() }?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|e| BootstrapError::Initialization(format!("invalid application name: {e}")))?;
        let engine_name = c"No Engine";

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Surface extensions for this platform
        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(display)
                .map_err(BootstrapError::InstanceCreation)?
                .to_vec();

        let available = unsafe { entry.enumerate_instance_extension_properties(None) }?;
        let has_extension = |wanted: &CStr| {
            available
                .iter()
                .any(|ext| ext.extension_name_as_c_str().map_or(false, |name| name == wanted))
        };

        // Non-conformant implementations (MoltenVK) are only listed with this
        let mut flags = vk::InstanceCreateFlags::empty();
        if has_extension(ash::khr::portability_enumeration::NAME) {
            extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
            log::trace!("Enabling portability enumeration");
        }

        let validation = enable_validation && Self::validation_layer_available(&entry);
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layer_names = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names)
            .flags(flags);

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
            log::error!("Cannot create Vulkan instance: {:?}", e);
            BootstrapError::InstanceCreation(e)
        })?;
        log::trace!("Vulkan instance successfully created");

        let mut graphics_instance = Self {
            debug_utils: None,
            instance,
            entry,
        };

        // From here on a failure drops `graphics_instance`, which destroys the instance
        if validation {
            graphics_instance.debug_utils = Some(graphics_instance.setup_debug_messenger()?);
        }

        Ok(graphics_instance)
    }

    fn validation_layer_available(entry: &Entry) -> bool {
        let layers = match unsafe { entry.enumerate_instance_layer_properties() } {
            Ok(layers) => layers,
            Err(e) => {
                log::warn!("Could not enumerate instance layers: {:?}", e);
                return false;
            }
        };

        let found = layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str().map_or(false, |name| name == VALIDATION_LAYER));
        if !found {
            log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }
        found
    }

    fn setup_debug_messenger(
        &self,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT), BootstrapError> {
        let debug_utils = ash::ext::debug_utils::Instance::new(&self.entry, &self.instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for GraphicsInstance {
    fn drop(&mut self) {
        if self.instance.handle() == vk::Instance::null() {
            log::warn!("Attempted to destroy a null Vulkan instance");
            return;
        }

        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::trace!("Vulkan instance destroyed");
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::debug!("[Vulkan] {}", message),
        _ => log::trace!("[Vulkan] {}", message),
    }

    vk::FALSE
}
