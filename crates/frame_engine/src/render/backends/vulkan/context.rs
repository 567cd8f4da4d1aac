//! Vulkan instance, physical device selection and logical device
//!
//! Owns the objects every other Vulkan collaborator borrows. Instance and
//! device are reference counted so the device and presenter can share them
//! and the last owner tears them down in order.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};

use super::convert::vk_err;
use crate::core::config::VulkanBackendConfig;
use crate::render::error::{RenderError, RenderResult};

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &str = "frame_engine";

fn init_failed(reason: impl Into<String>) -> RenderError {
    RenderError::creation_failed("vulkan context", reason)
}

fn c_string(value: &str) -> RenderResult<CString> {
    CString::new(value).map_err(|e| init_failed(format!("invalid name {value:?}: {e}")))
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create an instance with the window system's extensions plus any configured ones
    pub fn new(config: &VulkanBackendConfig, window_extensions: &[String]) -> RenderResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| init_failed(format!("failed to load Vulkan: {e}")))?;

        let enable_validation = config.validation_enabled();
        let (major, minor, patch) = config.application_version;
        let app_name = c_string(&config.application_name)?;
        let engine_name = c_string(ENGINE_NAME)?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_names = window_extensions
            .iter()
            .chain(config.instance_extensions.iter())
            .map(|name| c_string(name))
            .collect::<RenderResult<Vec<_>>>()?;

        let mut extensions: Vec<*const c_char> =
            extension_names.iter().map(|name| name.as_ptr()).collect();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if enable_validation {
            vec![c_string(VALIDATION_LAYER)?]
        } else {
            Vec::new()
        };
        let layers: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(vk_err("instance"))?;

        let debug_utils = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(err) => {
                    log::warn!("Validation requested but debug messenger unavailable: {err}");
                    None
                }
            }
        } else {
            None
        };

        log::info!(
            "Created Vulkan instance for {} (validation {})",
            config.application_name,
            if enable_validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> RenderResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(vk_err("debug messenger"))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the first device that can render to and present on `surface`
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        extra_extensions: &[CString],
    ) -> RenderResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(vk_err("physical device list"))?;

        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader, extra_extensions) {
                Ok(info) => {
                    log::info!("Selected GPU: {}", info.name());
                    return Ok(info);
                }
                Err(err) => log::debug!("Skipping physical device: {err}"),
            }
        }

        Err(init_failed("no suitable GPU found"))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        extra_extensions: &[CString],
    ) -> RenderResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;

        for (index, family) in (0u32..).zip(queue_families.iter()) {
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)
            }
            .map_err(vk_err("surface support query"))?;

            if present_support && present_family.is_none() {
                present_family = Some(index);
            }

            if graphics_family.is_some() && present_family.is_some() {
                break;
            }
        }

        let graphics_family =
            graphics_family.ok_or_else(|| init_failed("no graphics queue family"))?;
        let present_family =
            present_family.ok_or_else(|| init_failed("no present queue family"))?;

        let available = unsafe { instance.enumerate_device_extension_properties(device) }
            .map_err(vk_err("device extension query"))?;

        let supports = |required: &CStr| {
            available.iter().any(|ext| {
                let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
                name == required
            })
        };

        if !supports(SwapchainLoader::name()) {
            return Err(init_failed("swapchain extension not supported"));
        }
        if let Some(missing) = extra_extensions.iter().find(|ext| !supports(ext)) {
            return Err(init_failed(format!("extension {missing:?} not supported")));
        }

        Ok(Self {
            device,
            properties,
            memory_properties,
            graphics_family,
            present_family,
        })
    }

    /// Human-readable device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Index of a memory type allowed by `type_filter` with `properties`
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        (0..self.memory_properties.memory_type_count).find(|&i| {
            (type_filter & (1 << i)) != 0
                && self.memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
    /// Selected physical device
    pub physical: PhysicalDeviceInfo,
    queue_lock: Mutex<()>,
}

impl LogicalDevice {
    /// Create a logical device with graphics and present queues
    pub fn new(
        instance: &Instance,
        physical: PhysicalDeviceInfo,
        extra_extensions: &[CString],
    ) -> RenderResult<Self> {
        let unique_families: HashSet<u32> =
            [physical.graphics_family, physical.present_family].into_iter().collect();

        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<*const c_char> = std::iter::once(SwapchainLoader::name().as_ptr())
            .chain(extra_extensions.iter().map(|ext| ext.as_ptr()))
            .collect();

        let features = vk::PhysicalDeviceFeatures::builder().build();
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical.device, &create_info, None) }
            .map_err(vk_err("logical device"))?;

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
            physical,
            queue_lock: Mutex::new(()),
        })
    }

    /// Run `f` with exclusive access to the queues
    pub fn with_queues<T>(&self, f: impl FnOnce(vk::Queue, vk::Queue) -> T) -> T {
        let _guard = self.queue_lock.lock();
        f(self.graphics_queue, self.present_queue)
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                log::error!("device_wait_idle failed during teardown: {err:?}");
            }
            self.device.destroy_device(None);
        }
    }
}

/// Extension names from configuration as C strings
pub fn extension_names(names: &[String]) -> RenderResult<Vec<CString>> {
    names.iter().map(|name| c_string(name)).collect()
}
