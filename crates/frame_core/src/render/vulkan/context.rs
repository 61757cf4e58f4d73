//! Vulkan context management
//!
//! Instance, physical device selection and logical device creation. A context
//! is either bound to a window surface (the normal renderer path) or headless,
//! which is enough for transfer work such as upload round trips.

use std::ffi::{CStr, CString};

#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};

use super::buffer::ResourceAllocator;
use super::{VkResultExt, VulkanError, VulkanResult};
use crate::config::RendererConfig;
use crate::render::window::RenderSurface;

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    #[cfg(debug_assertions)]
    debug_messenger: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create an instance with the given extensions, optionally with validation
    pub fn new(
        app_name: &str,
        required_extensions: &[String],
        enable_validation: bool,
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("application name contains NUL".into()))?;
        let engine_name_cstr = CString::new("frame_core").map_err(|_| {
            VulkanError::InitializationFailed("engine name contains NUL".into())
        })?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let validation = enable_validation && Self::validation_available(&entry);

        #[allow(unused_mut)]
        let mut extension_names = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VulkanError::InitializationFailed("extension name contains NUL".into()))?;

        #[cfg(debug_assertions)]
        if validation {
            extension_names.push(DebugUtils::name().to_owned());
        }

        let extension_ptrs: Vec<*const std::os::raw::c_char> =
            extension_names.iter().map(|ext| ext.as_ptr()).collect();

        let layer_names = if validation {
            vec![CString::new(VALIDATION_LAYER).map_err(|_| {
                VulkanError::InitializationFailed("layer name contains NUL".into())
            })?]
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const std::os::raw::c_char> =
            layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance =
            unsafe { entry.create_instance(&create_info, None) }.check("vkCreateInstance")?;

        log::info!(
            "Created Vulkan instance for '{}' (validation {})",
            app_name,
            if validation { "on" } else { "off" }
        );

        #[cfg(debug_assertions)]
        let debug_messenger = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    fn validation_available(entry: &Entry) -> bool {
        let available = entry
            .enumerate_instance_layer_properties()
            .unwrap_or_default()
            .iter()
            .any(|layer| {
                let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
                name.to_str() == Ok(VALIDATION_LAYER)
            });
        if !available {
            log::warn!("{} requested but not installed", VALIDATION_LAYER);
        }
        available
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
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

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .check("vkCreateDebugUtilsMessengerEXT")
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Validation messages go straight to the `log` facade
#[cfg(debug_assertions)]
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
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::trace!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Queue family indices used by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Family used for drawing
    pub graphics: u32,
    /// Family that can present to the surface; absent when headless
    pub present: Option<u32>,
    /// Family used by the upload path
    pub transfer: u32,
}

impl QueueFamilies {
    /// Pick queue families from a device's family list.
    ///
    /// Graphics is the first graphics-capable family. Present prefers the
    /// graphics family and falls back to any family `supports_present`
    /// accepts. Transfer prefers a family with transfer but no graphics bit.
    pub fn select(
        families: &[vk::QueueFamilyProperties],
        needs_present: bool,
        supports_present: impl Fn(u32) -> bool,
    ) -> Option<Self> {
        let indexed = || (0u32..).zip(families.iter());

        let graphics = indexed()
            .find(|(_, f)| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|(i, _)| i)?;

        let present = if needs_present {
            let mut candidates = std::iter::once(graphics)
                .chain(indexed().map(|(i, _)| i).filter(|&i| i != graphics));
            Some(candidates.find(|&i| supports_present(i))?)
        } else {
            None
        };

        let transfer = indexed()
            .find(|(_, f)| {
                f.queue_count > 0
                    && f.queue_flags.contains(vk::QueueFlags::TRANSFER)
                    && !f.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            })
            .map_or(graphics, |(i, _)| i);

        Some(Self {
            graphics,
            present,
            transfer,
        })
    }

    fn unique(&self) -> Vec<u32> {
        let mut families = vec![self.graphics, self.transfer];
        families.extend(self.present);
        families.sort_unstable();
        families.dedup();
        families
    }
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Selected queue families
    pub queue_families: QueueFamilies,
}

impl PhysicalDeviceInfo {
    /// Select the first device that can draw (and present, given a surface)
    pub fn select_suitable_device(
        instance: &Instance,
        surface: Option<(vk::SurfaceKHR, &Surface)>,
    ) -> VulkanResult<Self> {
        let devices =
            unsafe { instance.enumerate_physical_devices() }.check("vkEnumeratePhysicalDevices")?;

        for device in devices {
            match Self::evaluate_device(instance, device, surface) {
                Ok(info) => {
                    log::info!(
                        "Selected GPU: {} (queues: {:?})",
                        info.name(),
                        info.queue_families
                    );
                    return Ok(info);
                }
                Err(e) => log::debug!("Skipping physical device: {}", e),
            }
        }

        Err(VulkanError::MissingCapability(
            "no GPU with the required queues and extensions".to_string(),
        ))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: Option<(vk::SurfaceKHR, &Surface)>,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let supports_present = |index: u32| {
            surface.map_or(false, |(surface, loader)| unsafe {
                loader
                    .get_physical_device_surface_support(device, index, surface)
                    .unwrap_or(false)
            })
        };

        let queue_families = QueueFamilies::select(&families, surface.is_some(), supports_present)
            .ok_or_else(|| {
                VulkanError::MissingCapability("graphics or present queue family".to_string())
            })?;

        if surface.is_some() {
            let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
                .check("vkEnumerateDeviceExtensionProperties")?;

            let has_swapchain = extensions.iter().any(|available| {
                let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                name == SwapchainLoader::name()
            });

            if !has_swapchain {
                return Err(VulkanError::MissingCapability(
                    "VK_KHR_swapchain".to_string(),
                ));
            }
        }

        Ok(Self {
            device,
            properties,
            memory_properties,
            queue_families,
        })
    }

    /// Device name as reported by the driver
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Alignment every dynamic or per-object uniform offset must honour
    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue (null when headless)
    pub present_queue: vk::Queue,
    /// Queue used by the upload path
    pub transfer_queue: vk::Queue,
    /// Swapchain extension loader, only when presenting
    pub swapchain_loader: Option<SwapchainLoader>,
}

impl LogicalDevice {
    /// Create a new logical device with one queue per selected family
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let families = physical_device.queue_families;
        let priorities = [1.0f32];

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let presenting = families.present.is_some();
        let extension_ptrs = if presenting {
            vec![SwapchainLoader::name().as_ptr()]
        } else {
            Vec::new()
        };

        let device_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&device_features);

        let device = unsafe { instance.create_device(physical_device.device, &create_info, None) }
            .check("vkCreateDevice")?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let transfer_queue = unsafe { device.get_device_queue(families.transfer, 0) };
        let present_queue = families
            .present
            .map_or(vk::Queue::null(), |family| unsafe { device.get_device_queue(family, 0) });

        let swapchain_loader = presenting.then(|| SwapchainLoader::new(instance, &device));

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            transfer_queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Main Vulkan context that owns instance, device and (optionally) surface
pub struct VulkanContext {
    surface: Option<vk::SurfaceKHR>,
    surface_loader: Surface,
    physical_device: PhysicalDeviceInfo,
    device: LogicalDevice,
    instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a context that presents to `window`
    pub fn new(window: &dyn RenderSurface, config: &RendererConfig) -> VulkanResult<Self> {
        let extensions = window.required_instance_extensions()?;
        let instance =
            VulkanInstance::new(&config.application_name, &extensions, config.enable_validation)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window.create_surface(instance.instance.handle())?;

        let build = || -> VulkanResult<(PhysicalDeviceInfo, LogicalDevice)> {
            let physical_device = PhysicalDeviceInfo::select_suitable_device(
                &instance.instance,
                Some((surface, &surface_loader)),
            )?;
            let device = LogicalDevice::new(&instance.instance, &physical_device)?;
            Ok((physical_device, device))
        };

        match build() {
            Ok((physical_device, device)) => Ok(Self {
                surface: Some(surface),
                surface_loader,
                physical_device,
                device,
                instance,
            }),
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                Err(e)
            }
        }
    }

    /// Create a context without a surface; no swapchain can be made from it
    pub fn headless(config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(&config.application_name, &[], config.enable_validation)?;
        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let physical_device = PhysicalDeviceInfo::select_suitable_device(&instance.instance, None)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device)?;

        Ok(Self {
            surface: None,
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the surface handle
    pub fn surface(&self) -> VulkanResult<vk::SurfaceKHR> {
        self.surface.ok_or_else(|| VulkanError::InvalidOperation {
            reason: "headless context has no surface".to_string(),
        })
    }

    /// Get the surface loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the logical device
    pub fn device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Get the raw Device handle
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Get the swapchain loader
    pub fn swapchain_loader(&self) -> VulkanResult<&SwapchainLoader> {
        self.device
            .swapchain_loader
            .as_ref()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "headless context has no swapchain support".to_string(),
            })
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Get the transfer queue
    pub fn transfer_queue(&self) -> vk::Queue {
        self.device.transfer_queue
    }

    /// Selected queue families
    pub fn queue_families(&self) -> QueueFamilies {
        self.physical_device.queue_families
    }

    /// Allocator bound to this device's memory layout
    pub fn allocator(&self) -> ResourceAllocator {
        let families = self.queue_families();
        ResourceAllocator::new(self.raw_device(), self.physical_device.memory_properties)
            .with_queue_families(&[families.graphics, families.transfer])
    }

    /// Block until every queue on the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle() }.check("vkDeviceWaitIdle")
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            if let Some(surface) = self.surface.take() {
                self.surface_loader.destroy_surface(surface, None);
            }
        }
        // device drops before instance (field order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn dedicated_transfer_family_is_preferred() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let selected = QueueFamilies::select(&families, true, |_| true).unwrap();
        assert_eq!(selected.graphics, 0);
        assert_eq!(selected.present, Some(0));
        assert_eq!(selected.transfer, 1);
    }

    #[test]
    fn transfer_falls_back_to_graphics() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER)];
        let selected = QueueFamilies::select(&families, false, |_| false).unwrap();
        assert_eq!(selected.transfer, selected.graphics);
        assert_eq!(selected.present, None);
        assert_eq!(selected.unique(), vec![0]);
    }

    #[test]
    fn present_may_live_on_another_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let selected = QueueFamilies::select(&families, true, |i| i == 1).unwrap();
        assert_eq!(selected.present, Some(1));
        assert_eq!(selected.unique(), vec![0, 1]);
    }

    #[test]
    fn no_present_support_rejects_device() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(QueueFamilies::select(&families, true, |_| false).is_none());
    }

    #[test]
    fn no_graphics_family_rejects_device() {
        let families = [family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];
        assert!(QueueFamilies::select(&families, false, |_| true).is_none());
    }
}
