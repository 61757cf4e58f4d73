//! Vulkan swapchain management
//!
//! Creation with a fixed presentation format, present mode and image count
//! policy, plus acquire/present wrappers that sort driver results into
//! "carry on", "recreate" and fatal.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::prelude::VkResult;
use ash::{vk, Device};

use super::context::VulkanContext;
use super::{VkResultExt, VulkanError, VulkanResult};
use crate::config::PresentModePreference;

/// Format every swapchain is created with
pub const SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Use the fixed format if the surface offers it.
///
/// A lone `UNDEFINED` entry means the surface accepts any format.
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    let any_format = matches!(available, [only] if only.format == vk::Format::UNDEFINED);
    let offered = available
        .iter()
        .any(|sf| sf.format == SURFACE_FORMAT.format && sf.color_space == SURFACE_FORMAT.color_space);

    if any_format || offered {
        Ok(SURFACE_FORMAT)
    } else {
        Err(VulkanError::UnsupportedSurfaceFormat {
            format: SURFACE_FORMAT.format,
            color_space: SURFACE_FORMAT.color_space,
        })
    }
}

/// Pick a present mode; FIFO is always available
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preference: PresentModePreference,
) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Vsync => vk::PresentModeKHR::FIFO,
        PresentModePreference::LowLatency => [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]
            .into_iter()
            .find(|mode| available.contains(mode))
            .unwrap_or(vk::PresentModeKHR::FIFO),
    }
}

/// Minimum plus `extra`, clamped to `[min, max]`; a max of zero means unbounded
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, extra: u32) -> u32 {
    let min = capabilities.min_image_count.max(1);
    let desired = min.saturating_add(extra);
    if capabilities.max_image_count > 0 {
        desired.clamp(min, capabilities.max_image_count.max(min))
    } else {
        desired
    }
}

/// The surface's fixed extent, or the request clamped to the allowed range
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: requested.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: requested.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// [`choose_extent`], or `None` while the surface has no area (e.g. minimised)
pub fn drawable_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> Option<vk::Extent2D> {
    let extent = choose_extent(capabilities, requested);
    (extent.width > 0 && extent.height > 0).then_some(extent)
}

fn surface_capabilities(context: &VulkanContext) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
    let surface = context.surface()?;
    unsafe {
        context
            .surface_loader()
            .get_physical_device_surface_capabilities(context.physical_device().device, surface)
    }
    .check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
}

/// Result of asking for the next presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready; `suboptimal` asks for recreation after this frame
    Image {
        /// Swapchain image index
        index: u32,
        /// Surface properties no longer match exactly
        suboptimal: bool,
    },
    /// The swapchain no longer matches the surface
    OutOfDate,
    /// No image became available within the timeout
    NotReady,
}

impl AcquireOutcome {
    /// Sort a raw acquire result
    pub fn classify(result: VkResult<(u32, bool)>) -> VulkanResult<Self> {
        match result {
            Ok((index, suboptimal)) => Ok(Self::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Ok(Self::NotReady),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Err(VulkanError::SurfaceLost),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(VulkanError::DeviceLost),
            Err(e) => Err(e).check("vkAcquireNextImageKHR"),
        }
    }
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Shown as-is
    Displayed,
    /// Shown, but the swapchain should be rebuilt
    Suboptimal,
    /// Not shown; the swapchain must be rebuilt
    OutOfDate,
}

impl PresentOutcome {
    /// Sort a raw present result
    pub fn classify(result: VkResult<bool>) -> VulkanResult<Self> {
        match result {
            Ok(false) => Ok(Self::Displayed),
            Ok(true) => Ok(Self::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Err(VulkanError::SurfaceLost),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(VulkanError::DeviceLost),
            Err(e) => Err(e).check("vkQueuePresentKHR"),
        }
    }

    /// Whether the frame reached the screen
    pub fn displayed(self) -> bool {
        !matches!(self, Self::OutOfDate)
    }

    /// Whether the swapchain should be rebuilt before the next frame
    pub fn needs_recreate(self) -> bool {
        !matches!(self, Self::Displayed)
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Create a swapchain for the context's surface
    pub fn new(
        context: &VulkanContext,
        requested_extent: vk::Extent2D,
        preference: PresentModePreference,
        extra_images: u32,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let swapchain_loader = context.swapchain_loader()?.clone();
        let surface = context.surface()?;
        let surface_loader = context.surface_loader();
        let physical_device = context.physical_device().device;

        let capabilities = surface_capabilities(context)?;
        let extent = drawable_extent(&capabilities, requested_extent).ok_or_else(|| {
            VulkanError::InvalidOperation {
                reason: "surface has zero extent".to_string(),
            }
        })?;

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)
        }
        .check("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let format = choose_surface_format(&formats)?;

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)
        }
        .check("vkGetPhysicalDeviceSurfacePresentModesKHR")?;
        let present_mode = choose_present_mode(&present_modes, preference);

        let image_count = choose_image_count(&capabilities, extra_images);

        let families = context.queue_families();
        let graphics_and_present = [families.graphics, families.present.unwrap_or(families.graphics)];

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let create_info = if graphics_and_present[0] == graphics_and_present[1] {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&graphics_and_present)
        };

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .check("vkCreateSwapchainKHR")?;

        // From here on Drop cleans up whatever was created
        let mut this = Self {
            device,
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            extent,
            present_mode,
        };

        this.images = unsafe { this.swapchain_loader.get_swapchain_images(swapchain) }
            .check("vkGetSwapchainImagesKHR")?;

        for &image in &this.images {
            let view = create_color_view(&this.device, image, format.format)?;
            this.image_views.push(view);
        }

        log::info!(
            "Swapchain {}x{} with {} images, {:?}",
            extent.width,
            extent.height,
            this.images.len(),
            present_mode
        );

        Ok(this)
    }

    /// Extent a swapchain created now would get; `None` while the surface has no area
    pub fn query_drawable_extent(
        context: &VulkanContext,
        requested: vk::Extent2D,
    ) -> VulkanResult<Option<vk::Extent2D>> {
        Ok(drawable_extent(&surface_capabilities(context)?, requested))
    }

    /// Request the next presentable image, signalling `image_acquired` when ready
    pub fn acquire_next_image(
        &self,
        timeout: u64,
        image_acquired: vk::Semaphore,
    ) -> VulkanResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                image_acquired,
                vk::Fence::null(),
            )
        };
        AcquireOutcome::classify(result)
    }

    /// Queue `image_index` for presentation once `render_complete` signals
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        render_complete: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [render_complete];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };
        PresentOutcome::classify(result)
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Present mode in use
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Number of images the driver actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

fn create_color_view(device: &Device, image: vk::Image, format: vk::Format) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.check("vkCreateImageView")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn image_count_is_clamped() {
        assert_eq!(choose_image_count(&capabilities(2, 3), 1), 3);
        assert_eq!(choose_image_count(&capabilities(2, 3), 5), 3);
        assert_eq!(choose_image_count(&capabilities(3, 8), 0), 3);
        // zero max means no upper limit
        assert_eq!(choose_image_count(&capabilities(2, 0), 4), 6);
    }

    #[test]
    fn low_latency_prefers_immediate_then_mailbox() {
        use vk::PresentModeKHR as M;
        let all = [M::FIFO, M::MAILBOX, M::IMMEDIATE];
        assert_eq!(choose_present_mode(&all, PresentModePreference::LowLatency), M::IMMEDIATE);
        assert_eq!(
            choose_present_mode(&[M::FIFO, M::MAILBOX], PresentModePreference::LowLatency),
            M::MAILBOX
        );
        assert_eq!(choose_present_mode(&[M::FIFO], PresentModePreference::LowLatency), M::FIFO);
        assert_eq!(choose_present_mode(&all, PresentModePreference::Vsync), M::FIFO);
    }

    #[test]
    fn extent_follows_surface_or_clamps_request() {
        let mut caps = capabilities(2, 3);
        let requested = vk::Extent2D {
            width: 8000,
            height: 600,
        };
        assert_eq!(
            choose_extent(&caps, requested),
            vk::Extent2D {
                width: 4096,
                height: 600
            }
        );

        caps.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(choose_extent(&caps, requested), caps.current_extent);
    }

    #[test]
    fn minimised_surface_has_no_drawable_extent() {
        let mut caps = capabilities(2, 3);
        let requested = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(drawable_extent(&caps, requested), Some(requested));

        // the window reported a size but the surface already shrank to nothing
        caps.current_extent = vk::Extent2D { width: 0, height: 0 };
        assert_eq!(drawable_extent(&caps, requested), None);

        caps.current_extent = vk::Extent2D { width: 800, height: 0 };
        assert_eq!(drawable_extent(&caps, requested), None);

        caps.current_extent.width = u32::MAX;
        caps.min_image_extent = vk::Extent2D { width: 0, height: 0 };
        assert_eq!(drawable_extent(&caps, vk::Extent2D { width: 0, height: 600 }), None);
    }

    #[test]
    fn surface_format_must_be_offered() {
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert!(matches!(
            choose_surface_format(&[srgb]),
            Err(VulkanError::UnsupportedSurfaceFormat { .. })
        ));
        assert_eq!(choose_surface_format(&[srgb, SURFACE_FORMAT]).unwrap(), SURFACE_FORMAT);

        let undefined = vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[undefined]).unwrap(), SURFACE_FORMAT);
    }

    #[test]
    fn suboptimal_present_still_counts_as_displayed() {
        let outcome = PresentOutcome::classify(Ok(true)).unwrap();
        assert_eq!(outcome, PresentOutcome::Suboptimal);
        assert!(outcome.displayed());
        assert!(outcome.needs_recreate());

        let plain = PresentOutcome::classify(Ok(false)).unwrap();
        assert!(plain.displayed());
        assert!(!plain.needs_recreate());
    }

    #[test]
    fn out_of_date_present_is_recoverable() {
        let outcome = PresentOutcome::classify(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();
        assert!(!outcome.displayed());
        assert!(outcome.needs_recreate());
    }

    #[test]
    fn lost_surface_is_fatal() {
        let err = PresentOutcome::classify(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).unwrap_err();
        assert!(err.is_fatal());
        let err = AcquireOutcome::classify(Err(vk::Result::ERROR_DEVICE_LOST)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn acquire_results_are_sorted() {
        assert_eq!(
            AcquireOutcome::classify(Ok((2, true))).unwrap(),
            AcquireOutcome::Image {
                index: 2,
                suboptimal: true
            }
        );
        assert_eq!(
            AcquireOutcome::classify(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert_eq!(
            AcquireOutcome::classify(Err(vk::Result::TIMEOUT)).unwrap(),
            AcquireOutcome::NotReady
        );

        let err = AcquireOutcome::classify(Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY)).unwrap_err();
        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
        assert!(!err.is_fatal());
    }
}
