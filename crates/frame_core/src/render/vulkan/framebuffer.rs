//! Framebuffer and depth attachment management

use ash::{vk, Device};

use super::buffer::ResourceAllocator;
use super::memory::MemoryAccess;
use super::{VkResultExt, VulkanResult};

/// Depth format used by the forward pass
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a new framebuffer
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&framebuffer_create_info, None) }
            .check("vkCreateFramebuffer")?;

        Ok(Self {
            device,
            framebuffer,
        })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Depth buffer wrapper with RAII cleanup
pub struct DepthBuffer {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    image_view: vk::ImageView,
}

impl DepthBuffer {
    /// Create a device-local depth image sized to `extent`
    pub fn new(allocator: &ResourceAllocator, extent: vk::Extent2D) -> VulkanResult<Self> {
        let device = allocator.device().clone();

        let image_create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(DEPTH_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { device.create_image(&image_create_info, None) }.check("vkCreateImage")?;

        // Partially built; Drop skips null handles
        let mut depth = Self {
            device,
            image,
            memory: vk::DeviceMemory::null(),
            image_view: vk::ImageView::null(),
        };

        let requirements = unsafe { depth.device.get_image_memory_requirements(image) };
        depth.memory = allocator.allocate(
            requirements,
            MemoryAccess::DeviceLocal.required_properties(),
            requirements.size,
        )?;

        unsafe { depth.device.bind_image_memory(image, depth.memory, 0) }
            .check("vkBindImageMemory")?;

        let image_view_create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        depth.image_view = unsafe { depth.device.create_image_view(&image_view_create_info, None) }
            .check("vkCreateImageView")?;

        log::debug!("Depth buffer {}x{}", extent.width, extent.height);
        Ok(depth)
    }

    /// Get the image view handle
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.image_view != vk::ImageView::null() {
                self.device.destroy_image_view(self.image_view, None);
            }
            self.device.destroy_image(self.image, None);
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
            }
        }
    }
}
