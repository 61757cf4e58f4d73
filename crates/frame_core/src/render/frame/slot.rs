//! Resources owned by one swapchain image

use ash::{vk, Device};

use crate::render::vulkan::{CommandPool, Fence, Framebuffer, Semaphore, VulkanResult};

/// Everything one frame needs, bundled per swapchain image.
///
/// A tick uses two slots that may differ: the in-flight slot supplies the
/// fence, command context, image-acquired semaphore and descriptors; the slot
/// of the acquired image supplies the framebuffer and render-complete semaphore.
pub struct FrameSlot {
    index: usize,
    image_view: vk::ImageView,
    framebuffer: Framebuffer,
    fence: Fence,
    image_acquired: Semaphore,
    render_complete: Semaphore,
    command_buffer: vk::CommandBuffer,
    // after command_buffer: dropping the pool frees it
    command_pool: CommandPool,
    frame_descriptor: vk::DescriptorSet,
    object_descriptors: Vec<vk::DescriptorSet>,
}

impl FrameSlot {
    /// Build the slot for swapchain image `index`.
    ///
    /// The fence starts unsignalled; the pacer knows not to wait on it until
    /// something was submitted.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &Device,
        index: usize,
        image_view: vk::ImageView,
        depth_view: vk::ImageView,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        graphics_family: u32,
        frame_descriptor: vk::DescriptorSet,
        object_descriptors: Vec<vk::DescriptorSet>,
    ) -> VulkanResult<Self> {
        let framebuffer = Framebuffer::new(device.clone(), render_pass, &[image_view, depth_view], extent)?;
        let fence = Fence::new(device.clone(), false)?;
        let image_acquired = Semaphore::new(device.clone())?;
        let render_complete = Semaphore::new(device.clone())?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let command_buffer = command_pool.allocate_command_buffer()?;

        Ok(Self {
            index,
            image_view,
            framebuffer,
            fence,
            image_acquired,
            render_complete,
            command_buffer,
            command_pool,
            frame_descriptor,
            object_descriptors,
        })
    }

    /// Position in the slot ring, equal to the swapchain image index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Colour view of the swapchain image
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Framebuffer over the image and the shared depth buffer
    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer.handle()
    }

    /// Signalled when this slot's submitted work finishes
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    /// Signalled when the acquired image may be rendered to
    pub fn image_acquired(&self) -> vk::Semaphore {
        self.image_acquired.handle()
    }

    /// Signalled when rendering into this slot's image is done
    pub fn render_complete(&self) -> vk::Semaphore {
        self.render_complete.handle()
    }

    /// Reusable primary command buffer
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Pool the command buffer comes from
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Per-frame uniform descriptor (set 0)
    pub fn frame_descriptor(&self) -> vk::DescriptorSet {
        self.frame_descriptor
    }

    /// Per-object uniform descriptors (set 1), one per render item
    pub fn object_descriptors(&self) -> &[vk::DescriptorSet] {
        &self.object_descriptors
    }
}
