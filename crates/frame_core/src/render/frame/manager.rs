//! Swapchain and frame slot lifecycle
//!
//! Recreation is stop-the-world: wait for the device to go idle, drop every
//! slot together with the depth buffer, descriptor pool and swapchain, then
//! rebuild everything against the new extent. Each rebuild starts a new
//! generation.

use ash::{vk, Device};

use super::slot::FrameSlot;
use crate::config::PresentModePreference;
use crate::render::uniform::{SlotDescriptors, UniformStream};
use crate::render::vulkan::swapchain::SURFACE_FORMAT;
use crate::render::vulkan::{
    DepthBuffer, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter,
    RenderPass, ResourceAllocator, Swapchain, VulkanContext, VulkanError, VulkanResult,
};

/// Owns the presentable image chain and one [`FrameSlot`] per image
pub struct FrameResourceManager {
    // Field order is drop order: slots go before what they reference
    slots: Vec<FrameSlot>,
    descriptor_pool: Option<DescriptorPool>,
    depth_buffer: Option<DepthBuffer>,
    swapchain: Option<Swapchain>,
    render_pass: RenderPass,
    frame_set_layout: DescriptorSetLayout,
    object_set_layout: DescriptorSetLayout,
    device: Device,
    allocator: ResourceAllocator,
    graphics_family: u32,
    object_count: usize,
    generation: u64,
}

impl FrameResourceManager {
    /// Create layouts and the forward render pass; no slots exist until the first
    /// [`create_or_recreate`](Self::create_or_recreate)
    pub fn new(context: &VulkanContext, object_count: usize) -> VulkanResult<Self> {
        let device = context.raw_device();

        let frame_set_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .build(&device)?;
        let object_set_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .build(&device)?;
        let render_pass = RenderPass::new_forward_pass(device.clone(), SURFACE_FORMAT.format)?;

        Ok(Self {
            slots: Vec::new(),
            descriptor_pool: None,
            depth_buffer: None,
            swapchain: None,
            render_pass,
            frame_set_layout,
            object_set_layout,
            device,
            allocator: context.allocator(),
            graphics_family: context.queue_families().graphics,
            object_count,
            generation: 0,
        })
    }

    /// Tear down every slot and rebuild the chain for `requested_extent`.
    ///
    /// `uniforms` is resized to the new slot count and every descriptor is
    /// pointed at its `(slot, object)` region again. Returns the slot count.
    pub fn create_or_recreate(
        &mut self,
        context: &VulkanContext,
        requested_extent: vk::Extent2D,
        preference: PresentModePreference,
        extra_images: u32,
        uniforms: &mut UniformStream,
    ) -> VulkanResult<usize> {
        context.wait_idle()?;
        self.teardown();

        let swapchain = Swapchain::new(context, requested_extent, preference, extra_images)?;
        let extent = swapchain.extent();
        let slot_count = swapchain.image_count();
        if slot_count == 0 {
            return Err(VulkanError::InitializationFailed(
                "swapchain has no images".to_string(),
            ));
        }

        let depth_buffer = DepthBuffer::new(&self.allocator, extent)?;

        let sets_per_slot = 1 + self.object_count;
        let descriptor_pool = DescriptorPool::new(self.device.clone(), (slot_count * sets_per_slot) as u32)?;
        let frame_sets = descriptor_pool.allocate(&self.frame_set_layout, slot_count)?;
        let object_sets = descriptor_pool.allocate(&self.object_set_layout, slot_count * self.object_count)?;

        uniforms.resize_slots(&self.allocator, slot_count)?;

        let mut slots = Vec::with_capacity(slot_count);
        for (index, &image_view) in swapchain.image_views().iter().enumerate() {
            let objects = object_sets[index * self.object_count..(index + 1) * self.object_count].to_vec();
            slots.push(FrameSlot::new(
                &self.device,
                index,
                image_view,
                depth_buffer.image_view(),
                self.render_pass.handle(),
                extent,
                self.graphics_family,
                frame_sets[index],
                objects,
            )?);
        }

        let descriptors: Vec<SlotDescriptors<'_>> = slots
            .iter()
            .map(|slot| SlotDescriptors {
                frame: slot.frame_descriptor(),
                objects: slot.object_descriptors(),
            })
            .collect();
        uniforms
            .bind_descriptors(DescriptorSetWriter::new(), &descriptors)
            .update(&self.device);

        self.slots = slots;
        self.descriptor_pool = Some(descriptor_pool);
        self.depth_buffer = Some(depth_buffer);
        self.swapchain = Some(swapchain);
        self.generation += 1;

        log::info!(
            "Frame resources generation {}: {} slots at {}x{}",
            self.generation,
            slot_count,
            extent.width,
            extent.height
        );
        Ok(slot_count)
    }

    /// Drop every slot and the chain; callers must have waited for idle
    pub fn teardown(&mut self) {
        if self.swapchain.is_some() {
            log::debug!("Tearing down frame resources generation {}", self.generation);
        }
        self.slots.clear();
        self.descriptor_pool = None;
        self.depth_buffer = None;
        self.swapchain = None;
    }

    /// Slot `index`
    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// Number of slots
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Current swapchain, if built
    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    /// Extent of the current swapchain
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(Swapchain::extent)
    }

    /// Incremented by every successful rebuild
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forward pass the framebuffers were made for
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Layouts for set 0 (frame) and set 1 (object)
    pub fn set_layouts(&self) -> [vk::DescriptorSetLayout; 2] {
        [self.frame_set_layout.handle(), self.object_set_layout.handle()]
    }

    /// Render items each slot has descriptors for
    pub fn object_count(&self) -> usize {
        self.object_count
    }
}
