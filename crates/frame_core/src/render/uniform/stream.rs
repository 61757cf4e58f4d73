//! Per-frame and per-object uniform storage
//!
//! Two persistent host-visible buffers: one region per frame slot for
//! [`FrameUniform`], one region per `(slot, object)` for [`ObjectUniform`].
//! Descriptors are pointed at their region once, when the frame slots are
//! built; steady-state updates are plain memory copies.

use ash::vk;

use super::layout::{RegionVersions, UniformLayout, UniformRegion};
use super::payload::{FrameUniform, ObjectUniform};
use crate::render::vulkan::{DescriptorSetWriter, GpuBuffer, ResourceAllocator, VulkanResult};

/// Descriptor targets of one frame slot
pub struct SlotDescriptors<'a> {
    /// Set bound at index 0
    pub frame: vk::DescriptorSet,
    /// One set per render item, bound at index 1
    pub objects: &'a [vk::DescriptorSet],
}

/// Every `(slot, object)` pair with the region its descriptor points at
pub fn binding_plan(layout: &UniformLayout) -> Vec<(usize, usize, UniformRegion)> {
    (0..layout.slot_count())
        .flat_map(|slot| {
            (0..layout.objects_per_slot()).map(move |object| (slot, object, layout.region(slot, object)))
        })
        .collect()
}

/// Ring of aligned uniform regions indexed by frame slot
pub struct UniformStream {
    object_layout: UniformLayout,
    frame_layout: UniformLayout,
    object_buffer: GpuBuffer,
    frame_buffer: GpuBuffer,
    object_versions: RegionVersions,
    min_alignment: vk::DeviceSize,
}

impl UniformStream {
    /// Allocate storage for `slot_count` slots of `object_count` objects
    pub fn new(
        allocator: &ResourceAllocator,
        min_alignment: vk::DeviceSize,
        slot_count: usize,
        object_count: usize,
    ) -> VulkanResult<Self> {
        let object_layout = UniformLayout::new(
            std::mem::size_of::<ObjectUniform>() as vk::DeviceSize,
            min_alignment,
            slot_count,
            object_count,
        );
        let frame_layout = UniformLayout::new(
            std::mem::size_of::<FrameUniform>() as vk::DeviceSize,
            min_alignment,
            slot_count,
            1,
        );

        let object_buffer = allocator.create_buffer(
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            object_layout.buffer_size(),
            true,
        )?;
        let frame_buffer = allocator.create_buffer(
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            frame_layout.buffer_size(),
            true,
        )?;

        log::debug!(
            "Uniform stream: {} slots x {} objects, stride {} (alignment {})",
            slot_count,
            object_count,
            object_layout.stride(),
            min_alignment
        );

        Ok(Self {
            object_versions: RegionVersions::new(object_layout),
            object_layout,
            frame_layout,
            object_buffer,
            frame_buffer,
            min_alignment,
        })
    }

    /// Reallocate for a new slot count; keeps the buffers if the count is unchanged
    pub fn resize_slots(&mut self, allocator: &ResourceAllocator, slot_count: usize) -> VulkanResult<()> {
        if slot_count == self.object_layout.slot_count() {
            return Ok(());
        }
        *self = Self::new(
            allocator,
            self.min_alignment,
            slot_count,
            self.object_layout.objects_per_slot(),
        )?;
        Ok(())
    }

    /// Addressing of the per-object buffer
    pub fn object_layout(&self) -> &UniformLayout {
        &self.object_layout
    }

    /// Addressing of the per-frame buffer
    pub fn frame_layout(&self) -> &UniformLayout {
        &self.frame_layout
    }

    /// Backing buffer for object uniforms
    pub fn object_buffer(&self) -> &GpuBuffer {
        &self.object_buffer
    }

    /// Backing buffer for frame uniforms
    pub fn frame_buffer(&self) -> &GpuBuffer {
        &self.frame_buffer
    }

    /// Copy `payload` into region `(slot, object)`
    pub fn update_object_uniform(&mut self, slot: usize, object: usize, payload: &ObjectUniform) -> VulkanResult<()> {
        let region = self.object_layout.region(slot, object);
        self.object_buffer
            .write_bytes(region.offset, bytemuck::bytes_of(payload))
    }

    /// Write `payload` only if region `(slot, object)` has not seen `version` yet.
    ///
    /// Returns whether a write happened.
    pub fn update_object_if_stale(
        &mut self,
        slot: usize,
        object: usize,
        version: u64,
        payload: &ObjectUniform,
    ) -> VulkanResult<bool> {
        if !self.object_versions.is_stale(slot, object, version) {
            return Ok(false);
        }
        self.update_object_uniform(slot, object, payload)?;
        self.object_versions.mark_written(slot, object, version);
        Ok(true)
    }

    /// Copy `payload` into the frame region of `slot`
    pub fn update_frame_uniform(&mut self, slot: usize, payload: &FrameUniform) -> VulkanResult<()> {
        let region = self.frame_layout.region(slot, 0);
        self.frame_buffer
            .write_bytes(region.offset, bytemuck::bytes_of(payload))
    }

    /// Point each slot's descriptors at that slot's regions
    ///
    /// # Panics
    /// If the descriptor counts do not match the layout.
    pub fn bind_descriptors(&self, writer: DescriptorSetWriter, slots: &[SlotDescriptors<'_>]) -> DescriptorSetWriter {
        assert_eq!(slots.len(), self.object_layout.slot_count(), "descriptor slot count");

        let mut writer = writer;
        for (slot, descriptors) in slots.iter().enumerate() {
            let frame_region = self.frame_layout.region(slot, 0);
            writer = writer.write_buffer(
                descriptors.frame,
                0,
                self.frame_buffer.handle(),
                frame_region.offset,
                frame_region.range,
            );
            assert_eq!(
                descriptors.objects.len(),
                self.object_layout.objects_per_slot(),
                "object descriptor count for slot {slot}"
            );
        }

        for (slot, object, region) in binding_plan(&self.object_layout) {
            writer = writer.write_buffer(
                slots[slot].objects[object],
                0,
                self.object_buffer.handle(),
                region.offset,
                region.range,
            );
        }
        writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_covers_every_pair_once_in_slot_order() {
        let layout = UniformLayout::new(128, 256, 2, 3);
        let plan = binding_plan(&layout);

        assert_eq!(plan.len(), 6);
        assert_eq!(plan[0], (0, 0, layout.region(0, 0)));
        assert_eq!(plan[4].0, 1);
        assert_eq!(plan[4].1, 1);
        assert_eq!(plan[4].2.offset, 4 * 256);
        assert!(plan.windows(2).all(|w| w[0].2.offset < w[1].2.offset));
    }

    #[test]
    fn plan_is_empty_without_objects() {
        let layout = UniformLayout::new(128, 256, 3, 0);
        assert!(binding_plan(&layout).is_empty());
    }
}
