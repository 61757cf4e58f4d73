//! Uniform region addressing
//!
//! A persistent uniform buffer is split into `slot_count * objects_per_slot`
//! regions of `stride` bytes. Region `(slot, object)` starts at
//! `(slot * objects_per_slot + object) * stride`, so no two pairs share bytes
//! and every offset satisfies the device's minimum uniform offset alignment.

use ash::vk;

/// Round `size` up to the next multiple of `alignment` (0 is treated as 1)
pub fn align_up(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    let alignment = alignment.max(1);
    size.div_ceil(alignment) * alignment
}

/// Byte range of one `(slot, object)` region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformRegion {
    /// Offset from the start of the buffer
    pub offset: vk::DeviceSize,
    /// Bytes the shader sees; the payload size, not the stride
    pub range: vk::DeviceSize,
}

/// Address space of one uniform buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLayout {
    payload_size: vk::DeviceSize,
    stride: vk::DeviceSize,
    slot_count: usize,
    objects_per_slot: usize,
}

impl UniformLayout {
    /// Lay out `slot_count * objects_per_slot` regions for a payload of `payload_size` bytes
    pub fn new(
        payload_size: vk::DeviceSize,
        min_alignment: vk::DeviceSize,
        slot_count: usize,
        objects_per_slot: usize,
    ) -> Self {
        Self {
            payload_size,
            stride: align_up(payload_size, min_alignment),
            slot_count,
            objects_per_slot,
        }
    }

    /// Payload size rounded up to the alignment
    pub fn stride(&self) -> vk::DeviceSize {
        self.stride
    }

    /// Size of one payload
    pub fn payload_size(&self) -> vk::DeviceSize {
        self.payload_size
    }

    /// Number of frame slots addressed
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Number of objects per slot
    pub fn objects_per_slot(&self) -> usize {
        self.objects_per_slot
    }

    /// Total number of regions
    pub fn region_count(&self) -> usize {
        self.slot_count * self.objects_per_slot
    }

    /// Bytes needed to back every region; never zero so a buffer can still be created
    pub fn buffer_size(&self) -> vk::DeviceSize {
        (self.region_count() as vk::DeviceSize * self.stride).max(self.stride.max(1))
    }

    /// Flat index of `(slot, object)`
    ///
    /// # Panics
    /// If the pair lies outside the address space.
    pub fn index(&self, slot: usize, object: usize) -> usize {
        assert!(
            slot < self.slot_count && object < self.objects_per_slot,
            "uniform region ({}, {}) outside {} slots x {} objects",
            slot,
            object,
            self.slot_count,
            self.objects_per_slot
        );
        slot * self.objects_per_slot + object
    }

    /// Byte offset of region `(slot, object)`
    ///
    /// # Panics
    /// If the pair lies outside the address space.
    pub fn offset(&self, slot: usize, object: usize) -> vk::DeviceSize {
        self.index(slot, object) as vk::DeviceSize * self.stride
    }

    /// Offset and range of region `(slot, object)`
    pub fn region(&self, slot: usize, object: usize) -> UniformRegion {
        UniformRegion {
            offset: self.offset(slot, object),
            range: self.payload_size,
        }
    }
}

/// Which version of each render item every region last received
#[derive(Debug, Clone)]
pub struct RegionVersions {
    layout: UniformLayout,
    written: Vec<Option<u64>>,
}

impl RegionVersions {
    /// Nothing written yet
    pub fn new(layout: UniformLayout) -> Self {
        Self {
            written: vec![None; layout.region_count()],
            layout,
        }
    }

    /// Whether region `(slot, object)` holds something older than `version`
    pub fn is_stale(&self, slot: usize, object: usize, version: u64) -> bool {
        self.written[self.layout.index(slot, object)] != Some(version)
    }

    /// Record that `version` now sits in region `(slot, object)`
    pub fn mark_written(&mut self, slot: usize, object: usize, version: u64) {
        let index = self.layout.index(slot, object);
        self.written[index] = Some(version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn stride_rounds_up_to_alignment() {
        let layout = UniformLayout::new(68, 256, 3, 4);
        assert_eq!(layout.stride(), 256);
        assert_eq!(UniformLayout::new(256, 256, 1, 1).stride(), 256);
        assert_eq!(UniformLayout::new(257, 256, 1, 1).stride(), 512);
        assert_eq!(UniformLayout::new(128, 64, 1, 1).stride(), 128);
    }

    #[test]
    fn region_two_three_of_four_objects() {
        let layout = UniformLayout::new(68, 256, 3, 4);
        assert_eq!(layout.offset(2, 3), (2 * 4 + 3) * 256);
        assert_eq!(layout.offset(2, 3), 2816);
        assert_eq!(layout.region(2, 3).range, 68);
    }

    #[test]
    fn zero_alignment_means_packed() {
        assert_eq!(align_up(68, 0), 68);
        assert_eq!(align_up(68, 1), 68);
        assert_eq!(align_up(0, 256), 0);
    }

    #[test]
    fn addressing_is_injective_and_aligned() {
        for alignment in [16u64, 64, 256] {
            for slots in 2..=4 {
                for objects in 0..=5 {
                    let layout = UniformLayout::new(136, alignment, slots, objects);
                    let mut seen = HashSet::new();
                    for slot in 0..slots {
                        for object in 0..objects {
                            let region = layout.region(slot, object);
                            assert_eq!(region.offset % alignment, 0);
                            assert!(region.offset + layout.stride() <= layout.buffer_size());
                            assert!(seen.insert(region.offset), "({slot}, {object}) aliases");
                        }
                    }
                    assert_eq!(seen.len(), layout.region_count());
                }
            }
        }
    }

    #[test]
    fn empty_scene_still_sizes_a_buffer() {
        let layout = UniformLayout::new(128, 256, 3, 0);
        assert_eq!(layout.region_count(), 0);
        assert_eq!(layout.buffer_size(), 256);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn object_out_of_range_panics() {
        UniformLayout::new(68, 256, 2, 1).offset(0, 1);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn slot_out_of_range_panics() {
        UniformLayout::new(68, 256, 2, 1).offset(2, 0);
    }

    #[test]
    fn versions_track_each_region_separately() {
        let layout = UniformLayout::new(64, 256, 2, 2);
        let mut versions = RegionVersions::new(layout);

        assert!(versions.is_stale(0, 0, 0));
        versions.mark_written(0, 0, 0);
        assert!(!versions.is_stale(0, 0, 0));
        // the other slot still needs the same version
        assert!(versions.is_stale(1, 0, 0));
        assert!(versions.is_stale(0, 0, 1));
    }
}
