//! Memory type selection
//!
//! A naive allocator: every resource gets its own `vkAllocateMemory` call, and
//! the memory type is the first one that matches. There is no fallback when the
//! requested properties are unavailable.

use ash::vk;

use super::{VulkanError, VulkanResult};

/// Who needs to touch an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAccess {
    /// GPU only; filled through the upload path
    DeviceLocal,
    /// Mapped and written by the CPU, coherent without explicit flushes
    HostVisible,
}

impl MemoryAccess {
    /// Property flags an allocation with this access must carry
    pub fn required_properties(self) -> vk::MemoryPropertyFlags {
        match self {
            Self::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            Self::HostVisible => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    /// Pick the access from a "CPU writes this buffer" flag
    pub fn from_host_visible(host_visible: bool) -> Self {
        if host_visible {
            Self::HostVisible
        } else {
            Self::DeviceLocal
        }
    }
}

/// Find memory type with required properties.
///
/// Linear scan: the first index whose bit is set in `type_filter` and whose
/// property flags are a superset of `properties`. `requested` only feeds the
/// error.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
    requested: vk::DeviceSize,
) -> VulkanResult<u32> {
    let count = memory_properties
        .memory_type_count
        .min(vk::MAX_MEMORY_TYPES as u32);

    (0..count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(VulkanError::OutOfMemory {
            requested,
            properties,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = types.len() as u32;
        for (slot, flags) in props.memory_types.iter_mut().zip(types) {
            *slot = vk::MemoryType {
                property_flags: *flags,
                heap_index: 0,
            };
        }
        props
    }

    fn typical_discrete_gpu() -> vk::PhysicalDeviceMemoryProperties {
        properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ])
    }

    #[test]
    fn picks_first_matching_index() {
        let props = typical_discrete_gpu();

        let device_local = find_memory_type(
            &props,
            0b111,
            MemoryAccess::DeviceLocal.required_properties(),
            256,
        );
        assert_eq!(device_local.unwrap(), 0);

        let host = find_memory_type(
            &props,
            0b111,
            MemoryAccess::HostVisible.required_properties(),
            256,
        );
        assert_eq!(host.unwrap(), 1);
    }

    #[test]
    fn respects_type_bits() {
        let props = typical_discrete_gpu();
        let host = find_memory_type(
            &props,
            0b100,
            MemoryAccess::HostVisible.required_properties(),
            256,
        );
        assert_eq!(host.unwrap(), 2);
    }

    #[test]
    fn superset_of_flags_matches() {
        let props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL
            | vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT]);
        let index = find_memory_type(
            &props,
            0b1,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            16,
        );
        assert_eq!(index.unwrap(), 0);
    }

    #[test]
    fn unavailable_properties_are_out_of_memory() {
        let props = typical_discrete_gpu();
        let err = find_memory_type(
            &props,
            u32::MAX,
            vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
            4096,
        )
        .unwrap_err();

        match err {
            VulkanError::OutOfMemory {
                requested,
                properties,
            } => {
                assert_eq!(requested, 4096);
                assert_eq!(properties, vk::MemoryPropertyFlags::LAZILY_ALLOCATED);
            }
            other => panic!("expected OutOfMemory, got {other:?}"),
        }
    }

    #[test]
    fn type_bits_with_no_matching_type_are_out_of_memory() {
        let props = typical_discrete_gpu();
        let err = find_memory_type(&props, 0b001, MemoryAccess::HostVisible.required_properties(), 1);
        assert!(matches!(err, Err(VulkanError::OutOfMemory { .. })));
    }

    #[test]
    fn host_flag_maps_to_access() {
        assert_eq!(MemoryAccess::from_host_visible(true), MemoryAccess::HostVisible);
        assert_eq!(MemoryAccess::from_host_visible(false), MemoryAccess::DeviceLocal);
    }
}
