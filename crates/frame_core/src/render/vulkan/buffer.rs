//! Buffer management for vertex, index, staging and uniform data
//!
//! Each [`GpuBuffer`] owns its handle and a dedicated memory allocation and
//! releases both on drop. Transient buffers can be destroyed early with
//! [`GpuBuffer::destroy`]; destroying twice is a programmer error and panics.

use ash::{vk, Device};

use super::memory::{find_memory_type, MemoryAccess};
use super::{VkResultExt, VulkanResult};

/// Creates buffers against one device's memory heaps
#[derive(Clone)]
pub struct ResourceAllocator {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    sharing_families: Vec<u32>,
}

impl ResourceAllocator {
    /// Create an allocator for `device` using the physical device's memory layout
    pub fn new(device: Device, memory_properties: vk::PhysicalDeviceMemoryProperties) -> Self {
        Self {
            device,
            memory_properties,
            sharing_families: Vec::new(),
        }
    }

    /// Share buffers between these queue families instead of owning them exclusively.
    ///
    /// Needed when uploads run on a transfer family distinct from graphics.
    pub fn with_queue_families(mut self, families: &[u32]) -> Self {
        let mut families = families.to_vec();
        families.sort_unstable();
        families.dedup();
        self.sharing_families = families;
        self
    }

    /// Memory layout used for type selection
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Logical device the allocator creates resources on
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Allocate a buffer with its own memory.
    ///
    /// Fails with `OutOfMemory` when no memory type satisfies both the buffer's
    /// type bits and the access flags.
    pub fn create_buffer(
        &self,
        usage: vk::BufferUsageFlags,
        size: vk::DeviceSize,
        host_visible: bool,
    ) -> VulkanResult<GpuBuffer> {
        let access = MemoryAccess::from_host_visible(host_visible);

        let buffer_info = vk::BufferCreateInfo::builder().size(size).usage(usage);
        let buffer_info = if self.sharing_families.len() > 1 {
            buffer_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&self.sharing_families)
        } else {
            buffer_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }.check("vkCreateBuffer")?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let memory = match self.allocate(requirements, access.required_properties(), size) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }
            .check("vkBindBufferMemory")
        {
            unsafe {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
            }
            return Err(e);
        }

        log::trace!(
            "Created {:?} buffer of {} bytes ({:?})",
            usage,
            size,
            access
        );

        Ok(GpuBuffer {
            device: self.device.clone(),
            buffer,
            memory,
            size,
            access,
        })
    }

    /// Allocate memory for an image or buffer with the given requirements
    pub fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
        requested: vk::DeviceSize,
    ) -> VulkanResult<vk::DeviceMemory> {
        let memory_type_index = find_memory_type(
            &self.memory_properties,
            requirements.memory_type_bits,
            properties,
            requested,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        unsafe { self.device.allocate_memory(&alloc_info, None) }.check("vkAllocateMemory")
    }
}

/// Buffer handle plus its backing memory
pub struct GpuBuffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    access: MemoryAccess,
}

impl GpuBuffer {
    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Requested size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Whether the CPU may map this buffer
    pub fn is_host_visible(&self) -> bool {
        self.access == MemoryAccess::HostVisible
    }

    /// False once [`destroy`](Self::destroy) has run
    pub fn is_live(&self) -> bool {
        self.buffer != vk::Buffer::null()
    }

    /// Map exactly `offset..offset + data.len()`, copy, unmap
    pub fn write_bytes(&self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        let len = data.len() as vk::DeviceSize;
        self.assert_mappable(offset, len);
        if data.is_empty() {
            return Ok(());
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, offset, len, vk::MemoryMapFlags::empty())
                .check("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Copy `len` bytes starting at `offset` out of a mapped buffer
    pub fn read_bytes(&self, offset: vk::DeviceSize, len: usize) -> VulkanResult<Vec<u8>> {
        self.assert_mappable(offset, len as vk::DeviceSize);
        let mut out = vec![0u8; len];
        if len == 0 {
            return Ok(out);
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(
                    self.memory,
                    offset,
                    len as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .check("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), out.as_mut_ptr(), len);
            self.device.unmap_memory(self.memory);
        }
        Ok(out)
    }

    /// Release memory and handle now and zero the descriptor.
    ///
    /// # Panics
    /// If the buffer was already destroyed.
    pub fn destroy(&mut self) {
        assert!(self.is_live(), "GpuBuffer destroyed twice");
        self.release();
    }

    fn release(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
        self.buffer = vk::Buffer::null();
        self.memory = vk::DeviceMemory::null();
        self.size = 0;
    }

    fn assert_mappable(&self, offset: vk::DeviceSize, len: vk::DeviceSize) {
        assert!(self.is_live(), "mapping a destroyed buffer");
        assert!(self.is_host_visible(), "mapping a device-local buffer");
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.size),
            "range {}..{} outside buffer of {} bytes",
            offset,
            offset.saturating_add(len),
            self.size
        );
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if self.is_live() {
            self.release();
        }
    }
}
