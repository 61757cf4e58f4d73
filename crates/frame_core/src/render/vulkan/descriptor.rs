//! Descriptor set layouts, pools and uniform-buffer writes

use ash::{vk, Device};

use super::{VkResultExt, VulkanResult};

/// Descriptor set layout builder for creating reusable layouts
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .check("vkCreateDescriptorSetLayout")?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
        })
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Pool sized for a fixed number of single-uniform-buffer sets
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Create a pool holding `max_sets` sets with one uniform buffer each
    pub fn new(device: Device, max_sets: u32) -> VulkanResult<Self> {
        let max_sets = max_sets.max(1);
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: max_sets,
        }];

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .check("vkCreateDescriptorPool")?;

        Ok(Self { pool, device })
    }

    /// Allocate `count` sets sharing one layout
    pub fn allocate(
        &self,
        layout: &DescriptorSetLayout,
        count: usize,
    ) -> VulkanResult<Vec<vk::DescriptorSet>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let layouts = vec![layout.handle(); count];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .check("vkAllocateDescriptorSets")
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            // Frees every set allocated from the pool
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Batches uniform-buffer descriptor writes into one `vkUpdateDescriptorSets`
#[derive(Default)]
pub struct DescriptorSetWriter {
    entries: Vec<(vk::DescriptorSet, u32, vk::DescriptorBufferInfo)>,
}

impl DescriptorSetWriter {
    /// Create a new descriptor set writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `binding` of `descriptor_set` at `range` bytes of `buffer` starting at `offset`
    pub fn write_buffer(
        mut self,
        descriptor_set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> Self {
        self.entries.push((
            descriptor_set,
            binding,
            vk::DescriptorBufferInfo {
                buffer,
                offset,
                range,
            },
        ));
        self
    }

    /// Apply every queued write
    pub fn update(self, device: &Device) {
        // The buffer infos stay put in `self.entries` while the writes point at them
        let writes: Vec<vk::WriteDescriptorSet> = self
            .entries
            .iter()
            .map(|(set, binding, info)| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
                    .build()
            })
            .collect();

        if !writes.is_empty() {
            unsafe { device.update_descriptor_sets(&writes, &[]) };
        }
    }
}
