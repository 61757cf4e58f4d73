//! Thin RAII wrappers over `ash`
//!
//! Every type here owns exactly one kind of Vulkan object and releases it on
//! drop. Frame orchestration lives in the sibling `frame`, `uniform` and
//! `renderer` modules.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod framebuffer;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod swapchain;
pub mod sync;
pub mod upload;

pub use buffer::{GpuBuffer, ResourceAllocator};
pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use context::{LogicalDevice, PhysicalDeviceInfo, QueueFamilies, VulkanContext, VulkanInstance};
pub use descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter};
pub use error::{CallSite, VkResultExt, VulkanError, VulkanResult};
pub use framebuffer::{DepthBuffer, Framebuffer};
pub use memory::{find_memory_type, MemoryAccess};
pub use pipeline::{
    BlendState, DepthState, GraphicsPipeline, PipelineDesc, RasterState, ShaderModule, VertexInputState,
};
pub use render_pass::RenderPass;
pub use swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
pub use sync::{Fence, Semaphore};
pub use upload::UploadContext;
