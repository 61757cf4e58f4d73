//! Shader modules and graphics pipeline creation
//!
//! Fixed-function state is described per stage with small builder structs
//! ([`VertexInputState`], [`RasterState`], [`DepthState`], [`BlendState`]) that
//! [`PipelineDesc`] gathers. Viewport and scissor are dynamic so a pipeline
//! survives swapchain recreation.

use std::ffi::CStr;

use ash::{vk, Device};

use super::{VkResultExt, VulkanError, VulkanResult};

const ENTRY_POINT: &[u8] = b"main\0";

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a shader module from SPIR-V bytes
    pub fn from_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes))
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid SPIR-V: {e}")))?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let module = unsafe { device.create_shader_module(&create_info, None) }
            .check("vkCreateShaderModule")?;

        Ok(Self { device, module })
    }

    /// Get the shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    fn stage_info(&self, stage: vk::ShaderStageFlags, entry_point: &CStr) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(entry_point)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Vertex bindings and attributes
#[derive(Debug, Clone, Default)]
pub struct VertexInputState {
    /// Buffer bindings
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    /// Per-location attributes
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInputState {
    /// One interleaved per-vertex binding of `stride` bytes
    pub fn interleaved(stride: u32) -> Self {
        Self {
            bindings: vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            attributes: Vec::new(),
        }
    }

    /// Add an attribute on binding 0
    pub fn attribute(mut self, location: u32, format: vk::Format, offset: u32) -> Self {
        self.attributes.push(vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset,
        });
        self
    }
}

/// Rasterizer state
#[derive(Debug, Clone, Copy)]
pub struct RasterState {
    /// Faces to discard
    pub cull_mode: vk::CullModeFlags,
    /// Winding of front faces
    pub front_face: vk::FrontFace,
    /// Fill or wireframe
    pub polygon_mode: vk::PolygonMode,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            polygon_mode: vk::PolygonMode::FILL,
        }
    }
}

/// Depth test state
#[derive(Debug, Clone, Copy)]
pub struct DepthState {
    /// Compare against the depth buffer
    pub test: bool,
    /// Write passing fragments to the depth buffer
    pub write: bool,
    /// Comparison used when testing
    pub compare_op: vk::CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: true,
            write: true,
            compare_op: vk::CompareOp::LESS,
        }
    }
}

/// Colour blend state for the single colour attachment
#[derive(Debug, Clone, Copy, Default)]
pub enum BlendState {
    /// Overwrite
    Opaque,
    /// Source-alpha over destination
    #[default]
    AlphaBlend,
}

impl BlendState {
    fn attachment(self) -> vk::PipelineColorBlendAttachmentState {
        let builder = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        match self {
            Self::Opaque => builder.blend_enable(false).build(),
            Self::AlphaBlend => builder
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD)
                .build(),
        }
    }
}

/// Everything needed to build a graphics pipeline
pub struct PipelineDesc<'a> {
    /// Vertex stage
    pub vertex_shader: &'a ShaderModule,
    /// Fragment stage
    pub fragment_shader: &'a ShaderModule,
    /// Vertex layout
    pub vertex_input: VertexInputState,
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Rasterizer
    pub raster: RasterState,
    /// Depth test
    pub depth: DepthState,
    /// Colour blending
    pub blend: BlendState,
    /// Descriptor set layouts in set order
    pub set_layouts: &'a [vk::DescriptorSetLayout],
}

/// Graphics pipeline and its layout
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Build a pipeline for subpass 0 of `render_pass`
    pub fn new(device: Device, render_pass: vk::RenderPass, desc: &PipelineDesc<'_>) -> VulkanResult<Self> {
        let entry_point = CStr::from_bytes_with_nul(ENTRY_POINT).map_err(|e| {
            VulkanError::InitializationFailed(format!("bad shader entry point: {e}"))
        })?;

        let shader_stages = [
            desc.vertex_shader
                .stage_info(vk::ShaderStageFlags::VERTEX, entry_point),
            desc.fragment_shader
                .stage_info(vk::ShaderStageFlags::FRAGMENT, entry_point),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&desc.vertex_input.bindings)
            .vertex_attribute_descriptions(&desc.vertex_input.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(desc.topology)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(desc.raster.polygon_mode)
            .line_width(1.0)
            .cull_mode(desc.raster.cull_mode)
            .front_face(desc.raster.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(desc.depth.test)
            .depth_write_enable(desc.depth.write)
            .depth_compare_op(desc.depth.compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let color_blend_attachments = [desc.blend.attachment()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(desc.set_layouts);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .check("vkCreatePipelineLayout")?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };

        let pipeline = match pipelines {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, result)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(result).check("vkCreateGraphicsPipelines");
            }
        };

        let Some(pipeline) = pipeline else {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            return Err(VulkanError::InitializationFailed(
                "driver returned no pipeline".to_string(),
            ));
        };

        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }

    /// Get the pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get the pipeline layout
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_input_uses_binding_zero() {
        let input = VertexInputState::interleaved(28)
            .attribute(0, vk::Format::R32G32B32_SFLOAT, 0)
            .attribute(1, vk::Format::R32G32B32A32_SFLOAT, 12);

        assert_eq!(input.bindings.len(), 1);
        assert_eq!(input.bindings[0].stride, 28);
        assert_eq!(input.attributes[1].offset, 12);
        assert!(input.attributes.iter().all(|a| a.binding == 0));
    }

    #[test]
    fn default_raster_culls_counter_clockwise_faces() {
        let raster = RasterState::default();
        assert_eq!(raster.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(raster.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(raster.polygon_mode, vk::PolygonMode::FILL);
    }

    #[test]
    fn alpha_blend_enables_blending() {
        assert_eq!(BlendState::AlphaBlend.attachment().blend_enable, vk::TRUE);
        assert_eq!(BlendState::Opaque.attachment().blend_enable, vk::FALSE);
    }
}
