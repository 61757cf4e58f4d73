//! Scene input: shared mesh geometry and the render items drawn from it

use std::collections::HashMap;

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{spin_about_z, Mat4, Vec3};
use crate::render::uniform::{FrameUniform, ObjectUniform};
use crate::render::vulkan::{GpuBuffer, UploadContext, VertexInputState, VulkanError, VulkanResult};

/// Interleaved vertex: position then colour
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// RGBA colour
    pub color: [f32; 4],
}

impl Vertex {
    /// Vertex with a position and colour
    pub const fn new(position: [f32; 3], color: [f32; 4]) -> Self {
        Self { position, color }
    }

    /// Pipeline vertex input for this layout
    pub fn input_state() -> VertexInputState {
        VertexInputState::interleaved(std::mem::size_of::<Self>() as u32)
            .attribute(0, vk::Format::R32G32B32_SFLOAT, 0)
            .attribute(
                1,
                vk::Format::R32G32B32A32_SFLOAT,
                std::mem::size_of::<[f32; 3]>() as u32,
            )
    }
}

/// Range of the shared index buffer that forms one shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmeshRange {
    /// Number of indices to draw
    pub index_count: u32,
    /// First index in the index buffer
    pub first_index: u32,
    /// Added to every index before fetching a vertex
    pub vertex_offset: i32,
}

/// CPU-side geometry: one vertex list, one index list, named sub-ranges
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// Shared vertices
    pub vertices: Vec<Vertex>,
    /// Shared 32-bit indices
    pub indices: Vec<u32>,
    /// Named index ranges
    pub submeshes: HashMap<String, SubmeshRange>,
}

impl MeshData {
    /// Look up a sub-range by name
    pub fn submesh(&self, name: &str) -> Option<SubmeshRange> {
        self.submeshes.get(name).copied()
    }

    /// Check that every sub-range stays inside the index and vertex lists
    pub fn validate(&self) -> VulkanResult<()> {
        for (name, range) in &self.submeshes {
            let end = range.first_index as usize + range.index_count as usize;
            let indices = self.indices.get(range.first_index as usize..end).ok_or_else(|| {
                VulkanError::InvalidOperation {
                    reason: format!("submesh '{name}' reads indices past {}", self.indices.len()),
                }
            })?;

            let out_of_range = indices.iter().any(|&i| {
                let vertex = i64::from(i) + i64::from(range.vertex_offset);
                vertex < 0 || vertex >= self.vertices.len() as i64
            });
            if out_of_range {
                return Err(VulkanError::InvalidOperation {
                    reason: format!("submesh '{name}' references a missing vertex"),
                });
            }
        }
        Ok(())
    }
}

/// GPU-resident copy of a [`MeshData`]
pub struct MeshGeometry {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    submeshes: HashMap<String, SubmeshRange>,
}

impl MeshGeometry {
    /// Upload vertices and indices into device-local buffers
    pub fn upload(upload: &UploadContext, data: &MeshData) -> VulkanResult<Self> {
        data.validate()?;
        if data.vertices.is_empty() || data.indices.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "mesh has no vertices or indices".to_string(),
            });
        }

        let vertex_buffer = upload.create_device_local_buffer(
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&data.vertices),
        )?;
        let index_buffer = upload.create_device_local_buffer(
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&data.indices),
        )?;

        log::debug!(
            "Mesh uploaded: {} vertices, {} indices, {} submeshes",
            data.vertices.len(),
            data.indices.len(),
            data.submeshes.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            submeshes: data.submeshes.clone(),
        })
    }

    /// Vertex buffer handle
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    /// Index buffer handle (32-bit indices)
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    /// Look up a sub-range by name
    pub fn submesh(&self, name: &str) -> Option<SubmeshRange> {
        self.submeshes.get(name).copied()
    }
}

/// Scene-build input for one render item
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItemDesc {
    /// Name of the sub-range to draw
    pub submesh: String,
    /// Position the item spins around
    pub translation: Vec3,
}

/// Everything the renderer needs to build its scene once
#[derive(Debug, Clone, Default)]
pub struct SceneDescription {
    /// Shared geometry
    pub mesh: MeshData,
    /// Items in draw order; the position is the object index
    pub items: Vec<RenderItemDesc>,
}

/// A drawable: one sub-range plus its per-object uniform payload
#[derive(Debug, Clone)]
pub struct RenderItem {
    submesh: SubmeshRange,
    translation: Vec3,
    model: Mat4,
    uniform: ObjectUniform,
    version: u64,
}

impl RenderItem {
    /// Item at `translation` with no rotation yet
    pub fn new(submesh: SubmeshRange, translation: Vec3) -> Self {
        Self {
            submesh,
            translation,
            model: Mat4::new_translation(&translation),
            uniform: ObjectUniform::default(),
            version: 0,
        }
    }

    /// Index range to draw
    pub fn submesh(&self) -> SubmeshRange {
        self.submesh
    }

    /// Current model transform
    pub fn model(&self) -> &Mat4 {
        &self.model
    }

    /// Payload for the shader
    pub fn uniform(&self) -> &ObjectUniform {
        &self.uniform
    }

    /// Bumped whenever the payload changes
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Spin about Z by `angle` around the item's own translation and rederive the payload
    pub fn spin(&mut self, angle: f32, frame: &FrameUniform) {
        self.set_model(spin_about_z(angle, self.translation), frame);
    }

    /// Replace the model transform and rederive the payload
    pub fn set_model(&mut self, model: Mat4, frame: &FrameUniform) {
        self.model = model;
        self.refresh(frame);
    }

    /// Rederive the payload, e.g. after the camera changed
    pub fn refresh(&mut self, frame: &FrameUniform) {
        let uniform = ObjectUniform::new(&self.model, frame);
        if uniform != self.uniform {
            self.uniform = uniform;
            self.version += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshData {
        let white = [1.0; 4];
        MeshData {
            vertices: vec![
                Vertex::new([0.5, 0.5, 0.0], white),
                Vertex::new([-0.5, 0.5, 0.0], white),
                Vertex::new([-0.5, -0.5, 0.0], white),
                Vertex::new([0.5, -0.5, 0.0], white),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            submeshes: HashMap::from([(
                "Quad".to_string(),
                SubmeshRange {
                    index_count: 6,
                    first_index: 0,
                    vertex_offset: 0,
                },
            )]),
        }
    }

    #[test]
    fn vertex_layout_matches_input_state() {
        assert_eq!(std::mem::size_of::<Vertex>(), 28);
        let input = Vertex::input_state();
        assert_eq!(input.bindings[0].stride, 28);
        assert_eq!(input.attributes[1].offset, 12);
    }

    #[test]
    fn valid_mesh_passes() {
        assert!(quad().validate().is_ok());
        assert_eq!(quad().submesh("Quad").unwrap().index_count, 6);
        assert!(quad().submesh("Triangle").is_none());
    }

    #[test]
    fn range_past_index_list_is_rejected() {
        let mut mesh = quad();
        mesh.submeshes.insert(
            "Broken".to_string(),
            SubmeshRange {
                index_count: 3,
                first_index: 5,
                vertex_offset: 0,
            },
        );
        assert!(matches!(mesh.validate(), Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn vertex_offset_is_checked() {
        let mut mesh = quad();
        mesh.submeshes.insert(
            "Shifted".to_string(),
            SubmeshRange {
                index_count: 3,
                first_index: 0,
                vertex_offset: 2,
            },
        );
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn version_changes_only_with_payload() {
        let frame = FrameUniform::default();
        let range = quad().submesh("Quad").unwrap();
        let mut item = RenderItem::new(range, Vec3::new(1.0, 0.0, 0.0));

        item.spin(0.5, &frame);
        let after_spin = item.version();
        assert_eq!(after_spin, 1);

        item.spin(0.5, &frame);
        assert_eq!(item.version(), after_spin);

        item.spin(0.75, &frame);
        assert_eq!(item.version(), after_spin + 1);
    }
}
