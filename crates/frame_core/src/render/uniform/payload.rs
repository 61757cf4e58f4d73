//! Shader-visible uniform payloads
//!
//! Layouts match std140 `mat4` members in `scene.vert`.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{to_cols_array, Mat4};

/// Per-object data: set 1, binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectUniform {
    /// Object to world
    pub model: [[f32; 4]; 4],
    /// Object to clip space
    pub mvp: [[f32; 4]; 4],
}

impl ObjectUniform {
    /// Derive the payload from a model transform and the frame's camera
    pub fn new(model: &Mat4, frame: &FrameUniform) -> Self {
        let mvp = frame.projection_matrix() * frame.view_matrix() * model;
        Self {
            model: to_cols_array(model),
            mvp: to_cols_array(&mvp),
        }
    }
}

impl Default for ObjectUniform {
    fn default() -> Self {
        let identity = to_cols_array(&Mat4::identity());
        Self {
            model: identity,
            mvp: identity,
        }
    }
}

/// Per-frame data: set 0, binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniform {
    /// World to view
    pub view: [[f32; 4]; 4],
    /// View to clip space
    pub projection: [[f32; 4]; 4],
}

impl FrameUniform {
    /// Build from matrices
    pub fn new(view: &Mat4, projection: &Mat4) -> Self {
        Self {
            view: to_cols_array(view),
            projection: to_cols_array(projection),
        }
    }

    /// View matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from(self.view)
    }

    /// Projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::from(self.projection)
    }
}

impl Default for FrameUniform {
    fn default() -> Self {
        Self::new(&Mat4::identity(), &Mat4::identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn payload_sizes_match_shader_blocks() {
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 128);
        assert_eq!(std::mem::size_of::<FrameUniform>(), 128);
    }

    #[test]
    fn mvp_is_projection_view_model() {
        let view = Mat4::new_translation(&Vec3::new(0.0, 0.0, -3.0));
        let projection = Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 2.0, 1.0));
        let model = Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0));

        let frame = FrameUniform::new(&view, &projection);
        let object = ObjectUniform::new(&model, &frame);

        let expected = projection * view * model;
        assert_relative_eq!(Mat4::from(object.mvp), expected);
        assert_relative_eq!(Mat4::from(object.model), model);
    }
}
