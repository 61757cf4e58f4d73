//! Math types used for shader-visible payloads

pub use nalgebra::{Matrix4, Point3, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Column-major array form expected by GLSL `mat4`
pub fn to_cols_array(m: &Mat4) -> [[f32; 4]; 4] {
    (*m).into()
}

/// Right-handed perspective projection for Vulkan clip space.
///
/// Y points down in clip space and depth maps to `[0, 1]`.
pub fn vulkan_perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    #[rustfmt::skip]
    let clip_correction = Mat4::new(
        1.0,  0.0, 0.0, 0.0,
        0.0, -1.0, 0.0, 0.0,
        0.0,  0.0, 0.5, 0.5,
        0.0,  0.0, 0.0, 1.0,
    );
    clip_correction * Mat4::new_perspective(aspect, fov_y, near, far)
}

/// Right-handed view matrix looking from `eye` at `target`
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
}

/// Rotation about Z followed by a translation
pub fn spin_about_z(angle: f32, translation: Vec3) -> Mat4 {
    Mat4::new_translation(&translation) * Mat4::from_axis_angle(&Vector3::z_axis(), angle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cols_array_is_column_major() {
        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let cols = to_cols_array(&m);
        assert_eq!(cols[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(cols[0], [1.0, 0.0, 0.0, 0.0]);
    }

    fn project(m: &Mat4, x: f32, y: f32, z: f32) -> nalgebra::Vector4<f32> {
        let clip = m * nalgebra::Vector4::new(x, y, z, 1.0);
        clip / clip.w
    }

    #[test]
    fn perspective_maps_depth_to_unit_range() {
        let proj = vulkan_perspective(45f32.to_radians(), 1.5, 0.1, 100.0);
        assert_relative_eq!(project(&proj, 0.0, 0.0, -0.1).z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(project(&proj, 0.0, 0.0, -100.0).z, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn perspective_points_y_down() {
        let proj = vulkan_perspective(45f32.to_radians(), 1.0, 0.1, 100.0);
        assert!(project(&proj, 0.0, 1.0, -3.0).y < 0.0);
        assert!(project(&proj, 1.0, 0.0, -3.0).x > 0.0);
    }

    #[test]
    fn look_at_moves_target_onto_negative_z() {
        let view = look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::zeros(), Vec3::y());
        let p = view.transform_point(&Point3::origin());
        assert_relative_eq!(p.z, -3.0, epsilon = 1e-6);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn spin_rotates_before_translating() {
        let m = spin_about_z(std::f32::consts::FRAC_PI_2, Vec3::new(-1.0, 0.0, 0.0));
        let p = m.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-6);
    }
}
