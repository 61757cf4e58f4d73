//! The demo scene: a spinning triangle and a spinning square

use std::collections::HashMap;

use frame_core::foundation::math::Vec3;
use frame_core::render::{MeshData, RenderItemDesc, SceneDescription, SubmeshRange, Vertex};

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

/// Triangle on the left, square on the right, sharing one vertex list
pub fn triangle_and_square() -> SceneDescription {
    let vertices = vec![
        Vertex::new([0.0, 0.5, 0.0], RED),
        Vertex::new([0.5, -0.5, 0.0], GREEN),
        Vertex::new([-0.5, -0.5, 0.0], BLUE),
        Vertex::new([0.5, 0.5, 0.0], GREEN),
        Vertex::new([-0.5, 0.5, 0.0], BLUE),
    ];
    let indices = vec![0, 1, 2, 1, 2, 4, 1, 4, 3];

    let submeshes = HashMap::from([
        (
            "Triangle".to_string(),
            SubmeshRange {
                index_count: 3,
                first_index: 0,
                vertex_offset: 0,
            },
        ),
        (
            "Square".to_string(),
            SubmeshRange {
                index_count: 6,
                first_index: 3,
                vertex_offset: 0,
            },
        ),
    ]);

    SceneDescription {
        mesh: MeshData {
            vertices,
            indices,
            submeshes,
        },
        items: vec![
            RenderItemDesc {
                submesh: "Triangle".to_string(),
                translation: Vec3::new(-1.0, 0.0, 0.0),
            },
            RenderItemDesc {
                submesh: "Square".to_string(),
                translation: Vec3::new(1.0, 0.0, 0.0),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_scene_is_consistent() {
        let scene = triangle_and_square();
        assert!(scene.mesh.validate().is_ok());
        for item in &scene.items {
            assert!(scene.mesh.submesh(&item.submesh).is_some(), "{}", item.submesh);
        }
        assert_eq!(scene.mesh.submesh("Square").unwrap().first_index, 3);
    }

    // With back-face culling and clockwise front faces, every triangle must
    // wind clockwise on screen (Y down) or it disappears.
    #[test]
    fn every_triangle_faces_the_camera() {
        use frame_core::foundation::math::{look_at, spin_about_z, vulkan_perspective, Point3};

        let scene = triangle_and_square();
        let view = look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::zeros(), Vec3::y());
        let projection = vulkan_perspective(45f32.to_radians(), 800.0 / 600.0, 0.1, 100.0);

        for item in &scene.items {
            let range = scene.mesh.submesh(&item.submesh).unwrap();
            let first = range.first_index as usize;
            let indices = &scene.mesh.indices[first..first + range.index_count as usize];

            for angle in [0.0f32, 1.0, 2.5, 4.0, 6.0] {
                let mvp = projection * view * spin_about_z(angle, item.translation);
                for triangle in indices.chunks(3) {
                    let screen: Vec<Point3<f32>> = triangle
                        .iter()
                        .map(|&i| {
                            let vertex = scene.mesh.vertices[(i as i64 + i64::from(range.vertex_offset)) as usize];
                            let [x, y, z] = vertex.position;
                            mvp.transform_point(&Point3::new(x, y, z))
                        })
                        .collect();

                    let twice_area: f32 = (0..3)
                        .map(|k| {
                            let (a, b) = (screen[k], screen[(k + 1) % 3]);
                            a.x * b.y - b.x * a.y
                        })
                        .sum();
                    assert!(
                        twice_area > 0.0,
                        "{} triangle {:?} winds counter-clockwise at angle {}",
                        item.submesh,
                        triangle,
                        angle
                    );
                }
            }
        }
    }
}
