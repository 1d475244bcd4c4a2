//! Built-in meshes: the full-screen quad every screen-space pass draws, and simple
//! shapes for the default scene and light markers.

use glam::{Vec2, Vec3};
use std::f32::consts::PI;

use super::mesh::{location, Mesh, MeshBuilder, VertexLayout};

/// Position, normal, uv, tangent, bitangent.
pub fn lit_layout() -> VertexLayout {
    VertexLayout::packed(&[
        (location::POSITION, 3),
        (location::NORMAL, 3),
        (location::TEXCOORD, 2),
        (location::TANGENT, 3),
        (location::BITANGENT, 3),
    ])
}

#[derive(Default)]
struct LitVertices {
    floats: Vec<f32>,
    count: u32,
}

impl LitVertices {
    fn push(&mut self, position: Vec3, normal: Vec3, uv: Vec2, tangent: Vec3) -> u32 {
        let bitangent = normal.cross(tangent);
        self.floats.extend_from_slice(&position.to_array());
        self.floats.extend_from_slice(&normal.to_array());
        self.floats.extend_from_slice(&uv.to_array());
        self.floats.extend_from_slice(&tangent.to_array());
        self.floats.extend_from_slice(&bitangent.to_array());
        self.count += 1;
        self.count - 1
    }
}

fn single(name: &str, layout: VertexLayout, floats: &[f32], indices: &[u32]) -> Mesh {
    let mut builder = MeshBuilder::new();
    builder.push(layout, floats, indices);
    builder.build(name)
}

/// Two triangles covering clip space. Only position (z = 0) and uv, uv origin top-left.
pub fn fullscreen_quad() -> Mesh {
    #[rustfmt::skip]
    let floats = [
        -1.0, -1.0, 0.0,   0.0, 1.0,
         1.0, -1.0, 0.0,   1.0, 1.0,
         1.0,  1.0, 0.0,   1.0, 0.0,
        -1.0,  1.0, 0.0,   0.0, 0.0,
    ];
    single(
        "fullscreen quad",
        VertexLayout::packed(&[(location::POSITION, 3), (location::TEXCOORD, 2)]),
        &floats,
        &[0, 1, 2, 0, 2, 3],
    )
}

/// Square in the XZ plane facing +Y, `size` across, uvs repeated `tiling` times.
pub fn plane(size: f32, tiling: f32) -> Mesh {
    let mut vertices = LitVertices::default();
    let h = size * 0.5;
    let corners = [(-h, h, 0.0, tiling), (h, h, tiling, tiling), (h, -h, tiling, 0.0), (-h, -h, 0.0, 0.0)];
    for (x, z, u, v) in corners {
        vertices.push(Vec3::new(x, 0.0, z), Vec3::Y, Vec2::new(u, v), Vec3::X);
    }
    single("plane", lit_layout(), &vertices.floats, &[0, 1, 2, 0, 2, 3])
}

/// Unit cube centred on the origin, counter-clockwise faces seen from outside.
pub fn cube() -> Mesh {
    let faces = [
        (Vec3::X, Vec3::Y),
        (Vec3::NEG_X, Vec3::Y),
        (Vec3::Z, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y),
        (Vec3::Y, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::Z),
    ];
    let mut vertices = LitVertices::default();
    let mut indices = Vec::new();
    for (normal, up) in faces {
        let right = up.cross(normal);
        let centre = normal * 0.5;
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        let base = vertices.count;
        for (s, t) in corners {
            let position = centre + right * (s * 0.5) + up * (t * 0.5);
            let uv = Vec2::new((s + 1.0) * 0.5, 1.0 - (t + 1.0) * 0.5);
            vertices.push(position, normal, uv, right);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    single("cube", lit_layout(), &vertices.floats, &indices)
}

/// UV sphere of radius 0.5.
pub fn sphere(segments: u32, rings: u32) -> Mesh {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut vertices = LitVertices::default();
    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
            let tangent = Vec3::new(-theta.sin(), 0.0, theta.cos());
            let uv = Vec2::new(segment as f32 / segments as f32, ring as f32 / rings as f32);
            vertices.push(normal * 0.5, normal, uv, tangent);
        }
    }

    let mut indices = Vec::new();
    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;
            indices.extend_from_slice(&[current, current + 1, next]);
            indices.extend_from_slice(&[current + 1, next + 1, next]);
        }
    }
    single("sphere", lit_layout(), &vertices.floats, &indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(mesh: &Mesh) -> Vec<Vec3> {
        let floats: &[f32] = bytemuck::cast_slice(&mesh.vertex_data);
        let stride = (mesh.submeshes[0].layout.stride / 4) as usize;
        floats
            .chunks(stride)
            .map(|v| Vec3::new(v[0], v[1], v[2]))
            .collect()
    }

    /// Every triangle's winding normal points away from the centre.
    fn assert_outward(mesh: &Mesh) {
        let p = positions(mesh);
        for tri in mesh.index_data.chunks(3) {
            let (a, b, c) = (p[tri[0] as usize], p[tri[1] as usize], p[tri[2] as usize]);
            let face = (b - a).cross(c - a);
            if face.length_squared() < 1e-12 {
                continue; // degenerate pole triangles
            }
            let centroid = (a + b + c) / 3.0;
            assert!(face.dot(centroid) > 0.0, "inward triangle {tri:?}");
        }
    }

    #[test]
    fn built_in_meshes_validate() {
        for mesh in [fullscreen_quad(), plane(10.0, 4.0), cube(), sphere(16, 8)] {
            assert!(mesh.validate().is_ok(), "{} failed validation", mesh.name);
        }
    }

    #[test]
    fn cube_and_sphere_wind_counter_clockwise_outwards() {
        assert_outward(&cube());
        assert_outward(&sphere(12, 6));
    }

    #[test]
    fn plane_faces_up() {
        let mesh = plane(2.0, 1.0);
        let p = positions(&mesh);
        let face = (p[1] - p[0]).cross(p[2] - p[0]);
        assert!(face.y > 0.0);
    }

    #[test]
    fn quad_provides_position_and_texcoord_only() {
        let quad = fullscreen_quad();
        let layout = &quad.submeshes[0].layout;
        assert!(layout.find(location::POSITION).is_some());
        assert!(layout.find(location::TEXCOORD).is_some());
        assert!(layout.find(location::NORMAL).is_none());
        assert_eq!(layout.stride, 20);
    }
}
