//! Procedural demo scene: a checkered floor with a field of pillars
//! (opaque) and a ring of cut-out lattice panels (alpha tested).

use glam::{Vec2, Vec3};

use super::{MeshData, MeshVertex, SubmeshData, TextureData};

const TEXTURE_SIZE: u32 = 64;

/// Opaque and alpha-tested halves of the demo scene.
pub struct DemoScene {
    /// Floor and pillars.
    pub opaque: MeshData,
    /// Lattice panels whose texture alpha cuts holes.
    pub alpha_tested: MeshData,
}

/// Build the demo scene. Deterministic.
pub fn demo_scene() -> DemoScene {
    let mut opaque = MeshBuilder::default();
    let floor_material = opaque.add_texture(checker_texture([200, 200, 190], [90, 90, 100]));
    let pillar_material = opaque.add_texture(solid_texture([180, 120, 90]));

    opaque.begin_submesh();
    opaque.push_quad(
        [
            Vec3::new(-100.0, 0.0, 100.0),
            Vec3::new(100.0, 0.0, 100.0),
            Vec3::new(100.0, 0.0, -100.0),
            Vec3::new(-100.0, 0.0, -100.0),
        ],
        Vec2::splat(40.0),
    );
    opaque.end_submesh(floor_material);

    for x in -4..=4 {
        for z in -4..=4 {
            #[allow(clippy::cast_precision_loss)]
            let center = Vec3::new(x as f32 * 12.0, 3.0, z as f32 * 12.0);
            opaque.begin_submesh();
            opaque.push_box(center, Vec3::new(1.0, 3.0, 1.0));
            opaque.end_submesh(pillar_material);
        }
    }

    let mut alpha = MeshBuilder::default();
    let lattice = alpha.add_texture(lattice_texture([120, 170, 110]));
    for i in 0..12 {
        #[allow(clippy::cast_precision_loss)]
        let angle = i as f32 / 12.0 * std::f32::consts::TAU;
        let center = Vec3::new(angle.cos() * 30.0, 4.0, angle.sin() * 30.0);
        let tangent = Vec3::new(-angle.sin(), 0.0, angle.cos()) * 4.0;
        let up = Vec3::Y * 4.0;
        alpha.begin_submesh();
        let corners = [
            center - tangent - up,
            center + tangent - up,
            center + tangent + up,
            center - tangent + up,
        ];
        alpha.push_quad(corners, Vec2::ONE);
        // back face, so the panel is visible from both sides
        alpha.push_quad([corners[1], corners[0], corners[3], corners[2]], Vec2::ONE);
        alpha.end_submesh(lattice);
    }

    DemoScene {
        opaque: opaque.finish(),
        alpha_tested: alpha.finish(),
    }
}

#[derive(Default)]
struct MeshBuilder {
    data: MeshData,
    submesh_start: u32,
}

impl MeshBuilder {
    fn add_texture(&mut self, texture: TextureData) -> usize {
        self.data.textures.push(texture);
        self.data.textures.len() - 1
    }

    fn begin_submesh(&mut self) {
        self.submesh_start = index_count(&self.data);
    }

    fn end_submesh(&mut self, material: usize) {
        self.data.submeshes.push(SubmeshData {
            indices: self.submesh_start..index_count(&self.data),
            material,
        });
    }

    /// Counter-clockwise quad seen from the side its normal points to.
    fn push_quad(&mut self, corners: [Vec3; 4], uv_scale: Vec2) {
        let normal = (corners[1] - corners[0])
            .cross(corners[3] - corners[0])
            .normalize();
        let uvs = [Vec2::new(0.0, 1.0), Vec2::ONE, Vec2::new(1.0, 0.0), Vec2::ZERO];
        #[allow(clippy::cast_possible_truncation)]
        let base = self.data.vertices.len() as u32;
        for (corner, uv) in corners.iter().zip(uvs) {
            self.data.vertices.push(MeshVertex {
                position: corner.to_array(),
                normal: normal.to_array(),
                uv: (uv * uv_scale).to_array(),
            });
        }
        self.data
            .indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    fn push_box(&mut self, center: Vec3, half: Vec3) {
        let corner = |x: f32, y: f32, z: f32| center + half * Vec3::new(x, y, z);
        let faces = [
            // +x, -x, +y, -y, +z, -z
            [corner(1., -1., 1.), corner(1., -1., -1.), corner(1., 1., -1.), corner(1., 1., 1.)],
            [corner(-1., -1., -1.), corner(-1., -1., 1.), corner(-1., 1., 1.), corner(-1., 1., -1.)],
            [corner(-1., 1., 1.), corner(1., 1., 1.), corner(1., 1., -1.), corner(-1., 1., -1.)],
            [corner(-1., -1., -1.), corner(1., -1., -1.), corner(1., -1., 1.), corner(-1., -1., 1.)],
            [corner(-1., -1., 1.), corner(1., -1., 1.), corner(1., 1., 1.), corner(-1., 1., 1.)],
            [corner(1., -1., -1.), corner(-1., -1., -1.), corner(-1., 1., -1.), corner(1., 1., -1.)],
        ];
        for face in faces {
            self.push_quad(face, Vec2::ONE);
        }
    }

    fn finish(self) -> MeshData {
        self.data
    }
}

#[allow(clippy::cast_possible_truncation)]
fn index_count(data: &MeshData) -> u32 {
    data.indices.len() as u32
}

fn texture_from_fn(f: impl Fn(u32, u32) -> [u8; 4]) -> TextureData {
    let mut rgba = Vec::with_capacity((TEXTURE_SIZE * TEXTURE_SIZE * 4) as usize);
    for y in 0..TEXTURE_SIZE {
        for x in 0..TEXTURE_SIZE {
            rgba.extend_from_slice(&f(x, y));
        }
    }
    TextureData {
        width: TEXTURE_SIZE,
        height: TEXTURE_SIZE,
        rgba,
    }
}

fn solid_texture(rgb: [u8; 3]) -> TextureData {
    texture_from_fn(|_, _| [rgb[0], rgb[1], rgb[2], 255])
}

fn checker_texture(a: [u8; 3], b: [u8; 3]) -> TextureData {
    texture_from_fn(|x, y| {
        let c = if (x / 32 + y / 32) % 2 == 0 { a } else { b };
        [c[0], c[1], c[2], 255]
    })
}

/// Opaque bars on a transparent background.
fn lattice_texture(rgb: [u8; 3]) -> TextureData {
    texture_from_fn(|x, y| {
        let bar = x % 16 < 4 || y % 16 < 4;
        [rgb[0], rgb[1], rgb[2], if bar { 255 } else { 0 }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submeshes_tile_the_index_buffer() {
        let scene = demo_scene();
        for mesh in [&scene.opaque, &scene.alpha_tested] {
            let mut next = 0;
            for submesh in &mesh.submeshes {
                assert_eq!(submesh.indices.start, next);
                assert!(submesh.material < mesh.textures.len());
                next = submesh.indices.end;
            }
            assert_eq!(next as usize, mesh.indices.len());
            assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        }
    }

    #[test]
    fn normals_are_unit_length() {
        let scene = demo_scene();
        assert!(scene.opaque.vertices.iter().all(|v| {
            (Vec3::from(v.normal).length() - 1.0).abs() < 1e-5
        }));
    }

    #[test]
    fn floor_faces_up_and_lattice_has_holes() {
        let scene = demo_scene();
        assert_eq!(scene.opaque.vertices[0].normal, [0.0, 1.0, 0.0]);
        let lattice = &scene.alpha_tested.textures[0];
        assert!(lattice.rgba.chunks(4).any(|t| t[3] == 0));
        assert!(lattice.rgba.chunks(4).any(|t| t[3] == 255));
    }
}
