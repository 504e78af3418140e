use std::ops::Range;

use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use super::{MeshProvider, MeshVertex};
use crate::camera::frustum::Frustum;
use crate::gpu::pipeline_helpers;

/// Sphere enclosing a submesh, used for frustum culling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Object-space center.
    pub center: Vec3,
    /// Radius.
    pub radius: f32,
}

impl BoundingSphere {
    /// Sphere around the centroid of `points`.
    pub fn from_points(points: impl Iterator<Item = Vec3> + Clone) -> Self {
        let (sum, count) = points
            .clone()
            .fold((Vec3::ZERO, 0u32), |(sum, n), p| (sum + p, n + 1));
        if count == 0 {
            return Self {
                center: Vec3::ZERO,
                radius: 0.0,
            };
        }
        #[allow(clippy::cast_precision_loss)]
        let center = sum / count as f32;
        let radius = points.map(|p| p.distance(center)).fold(0.0, f32::max);
        Self { center, radius }
    }
}

/// RGBA8 texture pixels.
#[derive(Debug, Clone)]
pub struct TextureData {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Tightly packed RGBA8 texels, row-major.
    pub rgba: Vec<u8>,
}

/// An index range drawn with one material.
#[derive(Debug, Clone)]
pub struct SubmeshData {
    /// Range into [`MeshData::indices`].
    pub indices: Range<u32>,
    /// Index into [`MeshData::textures`].
    pub material: usize,
}

/// CPU-side mesh ready for upload.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// Vertices.
    pub vertices: Vec<MeshVertex>,
    /// Triangle-list indices.
    pub indices: Vec<u32>,
    /// Submeshes in draw order.
    pub submeshes: Vec<SubmeshData>,
    /// Albedo textures referenced by submeshes.
    pub textures: Vec<TextureData>,
}

impl MeshData {
    /// Bounding sphere of every submesh, in submesh order.
    pub fn submesh_bounds(&self) -> Vec<BoundingSphere> {
        self.submeshes
            .iter()
            .map(|submesh| {
                let indices = &self.indices
                    [submesh.indices.start as usize..submesh.indices.end as usize];
                BoundingSphere::from_points(
                    indices
                        .iter()
                        .map(|&i| Vec3::from(self.vertices[i as usize].position)),
                )
            })
            .collect()
    }
}

struct Submesh {
    indices: Range<u32>,
    bounds: BoundingSphere,
    material: usize,
}

/// Uploaded indexed mesh with one material bind group per texture.
pub struct StaticMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    submeshes: Vec<Submesh>,
    materials: Vec<wgpu::BindGroup>,
    visible: Vec<bool>,
}

impl StaticMesh {
    /// Upload `data`, creating material bind groups against
    /// `material_layout`.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        material_layout: &wgpu::BindGroupLayout,
        data: &MeshData,
    ) -> Self {
        let vertex_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertices"),
                contents: bytemuck::cast_slice(&data.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Indices"),
                contents: bytemuck::cast_slice(&data.indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let sampler = pipeline_helpers::material_sampler(device);
        let materials = data
            .textures
            .iter()
            .map(|texture| {
                let view = upload_texture(device, queue, texture);
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Material"),
                    layout: material_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&sampler),
                        },
                    ],
                })
            })
            .collect();

        let submeshes: Vec<Submesh> = data
            .submeshes
            .iter()
            .zip(data.submesh_bounds())
            .map(|(submesh, bounds)| Submesh {
                indices: submesh.indices.clone(),
                bounds,
                material: submesh.material,
            })
            .collect();
        let visible = vec![true; submeshes.len()];

        Self {
            vertex_buffer,
            index_buffer,
            submeshes,
            materials,
            visible,
        }
    }
}

/// Cull `bounds` (object space) against the frustum of `world_view_proj`.
pub(crate) fn cull_spheres(bounds: &[BoundingSphere], world_view_proj: Mat4) -> Vec<bool> {
    let frustum = Frustum::from_view_projection(world_view_proj);
    bounds
        .iter()
        .map(|b| frustum.intersects_sphere(b.center, b.radius))
        .collect()
}

impl MeshProvider for StaticMesh {
    fn is_loaded(&self) -> bool {
        !self.submeshes.is_empty()
    }

    fn update_visibility(&mut self, world_view_proj: Mat4) {
        let bounds: Vec<BoundingSphere> =
            self.submeshes.iter().map(|s| s.bounds).collect();
        self.visible = cull_spheres(&bounds, world_view_proj);
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>, material_group: u32) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        for (submesh, _) in self
            .submeshes
            .iter()
            .zip(&self.visible)
            .filter(|(_, visible)| **visible)
        {
            let Some(material) = self.materials.get(submesh.material) else {
                log::warn!("submesh references missing material {}", submesh.material);
                continue;
            };
            pass.set_bind_group(material_group, material, &[]);
            pass.draw_indexed(submesh.indices.clone(), 0, 0..1);
        }
    }
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &TextureData,
) -> wgpu::TextureView {
    device
        .create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("Material Albedo"),
                size: wgpu::Extent3d {
                    width: texture.width,
                    height: texture.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &texture.rgba,
        )
        .create_view(&wgpu::TextureViewDescriptor::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Camera, CameraProvider};

    #[test]
    fn bounding_sphere_encloses_points() {
        let points = [Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        let sphere = BoundingSphere::from_points(points.iter().copied());
        assert_eq!(sphere.center, Vec3::ZERO);
        assert!((sphere.radius - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_submesh_has_degenerate_bounds() {
        let sphere = BoundingSphere::from_points(std::iter::empty());
        assert_eq!(sphere.radius, 0.0);
    }

    #[test]
    fn spheres_behind_the_camera_are_culled() {
        let camera = Camera::at_origin(1.0);
        let bounds = [
            BoundingSphere {
                center: Vec3::new(0.0, 0.0, -10.0),
                radius: 1.0,
            },
            BoundingSphere {
                center: Vec3::new(0.0, 0.0, 10.0),
                radius: 1.0,
            },
        ];
        assert_eq!(cull_spheres(&bounds, camera.view_projection()), vec![true, false]);
    }

    #[test]
    fn world_transform_moves_spheres_into_view() {
        let camera = Camera::at_origin(1.0);
        let behind = [BoundingSphere {
            center: Vec3::new(0.0, 0.0, 10.0),
            radius: 1.0,
        }];
        let world = Mat4::from_translation(Vec3::new(0.0, 0.0, -20.0));
        assert_eq!(cull_spheres(&behind, camera.view_projection()), vec![false]);
        assert_eq!(
            cull_spheres(&behind, camera.view_projection() * world),
            vec![true]
        );
    }
}
