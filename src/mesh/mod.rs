//! Scene geometry the renderer draws but does not own.
//!
//! The renderer talks to meshes through [`MeshProvider`]. [`StaticMesh`] is
//! a small indexed implementation with per-submesh frustum culling, and
//! [`procedural`] builds the demo scene used by the viewer.

pub mod procedural;
mod static_mesh;
mod vertex;

use glam::Mat4;

use crate::gpu::pipeline_helpers;

pub use static_mesh::{BoundingSphere, MeshData, StaticMesh, SubmeshData, TextureData};
pub use vertex::{MeshVertex, mesh_vertex_buffer_layout};

/// Bind group slot holding a submesh's material.
pub const MATERIAL_GROUP: u32 = 2;

/// Geometry the renderer can cull and draw.
pub trait MeshProvider {
    /// Whether geometry is resident; unloaded meshes are skipped.
    fn is_loaded(&self) -> bool;

    /// Recompute per-submesh visibility against the frustum of
    /// `world_view_proj`, the frame's object-to-clip transform.
    fn update_visibility(&mut self, world_view_proj: Mat4);

    /// Record draws for every visible submesh, binding each submesh's
    /// material at `material_group`. The pipeline and the other groups are
    /// already set.
    fn draw(&self, pass: &mut wgpu::RenderPass<'_>, material_group: u32);
}

/// Layout of a material bind group: albedo texture and its sampler.
pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Material Layout"),
        entries: &[
            pipeline_helpers::texture_2d(0),
            pipeline_helpers::filtering_sampler(1),
        ],
    })
}
