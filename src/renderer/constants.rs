//! The per-frame uniform block shared by every program.

use glam::Mat4;

use super::resources::ResourceLayout;
use super::technique::Technique;
use crate::camera::CameraProvider;
use crate::options::Options;

/// Display and streaming switches as the shaders see them. Matches
/// `UiConstants` in `frame.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct UiConstants {
    /// Albedo replaced by white.
    pub lighting_only: u32,
    /// Geometric normals.
    pub face_normals: u32,
    /// Light-count heat map.
    pub visualize_light_count: u32,
    /// Per-sample shading tint.
    pub visualize_per_sample_shading: u32,
    /// Index of the active technique.
    pub light_cull_technique: u32,
    /// Streaming execution-count overlay threshold.
    pub execution_count: u32,
    /// Streaming merge cosine.
    pub merge_cos_theta: f32,
    /// Streaming statistics overlay.
    pub stats: u32,
    /// Streaming merge metric.
    pub merge_metric: u32,
    /// Streaming normal averaging.
    pub average_normals: u32,
    /// Streaming albedo averaging.
    pub average_shade: u32,
    /// Streaming derivative combination.
    pub derivatives: u32,
    /// Streaming depth combination.
    pub depth_mode: u32,
    /// Streaming coverage comparison.
    pub compare_coverage: u32,
    /// Streaming depth comparison.
    pub compare_depth: u32,
    /// Streaming normal comparison.
    pub compare_normals: u32,
}

impl UiConstants {
    /// Copy the display and streaming options for `technique`.
    #[must_use]
    pub fn new(options: &Options, technique: Technique) -> Self {
        let display = &options.display;
        let streaming = &options.streaming;
        Self {
            lighting_only: u32::from(display.lighting_only),
            face_normals: u32::from(display.face_normals),
            visualize_light_count: u32::from(display.visualize_light_count),
            visualize_per_sample_shading: u32::from(display.visualize_per_sample_shading),
            light_cull_technique: technique.index(),
            execution_count: streaming.execution_count,
            merge_cos_theta: streaming.merge_cos_theta,
            stats: streaming.stats.gpu_value(),
            merge_metric: streaming.merge_metric.gpu_value(),
            average_normals: u32::from(streaming.average_normals),
            average_shade: u32::from(streaming.average_shade),
            derivatives: streaming.derivatives.gpu_value(),
            depth_mode: streaming.depth.gpu_value(),
            compare_coverage: u32::from(streaming.compare_coverage),
            compare_depth: u32::from(streaming.compare_depth),
            compare_normals: u32::from(streaming.compare_normals),
        }
    }
}

/// Per-frame constants. Matches `FrameConstants` in `frame.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameConstants {
    /// Object to clip.
    pub world_view_proj: [[f32; 4]; 4],
    /// Object to view.
    pub world_view: [[f32; 4]; 4],
    /// World to clip.
    pub view_proj: [[f32; 4]; 4],
    /// View to clip.
    pub proj: [[f32; 4]; 4],
    /// Clip to view.
    pub inverse_proj: [[f32; 4]; 4],
    /// Near and far clip distances in x and y.
    pub near_far: [f32; 4],
    /// Width, height, samples and active light count.
    pub framebuffer: [u32; 4],
    /// Sky color in rgb.
    pub sky_color: [f32; 4],
    /// Debug switches.
    pub ui: UiConstants,
}

const _: () = assert!(size_of::<UiConstants>() == 64);
const _: () = assert!(size_of::<FrameConstants>() == 432);

/// Everything that feeds [`FrameConstants`] for one frame.
pub struct FrameParams<'a> {
    /// View and projection source.
    pub camera: &'a dyn CameraProvider,
    /// Object-to-world transform of the scene.
    pub world: Mat4,
    /// Caller options.
    pub options: &'a Options,
    /// Current resource layout.
    pub layout: &'a ResourceLayout,
    /// Active light count.
    pub active_lights: u32,
}

impl FrameConstants {
    /// Assemble the block for one frame.
    #[must_use]
    pub fn new(params: &FrameParams<'_>) -> Self {
        let view = params.camera.view();
        let proj = params.camera.projection();
        let world_view = view * params.world;
        let renderer = &params.options.renderer;
        let [r, g, b] = renderer.sky_color;
        Self {
            world_view_proj: (proj * world_view).to_cols_array_2d(),
            world_view: world_view.to_cols_array_2d(),
            view_proj: (proj * view).to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            inverse_proj: proj.inverse().to_cols_array_2d(),
            near_far: [params.camera.near(), params.camera.far(), 0.0, 0.0],
            framebuffer: [
                params.layout.width,
                params.layout.height,
                params.layout.samples,
                params.active_lights,
            ],
            sky_color: [r, g, b, 1.0],
            ui: UiConstants::new(params.options, renderer.technique),
        }
    }
}
