//! Every GPU program the techniques run, with its shader, bind group
//! layout and fixed-function state.
//!
//! A [`ProgramId`] names one pipeline variant. [`PipelineSet`] builds all
//! variants usable at the current sample count; it is rebuilt when the
//! sample count changes and kept across plain resizes.

use rustc_hash::FxHashMap;

use super::resources::{
    ResourceLayout, ALBEDO_FORMAT, DEPTH_FORMAT, LIT_FORMAT,
    NORMAL_SPECULAR_FORMAT, POSITION_ZGRAD_FORMAT,
};
use crate::error::LightcullError;
use crate::gpu::pipeline_helpers::{
    create_compute_pipeline, create_render_pipeline, depth_texture_2d,
    pipeline_layout, storage_buffer, texture_2d_unfilterable, uniform_buffer,
    RenderPipelineParams, ADDITIVE_BLEND, ALL_STAGES, READ_STAGES,
};
use crate::gpu::shader_composer::ShaderComposer;
use crate::mesh::{material_layout, mesh_vertex_buffer_layout};

/// Stencil value marking pixels that need per-sample shading.
pub const PER_SAMPLE_STENCIL: u32 = 1;

/// One pipeline variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramId {
    /// Depth-only mesh pass; alpha-tested geometry clips in the fragment
    /// stage.
    DepthPrepass {
        /// Discard fragments below the alpha threshold.
        alpha_test: bool,
    },
    /// Forward shading of every light into the lit buffer.
    Forward {
        /// Discard fragments below the alpha threshold.
        alpha_test: bool,
        /// Depth was laid down by a prepass: test EQUAL, no writes.
        after_prepass: bool,
    },
    /// G-buffer fill.
    GBuffer {
        /// Discard fragments below the alpha threshold.
        alpha_test: bool,
        /// Render against the stencil-capable depth buffer.
        stencil: bool,
    },
    /// Flags pixels whose samples differ in the stencil buffer.
    PerSampleMark,
    /// Full-screen loop over every light.
    BasicLoop {
        /// Shade each sample separately.
        per_sample: bool,
    },
    /// One additive screen-aligned quad per light.
    LightQuad {
        /// Shade each sample separately.
        per_sample: bool,
        /// Write raw lighting terms into the accumulation buffer.
        accumulate: bool,
    },
    /// Combines the accumulation buffer with the G-buffer albedo.
    AccumulationResolve {
        /// Resolve each sample separately.
        per_sample: bool,
    },
    /// 16x16 tile light culling and shading.
    ComputeTile,
    /// Streaming fill appending merge nodes.
    StreamingFill {
        /// Ring replacement once a pixel is full.
        ndi: bool,
    },
    /// Streaming resolve into the output.
    StreamingResolve,
    /// Tonemap the lit buffer into the output.
    Tonemap {
        /// Read the compute lit buffer instead of the lit texture.
        flat: bool,
    },
}

/// How a program's geometry is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    /// Mesh vertex buffers plus a material group.
    Mesh,
    /// A full-screen triangle.
    FullScreen,
    /// Six generated vertices per light instance.
    LightQuads,
    /// A compute dispatch.
    Compute,
}

/// Side length of a compute tile in pixels.
pub const TILE_SIZE: u32 = 16;

macro_rules! shader {
    ($path:literal) => {
        (
            include_str!(concat!("../../assets/shaders/", $path)),
            $path,
        )
    };
}

impl ProgramId {
    /// Every variant.
    #[must_use]
    pub fn all() -> Vec<Self> {
        let flags = [false, true];
        let mut all = Vec::new();
        for alpha_test in flags {
            all.push(Self::DepthPrepass { alpha_test });
            for after_prepass in flags {
                all.push(Self::Forward {
                    alpha_test,
                    after_prepass,
                });
            }
            for stencil in flags {
                all.push(Self::GBuffer {
                    alpha_test,
                    stencil,
                });
            }
        }
        all.push(Self::PerSampleMark);
        for per_sample in flags {
            all.push(Self::BasicLoop { per_sample });
            for accumulate in flags {
                all.push(Self::LightQuad {
                    per_sample,
                    accumulate,
                });
            }
            all.push(Self::AccumulationResolve { per_sample });
        }
        all.push(Self::ComputeTile);
        for ndi in flags {
            all.push(Self::StreamingFill { ndi });
        }
        all.push(Self::StreamingResolve);
        for flat in flags {
            all.push(Self::Tonemap { flat });
        }
        all
    }

    /// WGSL source and the path it is registered under.
    #[must_use]
    pub fn shader_source(self) -> (&'static str, &'static str) {
        match self {
            Self::DepthPrepass { .. } => shader!("raster/depth_prepass.wgsl"),
            Self::Forward { .. } => shader!("raster/forward.wgsl"),
            Self::GBuffer { .. } => shader!("raster/gbuffer.wgsl"),
            Self::PerSampleMark => shader!("screen/per_sample_mark.wgsl"),
            Self::BasicLoop { .. } => shader!("screen/deferred_lighting.wgsl"),
            Self::LightQuad { .. } => shader!("screen/light_quad.wgsl"),
            Self::AccumulationResolve { .. } => {
                shader!("screen/accumulation_resolve.wgsl")
            }
            Self::ComputeTile => shader!("compute/tile.wgsl"),
            Self::StreamingFill { .. } => shader!("raster/streaming_fill.wgsl"),
            Self::StreamingResolve => shader!("screen/streaming_resolve.wgsl"),
            Self::Tonemap { flat: false } => shader!("screen/tonemap.wgsl"),
            Self::Tonemap { flat: true } => shader!("screen/tonemap_flat.wgsl"),
        }
    }

    /// Fragment entry point, `None` for depth-only and compute programs.
    #[must_use]
    pub fn fragment_entry(self) -> Option<&'static str> {
        match self {
            Self::DepthPrepass { alpha_test: false } | Self::ComputeTile => None,
            Self::DepthPrepass { alpha_test: true }
            | Self::Forward {
                alpha_test: true, ..
            }
            | Self::GBuffer {
                alpha_test: true, ..
            } => Some("fs_alpha_test"),
            Self::BasicLoop { per_sample: true }
            | Self::AccumulationResolve { per_sample: true }
            | Self::LightQuad {
                per_sample: true,
                accumulate: false,
            } => Some("fs_per_sample"),
            Self::LightQuad {
                per_sample: false,
                accumulate: true,
            } => Some("fs_accumulate"),
            Self::LightQuad {
                per_sample: true,
                accumulate: true,
            } => Some("fs_accumulate_per_sample"),
            Self::StreamingFill { ndi: true } => Some("fs_ndi"),
            _ => Some("fs_main"),
        }
    }

    /// How geometry reaches the program.
    #[must_use]
    pub fn kind(self) -> ProgramKind {
        match self {
            Self::DepthPrepass { .. }
            | Self::Forward { .. }
            | Self::GBuffer { .. }
            | Self::StreamingFill { .. } => ProgramKind::Mesh,
            Self::LightQuad { .. } => ProgramKind::LightQuads,
            Self::ComputeTile => ProgramKind::Compute,
            Self::PerSampleMark
            | Self::BasicLoop { .. }
            | Self::AccumulationResolve { .. }
            | Self::StreamingResolve
            | Self::Tonemap { .. } => ProgramKind::FullScreen,
        }
    }

    /// Whether the program only exists with multisampled surfaces.
    #[must_use]
    pub fn requires_msaa(self) -> bool {
        matches!(
            self,
            Self::PerSampleMark
                | Self::BasicLoop { per_sample: true }
                | Self::LightQuad {
                    per_sample: true,
                    ..
                }
                | Self::AccumulationResolve { per_sample: true }
        )
    }

    /// Whether the program writes the caller's output target and therefore
    /// runs single-sampled.
    #[must_use]
    pub fn writes_output(self) -> bool {
        matches!(self, Self::StreamingResolve | Self::Tonemap { .. })
    }

    /// Entries of the program's bind group 1, in binding order.
    #[must_use]
    pub fn resource_entries(self, multisampled: bool) -> Vec<wgpu::BindGroupLayoutEntry> {
        let gbuffer = || (0..3).map(|binding| texture_2d_unfilterable(binding, multisampled));
        match self {
            Self::DepthPrepass { .. } | Self::Forward { .. } | Self::GBuffer { .. } => {
                Vec::new()
            }
            Self::PerSampleMark => gbuffer().collect(),
            Self::BasicLoop { .. } | Self::LightQuad { .. } => gbuffer()
                .chain([depth_texture_2d(3, multisampled)])
                .collect(),
            Self::AccumulationResolve { .. } => gbuffer()
                .chain([
                    depth_texture_2d(3, multisampled),
                    texture_2d_unfilterable(4, multisampled),
                ])
                .collect(),
            Self::ComputeTile => gbuffer()
                .chain([
                    depth_texture_2d(3, multisampled),
                    storage_buffer(4, READ_STAGES, false),
                ])
                .collect(),
            Self::StreamingFill { .. } => vec![
                storage_buffer(0, READ_STAGES, false),
                storage_buffer(1, READ_STAGES, false),
            ],
            Self::StreamingResolve => vec![
                storage_buffer(0, READ_STAGES, true),
                storage_buffer(1, READ_STAGES, true),
            ],
            Self::Tonemap { flat: false } => vec![
                texture_2d_unfilterable(0, multisampled),
                depth_texture_2d(1, multisampled),
            ],
            Self::Tonemap { flat: true } => vec![
                storage_buffer(0, READ_STAGES, true),
                depth_texture_2d(1, multisampled),
            ],
        }
    }

    fn color_targets(self, output_format: wgpu::TextureFormat) -> Vec<Option<wgpu::ColorTargetState>> {
        let target = |format, blend| {
            Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })
        };
        match self {
            Self::DepthPrepass { .. } | Self::PerSampleMark | Self::ComputeTile => Vec::new(),
            Self::Forward { .. } | Self::BasicLoop { .. } | Self::AccumulationResolve { .. } => {
                vec![target(LIT_FORMAT, None)]
            }
            Self::GBuffer { .. } => vec![
                target(NORMAL_SPECULAR_FORMAT, None),
                target(ALBEDO_FORMAT, None),
                target(POSITION_ZGRAD_FORMAT, None),
            ],
            Self::LightQuad { .. } => vec![target(LIT_FORMAT, Some(ADDITIVE_BLEND))],
            Self::StreamingFill { .. } => vec![target(ALBEDO_FORMAT, None)],
            Self::StreamingResolve | Self::Tonemap { .. } => {
                vec![target(output_format, None)]
            }
        }
    }

    fn depth_stencil(self, layout: &ResourceLayout) -> Option<wgpu::DepthStencilState> {
        let depth = |format, depth_write_enabled, depth_compare| wgpu::DepthStencilState {
            format,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        };
        let stencil = |compare, pass_op| {
            let face = wgpu::StencilFaceState {
                compare,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op,
            };
            wgpu::StencilState {
                front: face,
                back: face,
                read_mask: 0xff,
                write_mask: 0xff,
            }
        };
        let ms = layout.is_multisampled();
        match self {
            Self::DepthPrepass { .. }
            | Self::Forward {
                after_prepass: false,
                ..
            }
            | Self::StreamingFill { .. } => {
                Some(depth(DEPTH_FORMAT, true, wgpu::CompareFunction::GreaterEqual))
            }
            Self::Forward {
                after_prepass: true,
                ..
            } => Some(depth(DEPTH_FORMAT, false, wgpu::CompareFunction::Equal)),
            Self::GBuffer { stencil: true, .. } => Some(depth(
                layout.depth_stencil_format(),
                true,
                wgpu::CompareFunction::GreaterEqual,
            )),
            Self::GBuffer { stencil: false, .. } => {
                Some(depth(DEPTH_FORMAT, true, wgpu::CompareFunction::GreaterEqual))
            }
            Self::PerSampleMark => Some(wgpu::DepthStencilState {
                stencil: stencil(wgpu::CompareFunction::Always, wgpu::StencilOperation::Replace),
                ..depth(layout.depth_stencil_format(), false, wgpu::CompareFunction::Always)
            }),
            Self::BasicLoop { .. } | Self::LightQuad { .. } | Self::AccumulationResolve { .. }
                if ms =>
            {
                Some(wgpu::DepthStencilState {
                    stencil: wgpu::StencilState {
                        write_mask: 0,
                        ..stencil(wgpu::CompareFunction::Equal, wgpu::StencilOperation::Keep)
                    },
                    ..depth(layout.depth_stencil_format(), false, wgpu::CompareFunction::Always)
                })
            }
            _ => None,
        }
    }

    fn cull_mode(self) -> Option<wgpu::Face> {
        match self {
            Self::DepthPrepass { alpha_test: false }
            | Self::Forward {
                alpha_test: false, ..
            }
            | Self::GBuffer {
                alpha_test: false, ..
            } => Some(wgpu::Face::Back),
            _ => None,
        }
    }

    fn label(self) -> String {
        format!("{self:?}")
    }
}

/// A compiled program: a render or compute pipeline plus the layout of its
/// bind group 1.
pub enum Pipeline {
    /// Raster pipeline.
    Render(wgpu::RenderPipeline),
    /// Compute pipeline.
    Compute(wgpu::ComputePipeline),
}

/// Layouts shared by every program.
pub struct SharedLayouts {
    /// Group 0: frame constants and lights.
    pub frame: wgpu::BindGroupLayout,
    /// Group 2 of mesh programs: material texture and sampler.
    pub material: wgpu::BindGroupLayout,
}

impl SharedLayouts {
    /// Create the frame and material layouts.
    pub fn new(device: &wgpu::Device) -> Self {
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Layout"),
            entries: &[
                uniform_buffer(0, ALL_STAGES),
                storage_buffer(1, ALL_STAGES, true),
            ],
        });
        Self {
            frame,
            material: material_layout(device),
        }
    }
}

/// Every pipeline usable at one sample count, keyed by program.
pub struct PipelineSet {
    samples: u32,
    pipelines: FxHashMap<ProgramId, Pipeline>,
    resource_layouts: FxHashMap<ProgramId, wgpu::BindGroupLayout>,
}

impl PipelineSet {
    /// Compose every shader and build every pipeline available for
    /// `layout`'s sample count.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::ShaderCompose`] if any shader fails to
    /// compose.
    pub fn new(
        device: &wgpu::Device,
        composer: &mut ShaderComposer,
        shared: &SharedLayouts,
        layout: &ResourceLayout,
        output_format: wgpu::TextureFormat,
    ) -> Result<Self, LightcullError> {
        let ms = layout.is_multisampled();
        let mut modules: FxHashMap<&'static str, wgpu::ShaderModule> = FxHashMap::default();
        let mut pipelines = FxHashMap::default();
        let mut resource_layouts = FxHashMap::default();

        for program in ProgramId::all() {
            if program.requires_msaa() && !ms {
                continue;
            }
            let (source, file_path) = program.shader_source();
            if !modules.contains_key(file_path) {
                let module = composer.compose(device, file_path, source, file_path, ms)?;
                let _ = modules.insert(file_path, module);
            }
            let Some(module) = modules.get(file_path) else {
                continue;
            };

            let label = program.label();
            let resources = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{label} Resources")),
                entries: &program.resource_entries(ms),
            });
            let pipeline = match program.kind() {
                ProgramKind::Compute => {
                    let pl = pipeline_layout(device, &label, &[&shared.frame, &resources]);
                    Pipeline::Compute(create_compute_pipeline(device, &label, &pl, module))
                }
                kind => {
                    let mesh = kind == ProgramKind::Mesh;
                    let pl = if mesh {
                        pipeline_layout(
                            device,
                            &label,
                            &[&shared.frame, &resources, &shared.material],
                        )
                    } else {
                        pipeline_layout(device, &label, &[&shared.frame, &resources])
                    };
                    let vertex_buffers = if mesh {
                        vec![mesh_vertex_buffer_layout()]
                    } else {
                        Vec::new()
                    };
                    let targets = program.color_targets(output_format);
                    Pipeline::Render(create_render_pipeline(
                        device,
                        &pl,
                        &RenderPipelineParams {
                            label: &label,
                            shader: module,
                            fragment_entry: program.fragment_entry(),
                            vertex_buffers: &vertex_buffers,
                            targets: &targets,
                            depth_stencil: program.depth_stencil(layout),
                            cull_mode: program.cull_mode(),
                            sample_count: if program.writes_output() {
                                1
                            } else {
                                layout.samples
                            },
                        },
                    ))
                }
            };
            let _ = pipelines.insert(program, pipeline);
            let _ = resource_layouts.insert(program, resources);
        }

        log::info!(
            "built {} pipelines for {} samples",
            pipelines.len(),
            layout.samples
        );
        Ok(Self {
            samples: layout.samples,
            pipelines,
            resource_layouts,
        })
    }

    /// Sample count the set was built for.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Pipeline of `program`, `None` when it is unavailable at this sample
    /// count.
    pub fn pipeline(&self, program: ProgramId) -> Option<&Pipeline> {
        self.pipelines.get(&program)
    }

    /// Layout of `program`'s bind group 1.
    pub fn resource_layout(&self, program: ProgramId) -> Option<&wgpu::BindGroupLayout> {
        self.resource_layouts.get(&program)
    }

    /// Whether `program` was built.
    pub fn contains(&self, program: ProgramId) -> bool {
        self.pipelines.contains_key(&program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_support::{headless_context, TEST_OUTPUT_FORMAT};

    #[test]
    fn every_variant_is_listed_once() {
        let all = ProgramId::all();
        let mut unique = all.clone();
        unique.sort_by_key(|p| format!("{p:?}"));
        unique.dedup();
        assert_eq!(unique.len(), all.len());
        assert_eq!(all.len(), 25);
    }

    #[test]
    fn depth_only_prepass_has_no_fragment_stage() {
        assert_eq!(ProgramId::DepthPrepass { alpha_test: false }.fragment_entry(), None);
        assert_eq!(
            ProgramId::DepthPrepass { alpha_test: true }.fragment_entry(),
            Some("fs_alpha_test")
        );
        assert_eq!(ProgramId::StreamingFill { ndi: true }.fragment_entry(), Some("fs_ndi"));
    }

    #[test]
    fn bindings_are_dense() {
        for program in ProgramId::all() {
            for ms in [false, true] {
                let entries = program.resource_entries(ms);
                for (i, entry) in entries.iter().enumerate() {
                    assert_eq!(entry.binding as usize, i, "{program:?}");
                }
            }
        }
    }

    #[test]
    fn prepass_forward_tests_equal_without_writes() {
        let layout = ResourceLayout::new(8, 8, 4);
        let state = ProgramId::Forward {
            alpha_test: false,
            after_prepass: true,
        }
        .depth_stencil(&layout)
        .unwrap();
        assert_eq!(state.depth_compare, wgpu::CompareFunction::Equal);
        assert!(!state.depth_write_enabled);
    }

    #[test]
    fn lighting_passes_stencil_test_only_when_multisampled() {
        let program = ProgramId::BasicLoop { per_sample: false };
        assert!(program.depth_stencil(&ResourceLayout::new(8, 8, 1)).is_none());
        let state = program.depth_stencil(&ResourceLayout::new(8, 8, 4)).unwrap();
        assert_eq!(state.stencil.front.compare, wgpu::CompareFunction::Equal);
        assert_eq!(state.stencil.write_mask, 0);
    }

    #[test]
    fn builds_for_single_and_multisampled() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let mut composer = ShaderComposer::new().unwrap();
        let shared = SharedLayouts::new(&ctx.device);
        for &samples in &ctx.sample_counts {
            let layout = ResourceLayout::new(64, 64, samples);
            let set = PipelineSet::new(
                &ctx.device,
                &mut composer,
                &shared,
                &layout,
                TEST_OUTPUT_FORMAT,
            )
            .unwrap();
            assert_eq!(set.contains(ProgramId::PerSampleMark), samples > 1);
            assert!(set.contains(ProgramId::ComputeTile));
        }
    }
}
