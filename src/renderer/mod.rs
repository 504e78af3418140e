//! The technique dispatcher and the state it drives.
//!
//! [`Renderer`] owns the resource set, the light pool, the pipelines for
//! the current sample count and the stage timer. Each frame it writes the
//! per-frame constants, plans the passes of the selected [`Technique`] and
//! encodes them against a caller-owned [`OutputTarget`].

pub mod constants;
pub mod dispatcher;
pub mod elements;
pub mod executor;
pub mod plan;
pub mod programs;
pub mod resources;
pub mod technique;
pub mod timing;

use glam::Mat4;

use crate::camera::CameraProvider;
use crate::diagnostics::MemoryReport;
use crate::error::LightcullError;
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::ShaderComposer;
use crate::gpu::timer::{FrameTimer, StageTimes};
use crate::gpu::uniform_buffer::UniformBuffer;
use crate::lights::{GpuPointLight, LightPool};
use crate::options::Options;

use self::constants::{FrameConstants, FrameParams};
use self::elements::{DecodedMergeNode, MAX_SURFACES_PER_PIXEL};
use self::executor::PassInputs;
use self::plan::BindingTable;
use self::programs::{PipelineSet, SharedLayouts};

pub use self::executor::{OutputTarget, SceneMeshes, Viewport};
pub use self::resources::{Member, ResourceLayout, ResourceSet};
pub use self::technique::Technique;
pub use self::timing::FrameTimes;

/// Per-frame scene inputs.
pub struct FrameInput<'a> {
    /// View and projection source.
    pub camera: &'a dyn CameraProvider,
    /// Object-to-world transform shared by both mesh layers.
    pub world: Mat4,
    /// Options for this frame.
    pub options: &'a Options,
}

/// Merge nodes stored for one pixel by the streaming fill.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeNodeInspection {
    /// Raw per-pixel counter, which may exceed the node capacity.
    pub count: u32,
    /// Stored nodes, at most [`MAX_SURFACES_PER_PIXEL`].
    pub nodes: Vec<DecodedMergeNode>,
}

/// Renders a scene with any [`Technique`] into a caller-owned target.
pub struct Renderer {
    composer: ShaderComposer,
    shared: SharedLayouts,
    pipelines: PipelineSet,
    resources: ResourceSet,
    lights: LightPool,
    constants: UniformBuffer<FrameConstants>,
    frame_group: wgpu::BindGroup,
    timer: FrameTimer<Technique>,
    output_format: wgpu::TextureFormat,
    last_technique: Option<Technique>,
}

impl Renderer {
    /// Build pipelines and resources for `ctx`'s output size.
    ///
    /// The requested MSAA count falls back to the highest supported count
    /// below it when the adapter cannot use it.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::ShaderCompose`] if a shader fails to
    /// compose.
    pub fn new(ctx: &RenderContext, options: &Options) -> Result<Self, LightcullError> {
        let samples = pick_samples(options.renderer.msaa_samples, &ctx.sample_counts);
        let layout = ResourceLayout::new(ctx.width(), ctx.height(), samples);
        let output_format = ctx.format();

        let mut composer = ShaderComposer::new()?;
        let shared = SharedLayouts::new(&ctx.device);
        let pipelines =
            PipelineSet::new(&ctx.device, &mut composer, &shared, &layout, output_format)?;
        let resources = ResourceSet::new(&ctx.device, layout);
        let lights = LightPool::new(
            &ctx.device,
            options.lighting.active_lights(),
            options.lighting.pin_focal_light,
        );
        let constants = UniformBuffer::new(&ctx.device, "Frame Constants");
        let frame_group = create_frame_group(&ctx.device, &shared, &constants, &lights);
        let timer = FrameTimer::new(&ctx.device, &ctx.queue);

        Ok(Self {
            composer,
            shared,
            pipelines,
            resources,
            lights,
            constants,
            frame_group,
            timer,
            output_format,
            last_technique: None,
        })
    }

    /// Reallocate the resource set for a new output size or sample count.
    /// Pipelines are rebuilt only when the sample count changes.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::ShaderCompose`] if rebuilt pipelines fail
    /// to compose.
    ///
    /// # Panics
    ///
    /// Panics on a zero extent.
    pub fn resize(
        &mut self,
        ctx: &RenderContext,
        width: u32,
        height: u32,
        samples: u32,
    ) -> Result<(), LightcullError> {
        let samples = pick_samples(samples, &ctx.sample_counts);
        let layout = ResourceLayout::new(width, height, samples);
        if layout == *self.resources.layout() {
            return Ok(());
        }
        if samples != self.pipelines.samples() {
            self.pipelines = PipelineSet::new(
                &ctx.device,
                &mut self.composer,
                &self.shared,
                &layout,
                self.output_format,
            )?;
        }
        self.resources = ResourceSet::new(&ctx.device, layout);
        Ok(())
    }

    /// Resize the light pool to `active` lights.
    pub fn set_active_lights(&mut self, device: &wgpu::Device, active: usize) {
        if active == self.lights.active() {
            return;
        }
        self.lights.configure(device, active);
        self.frame_group = create_frame_group(device, &self.shared, &self.constants, &self.lights);
    }

    /// Apply lighting options and advance the light animation by
    /// `elapsed_seconds`.
    pub fn update(&mut self, device: &wgpu::Device, elapsed_seconds: f32, options: &Options) {
        self.set_active_lights(device, options.lighting.active_lights());
        self.lights.state_mut().pin_focal_light = options.lighting.pin_focal_light;
        if options.lighting.animate {
            self.lights.advance(elapsed_seconds);
        }
    }

    /// Record and submit one frame.
    ///
    /// # Panics
    ///
    /// Panics if the technique's plan violates the binding contract: a
    /// member read and written in one pass, a binding its program does not
    /// declare, or a pass that never ends. Nothing is submitted then.
    pub fn render(
        &mut self,
        ctx: &RenderContext,
        frame: &FrameInput<'_>,
        meshes: SceneMeshes<'_>,
        output: &OutputTarget<'_>,
    ) {
        let technique = frame.options.renderer.technique;
        if self.last_technique != Some(technique) {
            log::info!("technique: {technique}");
            self.last_technique = Some(technique);
        }

        let view = frame.camera.view();
        let world_view_proj = frame.camera.projection() * view * frame.world;
        meshes.opaque.update_visibility(world_view_proj);
        meshes.alpha_tested.update_visibility(world_view_proj);

        self.lights.upload(&ctx.queue, view);
        let layout = *self.resources.layout();
        let active_lights = self.lights.active() as u32;
        self.constants.write(
            &ctx.queue,
            &FrameConstants::new(&FrameParams {
                camera: frame.camera,
                world: frame.world,
                options: frame.options,
                layout: &layout,
                active_lights,
            }),
        );

        let plan = dispatcher::plan_frame(technique, &layout);
        let replayed = plan
            .replay(&mut BindingTable::default())
            .map_err(|hazard| hazard.to_string());
        assert_eq!(replayed, Ok(()), "{technique} at {}x", layout.samples);
        self.resources
            .prepare_bind_groups(&ctx.device, &self.pipelines, &plan);

        let mut encoder = ctx.create_encoder();
        executor::encode(
            &mut encoder,
            &plan,
            &PassInputs {
                resources: &self.resources,
                pipelines: &self.pipelines,
                frame_group: &self.frame_group,
                timer: &self.timer,
                meshes: &meshes,
                output,
                active_lights,
            },
        );
        self.timer.resolve(&mut encoder, technique);
        ctx.submit(encoder);
        self.timer.after_submit();
        log::trace!("submitted {} passes", plan.steps.len());
    }

    /// Non-blocking timestamp readback. Returns `true` when new stage
    /// times arrived.
    pub fn poll_timers(&mut self, device: &wgpu::Device) -> bool {
        self.timer.poll(device)
    }

    /// Stage times of the newest frame whose timestamps came back, in the
    /// columns of the technique that rendered that frame.
    pub fn frame_times(&self) -> FrameTimes {
        self.times_of(self.timer.latest())
    }

    /// Like [`Self::frame_times`], but waits for the last submitted frame.
    pub fn frame_times_blocking(&mut self, device: &wgpu::Device) -> FrameTimes {
        let latest = self.timer.read_blocking(device).copied();
        self.times_of(latest.as_ref())
    }

    fn times_of(&self, latest: Option<&StageTimes<Technique>>) -> FrameTimes {
        latest.map_or_else(
            || FrameTimes::new(self.technique(), self.timer.unavailable()),
            |times| FrameTimes::new(times.tag, times.readings),
        )
    }

    /// Memory footprint of `technique` at the current layout.
    pub fn memory_report(&self, technique: Technique) -> MemoryReport {
        MemoryReport::for_technique(self.resources.layout(), technique)
    }

    /// Every sample of pixel (`x`, `y`) in the compute lit buffer. Blocks;
    /// debug only.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::BufferMap`] when the staging map fails.
    ///
    /// # Panics
    ///
    /// Panics if the pixel is outside the resource set.
    pub fn inspect_flat_pixel(
        &mut self,
        ctx: &RenderContext,
        x: u32,
        y: u32,
    ) -> Result<Vec<[f32; 4]>, LightcullError> {
        let layout = *self.resources.layout();
        assert_in_bounds(&layout, x, y);
        let elements = self
            .resources
            .lit_flat_mut()
            .map(&ctx.device, &ctx.queue)?;
        let first = layout.flat_index(x, y, 0);
        Ok(elements
            .iter()
            .skip(first)
            .take(layout.samples as usize)
            .map(|e| e.rgba())
            .collect())
    }

    /// Node count and decoded merge nodes of pixel (`x`, `y`) after a
    /// streaming frame. Blocks; debug only.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::BufferMap`] when a staging map fails.
    ///
    /// # Panics
    ///
    /// Panics if the pixel is outside the resource set.
    pub fn inspect_merge_nodes(
        &mut self,
        ctx: &RenderContext,
        x: u32,
        y: u32,
    ) -> Result<MergeNodeInspection, LightcullError> {
        let layout = *self.resources.layout();
        assert_in_bounds(&layout, x, y);
        let pixel = (y * layout.width + x) as usize;
        let counts = self
            .resources
            .node_counts_mut()
            .map(&ctx.device, &ctx.queue)?;
        let count = counts.get(pixel).copied().unwrap_or_default();
        let stored = (count as usize).min(MAX_SURFACES_PER_PIXEL);
        let nodes = self
            .resources
            .merge_nodes_mut()
            .map(&ctx.device, &ctx.queue)?;
        Ok(MergeNodeInspection {
            count,
            nodes: nodes
                .iter()
                .skip(pixel * MAX_SURFACES_PER_PIXEL)
                .take(stored)
                .map(|n| n.decode())
                .collect(),
        })
    }

    /// Read the light mirror as shaders last saw it. Blocks; debug only.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::BufferMap`] when the staging map fails.
    pub fn read_lights(
        &mut self,
        ctx: &RenderContext,
    ) -> Result<Vec<GpuPointLight>, LightcullError> {
        self.lights.read_back(&ctx.device, &ctx.queue)
    }

    /// The technique of the last frame, or the default before the first.
    pub fn technique(&self) -> Technique {
        self.last_technique.unwrap_or_default()
    }

    /// Current resource layout.
    pub fn layout(&self) -> &ResourceLayout {
        self.resources.layout()
    }

    /// Current resource set.
    pub fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    /// Light pool.
    pub fn lights(&self) -> &LightPool {
        &self.lights
    }

    /// Layout mesh providers must build their material bind groups with.
    pub fn material_layout(&self) -> &wgpu::BindGroupLayout {
        &self.shared.material
    }
}

fn create_frame_group(
    device: &wgpu::Device,
    shared: &SharedLayouts,
    constants: &UniformBuffer<FrameConstants>,
    lights: &LightPool,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Frame"),
        layout: &shared.frame,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: constants.buffer().as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: lights.buffer().as_entire_binding(),
            },
        ],
    })
}

/// Highest supported count not above `requested`.
fn pick_samples(requested: u32, supported: &[u32]) -> u32 {
    if supported.contains(&requested) {
        return requested;
    }
    let fallback = supported
        .iter()
        .copied()
        .filter(|&s| s <= requested)
        .max()
        .unwrap_or(1);
    log::warn!("{requested}x MSAA unsupported, using {fallback}x");
    fallback
}

fn assert_in_bounds(layout: &ResourceLayout, x: u32, y: u32) {
    assert!(
        x < layout.width && y < layout.height,
        "pixel ({x}, {y}) outside {}x{}",
        layout.width,
        layout.height
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::gpu::test_support::{headless_context, TEST_OUTPUT_FORMAT};
    use crate::lights::FOCAL_LIGHT_POSITION;
    use crate::mesh::MeshProvider;

    /// An unloaded mesh that remembers what it was culled against.
    #[derive(Default)]
    struct Unloaded {
        culled_with: Option<Mat4>,
    }

    impl MeshProvider for Unloaded {
        fn is_loaded(&self) -> bool {
            false
        }

        fn update_visibility(&mut self, world_view_proj: Mat4) {
            self.culled_with = Some(world_view_proj);
        }

        fn draw(&self, _pass: &mut wgpu::RenderPass<'_>, _material_group: u32) {}
    }

    fn output_texture(ctx: &RenderContext) -> wgpu::Texture {
        ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Test Output"),
            size: wgpu::Extent3d {
                width: ctx.width(),
                height: ctx.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEST_OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
    }

    fn render_once(renderer: &mut Renderer, ctx: &RenderContext, options: &Options) {
        let _ = render_with_world(renderer, ctx, options, Mat4::IDENTITY);
    }

    fn render_with_world(
        renderer: &mut Renderer,
        ctx: &RenderContext,
        options: &Options,
        world: Mat4,
    ) -> [Unloaded; 2] {
        let camera = Camera::at_origin(1.0);
        let texture = output_texture(ctx);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let (mut opaque, mut alpha_tested) = (Unloaded::default(), Unloaded::default());
        renderer.render(
            ctx,
            &FrameInput {
                camera: &camera,
                world,
                options,
            },
            SceneMeshes {
                opaque: &mut opaque,
                alpha_tested: &mut alpha_tested,
            },
            &OutputTarget {
                view: &view,
                viewport: Viewport::full(ctx.width(), ctx.height()),
            },
        );
        [opaque, alpha_tested]
    }

    #[test]
    fn unsupported_sample_counts_fall_back_downwards() {
        assert_eq!(pick_samples(4, &[1, 4]), 4);
        assert_eq!(pick_samples(8, &[1, 2, 4]), 4);
        assert_eq!(pick_samples(2, &[1, 4]), 1);
    }

    #[test]
    fn focal_light_reaches_the_gpu_at_its_pinned_position() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let mut options = Options::default();
        options.renderer.technique = Technique::DeferredQuad;
        options.renderer.msaa_samples = 1;
        options.lighting.active_lights_power = 0;

        let mut renderer = Renderer::new(&ctx, &options).unwrap();
        renderer.update(&ctx.device, 0.0, &options);
        render_once(&mut renderer, &ctx, &options);

        let lights = renderer.read_lights(&ctx).unwrap();
        assert_eq!(lights.len(), 1);
        let got = glam::Vec3::from_array(lights[0].position_view);
        assert!(
            got.abs_diff_eq(FOCAL_LIGHT_POSITION, 1e-5),
            "light 0 at {got}"
        );
    }

    #[test]
    fn every_technique_renders_at_every_supported_sample_count() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let mut options = Options::default();
        options.lighting.active_lights_power = 2;
        let mut renderer = Renderer::new(&ctx, &options).unwrap();
        for &samples in &ctx.sample_counts {
            renderer
                .resize(&ctx, ctx.width(), ctx.height(), samples)
                .unwrap();
            assert_eq!(renderer.layout().samples, samples);
            for technique in Technique::ALL {
                options.renderer.technique = technique;
                render_once(&mut renderer, &ctx, &options);
                assert_eq!(renderer.technique(), technique);
            }
        }
        let times = renderer.frame_times_blocking(&ctx.device);
        assert_eq!(times.values().len(), times.header().split(", ").count());
    }

    #[test]
    fn blocking_times_follow_the_last_technique() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let mut options = Options::default();
        options.renderer.msaa_samples = 1;
        let mut renderer = Renderer::new(&ctx, &options).unwrap();
        for technique in [Technique::ForwardNoCull, Technique::StreamingSbaa, Technique::ComputeTile] {
            options.renderer.technique = technique;
            render_once(&mut renderer, &ctx, &options);
        }
        let times = renderer.frame_times_blocking(&ctx.device);
        assert_eq!(times.technique(), Technique::ComputeTile);
        assert!(times.is_ready(), "{}", times.csv());
        assert_eq!(renderer.frame_times(), times);
    }

    #[test]
    fn meshes_are_culled_with_the_frame_world_transform() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let options = Options::default();
        let mut renderer = Renderer::new(&ctx, &options).unwrap();
        let world = Mat4::from_translation(glam::Vec3::new(3.0, -2.0, -40.0));
        let camera = Camera::at_origin(1.0);
        let expected = camera.projection() * camera.view() * world;
        for layer in render_with_world(&mut renderer, &ctx, &options, world) {
            assert_eq!(layer.culled_with, Some(expected));
        }
    }

    #[test]
    fn light_count_follows_options() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let mut options = Options::default();
        let mut renderer = Renderer::new(&ctx, &options).unwrap();
        options.lighting.active_lights_power = 3;
        renderer.update(&ctx.device, 0.5, &options);
        assert_eq!(renderer.lights().active(), 8);
        assert_eq!(renderer.lights().state().total_time(), 0.5);

        options.lighting.animate = false;
        renderer.update(&ctx.device, 0.5, &options);
        assert_eq!(renderer.lights().state().total_time(), 0.5);
    }

    #[test]
    fn cleared_scene_leaves_no_merge_nodes() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let mut options = Options::default();
        options.renderer.technique = Technique::StreamingSbaa;
        options.renderer.msaa_samples = 1;
        let mut renderer = Renderer::new(&ctx, &options).unwrap();
        render_once(&mut renderer, &ctx, &options);
        let inspection = renderer.inspect_merge_nodes(&ctx, 3, 5).unwrap();
        assert_eq!(inspection.count, 0);
        assert!(inspection.nodes.is_empty());
    }

    #[test]
    fn flat_pixel_inspection_returns_one_color_per_sample() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let mut options = Options::default();
        options.renderer.technique = Technique::ComputeTile;
        let mut renderer = Renderer::new(&ctx, &options).unwrap();
        render_once(&mut renderer, &ctx, &options);
        let samples = renderer.layout().samples as usize;
        let colors = renderer.inspect_flat_pixel(&ctx, 10, 20).unwrap();
        assert_eq!(colors.len(), samples);
    }
}
