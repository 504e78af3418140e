//! Encodes a [`FramePlan`] into wgpu passes.

use super::plan::{
    AttachmentOp, ColorAttachment, ComputeDispatch, DepthAttachment, DrawCall,
    FramePlan, Geometry, MeshLayer, PassKind, PassStep, RenderPassDesc, Target,
};
use super::programs::{Pipeline, PipelineSet};
use super::resources::ResourceSet;
use super::technique::Technique;
use crate::gpu::timer::FrameTimer;
use crate::mesh::{MeshProvider, MATERIAL_GROUP};

/// Region of the output target the frame is drawn into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge in pixels.
    pub x: f32,
    /// Top edge in pixels.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
}

impl Viewport {
    /// Viewport covering a `width` x `height` target.
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
        }
    }
}

/// The caller-owned view the final pass writes.
pub struct OutputTarget<'a> {
    /// Output view, in the format the renderer was created with.
    pub view: &'a wgpu::TextureView,
    /// Region written.
    pub viewport: Viewport,
}

/// The two mesh layers of a scene.
pub struct SceneMeshes<'a> {
    /// Opaque geometry.
    pub opaque: &'a mut dyn MeshProvider,
    /// Alpha-tested geometry.
    pub alpha_tested: &'a mut dyn MeshProvider,
}

impl SceneMeshes<'_> {
    fn layer(&self, layer: MeshLayer) -> &dyn MeshProvider {
        match layer {
            MeshLayer::Opaque => &*self.opaque,
            MeshLayer::AlphaTested => &*self.alpha_tested,
        }
    }
}

/// Everything a plan's passes reference.
pub struct PassInputs<'a, 'm> {
    /// Intermediate surfaces, buffers and their bind groups.
    pub resources: &'a ResourceSet,
    /// Pipelines for the current sample count.
    pub pipelines: &'a PipelineSet,
    /// Group 0: frame constants and lights.
    pub frame_group: &'a wgpu::BindGroup,
    /// Stage timestamps.
    pub timer: &'a FrameTimer<Technique>,
    /// Scene geometry.
    pub meshes: &'a SceneMeshes<'m>,
    /// Final destination.
    pub output: &'a OutputTarget<'a>,
    /// Light quad instance count.
    pub active_lights: u32,
}

/// Record every step of `plan` into `encoder`.
///
/// # Panics
///
/// Panics if a step names a program without a pipeline, a binding set
/// without a prepared bind group, or a member the resource set lacks. Plans
/// come from the dispatcher, so any of these is a renderer bug, and the
/// encoder is never submitted.
pub fn encode(encoder: &mut wgpu::CommandEncoder, plan: &FramePlan, inputs: &PassInputs<'_, '_>) {
    for (step, (begins, ends)) in plan.steps.iter().zip(plan.timestamp_flags()) {
        match &step.kind {
            PassKind::ClearBuffer(member) => {
                let Some(buffer) = inputs.resources.buffer(*member) else {
                    unreachable!("{}: {member:?} is not a buffer", step.label);
                };
                encoder.clear_buffer(buffer, 0, None);
            }
            PassKind::Compute(dispatch) => {
                encode_compute(encoder, step, dispatch, inputs, begins, ends);
            }
            PassKind::Render(desc) => {
                encode_render(encoder, step, desc, inputs, begins, ends);
            }
        }
    }
}

fn encode_compute(
    encoder: &mut wgpu::CommandEncoder,
    step: &PassStep,
    dispatch: &ComputeDispatch,
    inputs: &PassInputs<'_, '_>,
    begins: bool,
    ends: bool,
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(step.label),
        timestamp_writes: inputs.timer.compute_pass_writes(step.stage, begins, ends),
    });
    let Some(Pipeline::Compute(pipeline)) = inputs.pipelines.pipeline(dispatch.program) else {
        unreachable!("no compute pipeline for {:?}", dispatch.program);
    };
    let Some(group) = inputs
        .resources
        .bind_group(dispatch.program, dispatch.bindings.members())
    else {
        unreachable!("no bind group for {:?} in '{}'", dispatch.program, step.label);
    };
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, inputs.frame_group, &[]);
    pass.set_bind_group(1, group, &[]);
    pass.dispatch_workgroups(dispatch.groups.0, dispatch.groups.1, 1);
}

fn color_attachment<'a>(
    attachment: &ColorAttachment,
    inputs: &PassInputs<'a, '_>,
) -> wgpu::RenderPassColorAttachment<'a> {
    let view = match attachment.target {
        Target::Member(member) => {
            let Some(view) = inputs.resources.attachment(member) else {
                unreachable!("{member:?} is not a render target");
            };
            view
        }
        Target::Output => inputs.output.view,
    };
    let load = match attachment.op {
        AttachmentOp::Clear => wgpu::LoadOp::Clear(wgpu::Color::BLACK),
        AttachmentOp::Load | AttachmentOp::ReadOnly => wgpu::LoadOp::Load,
    };
    wgpu::RenderPassColorAttachment {
        view,
        depth_slice: None,
        resolve_target: None,
        ops: wgpu::Operations {
            load,
            store: wgpu::StoreOp::Store,
        },
    }
}

fn aspect_ops<V: Copy>(op: AttachmentOp, clear: V) -> Option<wgpu::Operations<V>> {
    let load = match op {
        AttachmentOp::Clear => wgpu::LoadOp::Clear(clear),
        AttachmentOp::Load => wgpu::LoadOp::Load,
        AttachmentOp::ReadOnly => return None,
    };
    Some(wgpu::Operations {
        load,
        store: wgpu::StoreOp::Store,
    })
}

fn depth_attachment<'a>(
    attachment: &DepthAttachment,
    inputs: &PassInputs<'a, '_>,
) -> wgpu::RenderPassDepthStencilAttachment<'a> {
    let (Some(surface), Some(view)) = (
        inputs.resources.surface(attachment.member),
        inputs.resources.attachment(attachment.member),
    ) else {
        unreachable!("{:?} is not a depth surface", attachment.member);
    };
    let has_stencil = surface.desc().format.has_stencil_aspect();
    wgpu::RenderPassDepthStencilAttachment {
        view,
        // Reversed depth: the far plane is 0.
        depth_ops: aspect_ops(attachment.depth, 0.0),
        stencil_ops: if has_stencil {
            aspect_ops(attachment.stencil, 0)
        } else {
            None
        },
    }
}

fn encode_render(
    encoder: &mut wgpu::CommandEncoder,
    step: &PassStep,
    desc: &RenderPassDesc,
    inputs: &PassInputs<'_, '_>,
    begins: bool,
    ends: bool,
) {
    let color: Vec<_> = desc
        .color
        .iter()
        .map(|c| Some(color_attachment(c, inputs)))
        .collect();
    let writes_output = desc.color.iter().any(|c| c.target == Target::Output);
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(step.label),
        color_attachments: &color,
        depth_stencil_attachment: desc
            .depth
            .as_ref()
            .map(|d| depth_attachment(d, inputs)),
        timestamp_writes: inputs.timer.render_pass_writes(step.stage, begins, ends),
        occlusion_query_set: None,
    });
    if writes_output {
        let v = inputs.output.viewport;
        pass.set_viewport(v.x, v.y, v.width, v.height, 0.0, 1.0);
    }
    for draw in &desc.draws {
        encode_draw(&mut pass, draw, inputs);
    }
}

fn encode_draw(pass: &mut wgpu::RenderPass<'_>, draw: &DrawCall, inputs: &PassInputs<'_, '_>) {
    let Some(Pipeline::Render(pipeline)) = inputs.pipelines.pipeline(draw.program) else {
        unreachable!("no render pipeline for {:?}", draw.program);
    };
    let Some(group) = inputs
        .resources
        .bind_group(draw.program, draw.bindings.members())
    else {
        unreachable!("no bind group for {:?}", draw.program);
    };
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, inputs.frame_group, &[]);
    pass.set_bind_group(1, group, &[]);
    if let Some(reference) = draw.stencil_ref {
        pass.set_stencil_reference(reference);
    }
    match draw.geometry {
        Geometry::Mesh(layer) => {
            let mesh = inputs.meshes.layer(layer);
            if mesh.is_loaded() {
                mesh.draw(pass, MATERIAL_GROUP);
            }
        }
        Geometry::FullScreen => pass.draw(0..3, 0..1),
        Geometry::LightQuads => {
            if inputs.active_lights > 0 {
                pass.draw(0..6, 0..inputs.active_lights);
            }
        }
    }
}
