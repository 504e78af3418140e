//! Per-technique pass sequences.
//!
//! [`plan_frame`] turns a technique and the current resource layout into a
//! [`FramePlan`]. Each technique has its own handler; the common pieces
//! (G-buffer fill, per-sample mark, tonemap) are shared helpers.

use super::plan::{
    AttachmentOp, Bindings, ColorAttachment, ComputeDispatch, DepthAttachment,
    DrawCall, FramePlan, Geometry, MeshLayer, PassKind, PassStep,
    RenderPassDesc, Target,
};
use super::programs::{ProgramId, PER_SAMPLE_STENCIL, TILE_SIZE};
use super::resources::{Member, ResourceLayout, GBUFFER};
use super::technique::Technique;
use crate::gpu::timer::GpuStage;

/// Build the pass sequence for `technique` at `layout`.
#[must_use]
pub fn plan_frame(technique: Technique, layout: &ResourceLayout) -> FramePlan {
    let steps = match technique {
        Technique::ForwardNoCull => forward(false),
        Technique::ForwardPreZ => forward(true),
        Technique::DeferredNoCull => deferred_no_cull(layout),
        Technique::DeferredQuad => deferred_quad(layout, false),
        Technique::DeferredQuadWithLightingBuffer => deferred_quad(layout, true),
        Technique::ComputeTile => compute_tile(layout),
        Technique::StreamingSbaa => streaming(false),
        Technique::StreamingSbaaNdi => streaming(true),
    };
    log::debug!(
        "planned {technique} with {} samples: {:?}",
        layout.samples,
        steps.iter().map(|s| s.label).collect::<Vec<_>>()
    );
    FramePlan { steps }
}

fn color(member: Member, op: AttachmentOp) -> ColorAttachment {
    ColorAttachment {
        target: Target::Member(member),
        op,
    }
}

fn cleared_depth(member: Member) -> DepthAttachment {
    DepthAttachment {
        member,
        depth: AttachmentOp::Clear,
        stencil: AttachmentOp::Clear,
    }
}

fn render(
    label: &'static str,
    stage: GpuStage,
    color: Vec<ColorAttachment>,
    depth: Option<DepthAttachment>,
    draws: Vec<DrawCall>,
) -> PassStep {
    PassStep {
        label,
        stage,
        kind: PassKind::Render(RenderPassDesc {
            color,
            depth,
            draws,
        }),
    }
}

/// Opaque then alpha-tested draws of a mesh program family.
fn mesh_draws(program: impl Fn(bool) -> ProgramId, bindings: &Bindings) -> Vec<DrawCall> {
    [(MeshLayer::Opaque, false), (MeshLayer::AlphaTested, true)]
        .into_iter()
        .map(|(layer, alpha_test)| DrawCall {
            program: program(alpha_test),
            bindings: bindings.clone(),
            geometry: Geometry::Mesh(layer),
            stencil_ref: None,
        })
        .collect()
}

/// Pixel-frequency draw, then a per-sample draw over marked pixels when
/// multisampled.
fn shading_frequencies(
    layout: &ResourceLayout,
    program: impl Fn(bool) -> ProgramId,
    bindings: &Bindings,
    geometry: Geometry,
) -> Vec<DrawCall> {
    let draw = |per_sample, stencil_ref| DrawCall {
        program: program(per_sample),
        bindings: bindings.clone(),
        geometry,
        stencil_ref,
    };
    if layout.is_multisampled() {
        vec![draw(false, Some(0)), draw(true, Some(PER_SAMPLE_STENCIL))]
    } else {
        vec![draw(false, None)]
    }
}

/// Stencil-tested read-only depth for lighting passes; none single-sampled.
fn lighting_depth(layout: &ResourceLayout) -> Option<DepthAttachment> {
    layout.is_multisampled().then_some(DepthAttachment {
        member: Member::DepthStencil,
        depth: AttachmentOp::ReadOnly,
        stencil: AttachmentOp::ReadOnly,
    })
}

fn gbuffer_reads(depth: Member) -> Vec<Member> {
    GBUFFER.into_iter().chain([depth]).collect()
}

fn gbuffer_fill(depth: Member) -> PassStep {
    let stencil = depth == Member::DepthStencil;
    render(
        "G-Buffer",
        GpuStage::Forward,
        GBUFFER
            .into_iter()
            .map(|m| color(m, AttachmentOp::Clear))
            .collect(),
        Some(cleared_depth(depth)),
        mesh_draws(
            |alpha_test| ProgramId::GBuffer {
                alpha_test,
                stencil,
            },
            &Bindings::default(),
        ),
    )
}

/// Stencil 1 where a pixel's samples disagree. Multisampled only.
fn per_sample_mark(layout: &ResourceLayout) -> Option<PassStep> {
    layout.is_multisampled().then(|| {
        render(
            "Per-Sample Mark",
            GpuStage::Lighting,
            Vec::new(),
            Some(DepthAttachment {
                member: Member::DepthStencil,
                depth: AttachmentOp::ReadOnly,
                stencil: AttachmentOp::Load,
            }),
            vec![DrawCall {
                program: ProgramId::PerSampleMark,
                bindings: Bindings::read(&GBUFFER),
                geometry: Geometry::FullScreen,
                stencil_ref: Some(PER_SAMPLE_STENCIL),
            }],
        )
    })
}

fn tonemap(lit: Member, depth: Member) -> PassStep {
    render(
        "Tonemap",
        GpuStage::Resolve,
        vec![ColorAttachment {
            target: Target::Output,
            op: AttachmentOp::Clear,
        }],
        None,
        vec![DrawCall {
            program: ProgramId::Tonemap {
                flat: lit == Member::LitBufferFlat,
            },
            bindings: Bindings::read(&[lit, depth]),
            geometry: Geometry::FullScreen,
            stencil_ref: None,
        }],
    )
}

fn forward(prepass: bool) -> Vec<PassStep> {
    let mut steps = Vec::new();
    if prepass {
        steps.push(render(
            "Depth Prepass",
            GpuStage::Forward,
            Vec::new(),
            Some(cleared_depth(Member::Depth)),
            mesh_draws(|alpha_test| ProgramId::DepthPrepass { alpha_test }, &Bindings::default()),
        ));
    }
    let depth = DepthAttachment {
        depth: if prepass {
            AttachmentOp::Load
        } else {
            AttachmentOp::Clear
        },
        ..cleared_depth(Member::Depth)
    };
    steps.push(render(
        "Forward Shading",
        GpuStage::Forward,
        vec![color(Member::LitBuffer, AttachmentOp::Clear)],
        Some(depth),
        mesh_draws(
            |alpha_test| ProgramId::Forward {
                alpha_test,
                after_prepass: prepass,
            },
            &Bindings::default(),
        ),
    ));
    steps.push(tonemap(Member::LitBuffer, Member::Depth));
    steps
}

fn deferred_no_cull(layout: &ResourceLayout) -> Vec<PassStep> {
    let mut steps = vec![gbuffer_fill(Member::DepthStencil)];
    steps.extend(per_sample_mark(layout));
    steps.push(render(
        "Deferred Lighting",
        GpuStage::Lighting,
        vec![color(Member::LitBuffer, AttachmentOp::Clear)],
        lighting_depth(layout),
        shading_frequencies(
            layout,
            |per_sample| ProgramId::BasicLoop { per_sample },
            &Bindings::read(&gbuffer_reads(Member::DepthStencil)),
            Geometry::FullScreen,
        ),
    ));
    steps.push(tonemap(Member::LitBuffer, Member::DepthStencil));
    steps
}

fn deferred_quad(layout: &ResourceLayout, accumulate: bool) -> Vec<PassStep> {
    let mut steps = vec![gbuffer_fill(Member::DepthStencil)];
    steps.extend(per_sample_mark(layout));
    let quad_target = if accumulate {
        Member::Accumulation
    } else {
        Member::LitBuffer
    };
    steps.push(render(
        "Light Quads",
        GpuStage::Lighting,
        vec![color(quad_target, AttachmentOp::Clear)],
        lighting_depth(layout),
        shading_frequencies(
            layout,
            |per_sample| ProgramId::LightQuad {
                per_sample,
                accumulate,
            },
            &Bindings::read(&gbuffer_reads(Member::DepthStencil)),
            Geometry::LightQuads,
        ),
    ));
    if accumulate {
        let mut reads = gbuffer_reads(Member::DepthStencil);
        reads.push(Member::Accumulation);
        steps.push(render(
            "Accumulation Resolve",
            GpuStage::Lighting,
            vec![color(Member::LitBuffer, AttachmentOp::Clear)],
            lighting_depth(layout),
            shading_frequencies(
                layout,
                |per_sample| ProgramId::AccumulationResolve { per_sample },
                &Bindings::read(&reads),
                Geometry::FullScreen,
            ),
        ));
    }
    steps.push(tonemap(Member::LitBuffer, Member::DepthStencil));
    steps
}

fn compute_tile(layout: &ResourceLayout) -> Vec<PassStep> {
    vec![
        gbuffer_fill(Member::Depth),
        PassStep {
            label: "Tile Lighting",
            stage: GpuStage::Lighting,
            kind: PassKind::Compute(ComputeDispatch {
                program: ProgramId::ComputeTile,
                bindings: Bindings::read_write(
                    &gbuffer_reads(Member::Depth),
                    &[Member::LitBufferFlat],
                ),
                groups: layout.tile_groups(TILE_SIZE),
            }),
        },
        tonemap(Member::LitBufferFlat, Member::Depth),
    ]
}

fn streaming(ndi: bool) -> Vec<PassStep> {
    vec![
        PassStep {
            label: "Clear Node Counts",
            stage: GpuStage::Forward,
            kind: PassKind::ClearBuffer(Member::NodeCounts),
        },
        render(
            "Streaming Fill",
            GpuStage::Forward,
            vec![color(Member::GBufferAlbedo, AttachmentOp::Clear)],
            Some(cleared_depth(Member::Depth)),
            mesh_draws(
                |_| ProgramId::StreamingFill { ndi },
                &Bindings::read_write(&[], &[Member::MergeNodes, Member::NodeCounts]),
            ),
        ),
        render(
            "Streaming Resolve",
            GpuStage::Resolve,
            vec![ColorAttachment {
                target: Target::Output,
                op: AttachmentOp::Clear,
            }],
            None,
            vec![DrawCall {
                program: ProgramId::StreamingResolve,
                bindings: Bindings::read(&[Member::MergeNodes, Member::NodeCounts]),
                geometry: Geometry::FullScreen,
                stencil_ref: None,
            }],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::renderer::plan::{BindingHazard, BindingTable};

    fn layouts() -> [ResourceLayout; 2] {
        [ResourceLayout::new(1280, 720, 1), ResourceLayout::new(1280, 720, 4)]
    }

    fn members_touched(plan: &FramePlan) -> BTreeSet<Member> {
        let mut touched = BTreeSet::new();
        for step in &plan.steps {
            touched.extend(step.attachment_writes());
            match &step.kind {
                PassKind::Render(pass) => {
                    touched.extend(pass.depth.map(|d| d.member));
                    for draw in &pass.draws {
                        touched.extend(draw.bindings.members());
                    }
                }
                PassKind::Compute(dispatch) => touched.extend(dispatch.bindings.members()),
                PassKind::ClearBuffer(_) => {}
            }
        }
        touched
    }

    #[test]
    fn every_plan_binds_what_its_programs_declare() {
        for layout in layouts() {
            for technique in Technique::ALL {
                let mut table = BindingTable::default();
                plan_frame(technique, &layout)
                    .replay(&mut table)
                    .unwrap_or_else(|e| panic!("{technique} at {}x: {e}", layout.samples));
                assert!(table.is_clear(), "{technique}");
            }
        }
    }

    #[test]
    fn replay_rejects_a_draw_binding_an_extra_member() {
        let mut plan = plan_frame(Technique::DeferredNoCull, &ResourceLayout::new(64, 64, 1));
        let PassKind::Render(lighting) = &mut plan.steps[1].kind else {
            panic!("deferred lighting is a render pass");
        };
        lighting.draws[0].bindings.reads.push(Member::Accumulation);

        let mut table = BindingTable::default();
        let err = plan.replay(&mut table).unwrap_err();
        assert_eq!(err.pass(), "Deferred Lighting");
        assert!(matches!(
            err,
            BindingHazard::Undeclared {
                program: ProgramId::BasicLoop { per_sample: false },
                ..
            }
        ));
        assert!(!table.is_clear());
    }

    #[test]
    fn replay_rejects_a_dispatch_writing_through_a_read_slot() {
        let mut plan = plan_frame(Technique::ComputeTile, &ResourceLayout::new(64, 64, 1));
        let PassKind::Compute(dispatch) = &mut plan.steps[1].kind else {
            panic!("tile lighting is a compute pass");
        };
        let flat = dispatch.bindings.writes.remove(0);
        dispatch.bindings.reads.push(flat);

        let err = plan.replay(&mut BindingTable::default()).unwrap_err();
        assert!(matches!(err, BindingHazard::Undeclared { .. }), "{err}");
    }

    #[test]
    fn plans_stay_within_declared_requirements() {
        for layout in layouts() {
            for technique in Technique::ALL {
                let required: BTreeSet<_> = technique.requirements().iter().copied().collect();
                let touched = members_touched(&plan_frame(technique, &layout));
                assert!(
                    touched.is_subset(&required),
                    "{technique} touches {:?}",
                    touched.difference(&required).collect::<Vec<_>>()
                );
            }
        }
    }

    #[test]
    fn single_sampled_plans_avoid_msaa_only_programs() {
        let layout = ResourceLayout::new(64, 64, 1);
        for technique in Technique::ALL {
            for program in plan_frame(technique, &layout).programs() {
                assert!(!program.requires_msaa(), "{technique}: {program:?}");
            }
        }
    }

    #[test]
    fn prepass_runs_before_forward_shading() {
        let layout = ResourceLayout::new(64, 64, 4);
        assert_eq!(
            plan_frame(Technique::ForwardPreZ, &layout).labels(),
            ["Depth Prepass", "Forward Shading", "Tonemap"]
        );
        assert_eq!(
            plan_frame(Technique::ForwardNoCull, &layout).labels(),
            ["Forward Shading", "Tonemap"]
        );
    }

    #[test]
    fn multisampled_deferred_marks_then_shades_both_frequencies() {
        let plan = plan_frame(Technique::DeferredQuadWithLightingBuffer, &ResourceLayout::new(64, 64, 4));
        assert_eq!(
            plan.labels(),
            ["G-Buffer", "Per-Sample Mark", "Light Quads", "Accumulation Resolve", "Tonemap"]
        );
        let PassKind::Render(quads) = &plan.steps[2].kind else {
            panic!("light quads are a render pass");
        };
        let refs: Vec<_> = quads.draws.iter().map(|d| d.stencil_ref).collect();
        assert_eq!(refs, [Some(0), Some(PER_SAMPLE_STENCIL)]);
        assert_eq!(quads.color[0].target, Target::Member(Member::Accumulation));

        let single = plan_frame(Technique::DeferredQuad, &ResourceLayout::new(64, 64, 1));
        assert_eq!(single.labels(), ["G-Buffer", "Light Quads", "Tonemap"]);
    }

    #[test]
    fn compute_dispatch_covers_the_output_in_tiles() {
        let plan = plan_frame(Technique::ComputeTile, &ResourceLayout::new(1000, 500, 1));
        let PassKind::Compute(dispatch) = &plan.steps[1].kind else {
            panic!("tile lighting is a compute pass");
        };
        assert_eq!(dispatch.groups, (63, 32));
        assert_eq!(dispatch.bindings.writes, [Member::LitBufferFlat]);
    }

    #[test]
    fn streaming_clears_counts_and_resolves_to_output() {
        for technique in [Technique::StreamingSbaa, Technique::StreamingSbaaNdi] {
            let plan = plan_frame(technique, &ResourceLayout::new(64, 64, 4));
            assert_eq!(plan.steps[0].kind, PassKind::ClearBuffer(Member::NodeCounts));
            let PassKind::Render(resolve) = &plan.steps[2].kind else {
                panic!("resolve is a render pass");
            };
            assert_eq!(resolve.color[0].target, Target::Output);
            assert_eq!(plan.steps[2].stage, GpuStage::Resolve);
        }
    }

    #[test]
    fn every_technique_times_each_reported_stage() {
        for layout in layouts() {
            for technique in Technique::ALL {
                let plan = plan_frame(technique, &layout);
                let flags = plan.timestamp_flags();
                for column in technique.timed_columns() {
                    let stage_steps: Vec<_> = plan
                        .steps
                        .iter()
                        .zip(&flags)
                        .filter(|(s, _)| s.stage == column.stage)
                        .collect();
                    assert!(stage_steps.iter().any(|(_, f)| f.0), "{technique} {:?}", column.stage);
                    assert!(stage_steps.iter().any(|(_, f)| f.1), "{technique} {:?}", column.stage);
                }
            }
        }
    }
}
