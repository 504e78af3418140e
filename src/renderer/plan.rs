//! A technique's frame as data: the ordered passes, what each one writes,
//! and what every draw binds.
//!
//! Plans are built without a GPU, which lets tests replay them through a
//! [`BindingTable`] to prove that no surface is read while it is being
//! written and that nothing stays bound once the frame ends.

use std::collections::BTreeSet;
use std::fmt;

use super::programs::ProgramId;
use super::resources::Member;
use crate::gpu::timer::GpuStage;

/// A color attachment destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A resource set surface.
    Member(Member),
    /// The caller's output view.
    Output,
}

/// What happens to an attachment's previous contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentOp {
    /// Clear, then write.
    Clear,
    /// Keep, then write.
    Load,
    /// Keep, never write; the aspect may be sampled during the pass.
    ReadOnly,
}

/// One color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorAttachment {
    /// Destination.
    pub target: Target,
    /// Clear or keep. `ReadOnly` is not meaningful for color.
    pub op: AttachmentOp,
}

/// The depth/stencil attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthAttachment {
    /// Depth surface.
    pub member: Member,
    /// Depth aspect.
    pub depth: AttachmentOp,
    /// Stencil aspect; ignored for formats without stencil.
    pub stencil: AttachmentOp,
}

impl DepthAttachment {
    /// Whether either aspect is written.
    #[must_use]
    pub fn writes(&self) -> bool {
        self.depth != AttachmentOp::ReadOnly || self.stencil != AttachmentOp::ReadOnly
    }
}

/// Mesh subset drawn by a mesh program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshLayer {
    /// Opaque geometry.
    Opaque,
    /// Alpha-tested geometry.
    AlphaTested,
}

/// Geometry a draw submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    /// Every visible submesh of a mesh layer.
    Mesh(MeshLayer),
    /// One full-screen triangle.
    FullScreen,
    /// Six vertices per active light.
    LightQuads,
}

/// Resources a program binds in group 1: shader reads first, then
/// read-write storage, in binding order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bindings {
    /// Read-only members.
    pub reads: Vec<Member>,
    /// Read-write storage members.
    pub writes: Vec<Member>,
}

impl Bindings {
    /// Read-only bindings.
    #[must_use]
    pub fn read(reads: &[Member]) -> Self {
        Self {
            reads: reads.to_vec(),
            writes: Vec::new(),
        }
    }

    /// Read-only bindings followed by read-write storage.
    #[must_use]
    pub fn read_write(reads: &[Member], writes: &[Member]) -> Self {
        Self {
            reads: reads.to_vec(),
            writes: writes.to_vec(),
        }
    }

    /// Every member in binding order.
    #[must_use]
    pub fn members(&self) -> Vec<Member> {
        self.reads.iter().chain(&self.writes).copied().collect()
    }
}

/// One draw within a render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    /// Pipeline variant.
    pub program: ProgramId,
    /// Group 1 resources.
    pub bindings: Bindings,
    /// What is drawn.
    pub geometry: Geometry,
    /// Stencil reference, for stencil-tested programs.
    pub stencil_ref: Option<u32>,
}

/// A render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPassDesc {
    /// Color attachments in location order.
    pub color: Vec<ColorAttachment>,
    /// Depth/stencil attachment.
    pub depth: Option<DepthAttachment>,
    /// Draws in submission order.
    pub draws: Vec<DrawCall>,
}

/// A compute dispatch in its own pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeDispatch {
    /// Pipeline variant.
    pub program: ProgramId,
    /// Group 1 resources.
    pub bindings: Bindings,
    /// Workgroup grid.
    pub groups: (u32, u32),
}

/// What a step does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassKind {
    /// A render pass.
    Render(RenderPassDesc),
    /// A compute pass.
    Compute(ComputeDispatch),
    /// Zero a buffer member outside any pass.
    ClearBuffer(Member),
}

/// One step of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStep {
    /// Pass label, shown in GPU captures.
    pub label: &'static str,
    /// Stage the step is timed under.
    pub stage: GpuStage,
    /// The work.
    pub kind: PassKind,
}

impl PassStep {
    /// Members the step writes outside its shader bindings.
    #[must_use]
    pub fn attachment_writes(&self) -> Vec<Member> {
        match &self.kind {
            PassKind::Render(pass) => pass
                .color
                .iter()
                .filter_map(|c| match c.target {
                    Target::Member(m) => Some(m),
                    Target::Output => None,
                })
                .chain(pass.depth.filter(DepthAttachment::writes).map(|d| d.member))
                .collect(),
            PassKind::Compute(_) => Vec::new(),
            PassKind::ClearBuffer(member) => vec![*member],
        }
    }

    fn is_timed(&self) -> bool {
        !matches!(self.kind, PassKind::ClearBuffer(_))
    }
}

/// A binding contract violation found while replaying a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingHazard {
    /// A member is read and written in the same pass.
    ReadWrite {
        /// Pass where the conflict occurred.
        pass: &'static str,
        /// Conflicting member.
        member: Member,
        /// Program whose binding caused it.
        program: ProgramId,
    },
    /// A program binds resources its group 1 layout does not declare.
    Undeclared {
        /// Pass the draw or dispatch belongs to.
        pass: &'static str,
        /// Offending program.
        program: ProgramId,
        /// Members it tried to bind, in binding order.
        members: Vec<Member>,
    },
    /// A pass began, or the frame ended, while bindings were still held.
    Unreleased {
        /// Pass that still held them.
        pass: &'static str,
        /// Members still bound.
        members: Vec<Member>,
    },
}

impl BindingHazard {
    /// Pass the violation occurred in.
    #[must_use]
    pub fn pass(&self) -> &'static str {
        match self {
            Self::ReadWrite { pass, .. }
            | Self::Undeclared { pass, .. }
            | Self::Unreleased { pass, .. } => *pass,
        }
    }
}

impl fmt::Display for BindingHazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadWrite {
                pass,
                member,
                program,
            } => write!(
                f,
                "{member:?} is both read and written in pass '{pass}' by {program:?}"
            ),
            Self::Undeclared {
                pass,
                program,
                members,
            } => write!(
                f,
                "{program:?} in pass '{pass}' binds {members:?}, which its layout does not declare"
            ),
            Self::Unreleased { pass, members } => {
                write!(f, "pass '{pass}' still holds {members:?}")
            }
        }
    }
}

impl std::error::Error for BindingHazard {}

/// Whether `member` may fill `entry`: storage writes go to read-write
/// buffers, everything else to read-only slots of the same kind.
fn fits(member: Member, entry: &wgpu::BindGroupLayoutEntry, write: bool) -> bool {
    match entry.ty {
        wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            ..
        } => member.is_buffer() && read_only != write,
        wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            ..
        } => !write && member.is_depth(),
        wgpu::BindingType::Texture { .. } => !write && !member.is_buffer() && !member.is_depth(),
        _ => false,
    }
}

/// Tracks which members the open pass holds for reading and writing.
#[derive(Debug, Default)]
pub struct BindingTable {
    open: Option<&'static str>,
    writes: BTreeSet<Member>,
    reads: BTreeSet<Member>,
}

impl BindingTable {
    /// Start a pass that writes `writes` through its attachments.
    ///
    /// # Errors
    ///
    /// Returns [`BindingHazard::Unreleased`] if the previous pass never
    /// ended.
    pub fn begin_pass(
        &mut self,
        label: &'static str,
        writes: impl IntoIterator<Item = Member>,
    ) -> Result<(), BindingHazard> {
        self.finish()?;
        self.open = Some(label);
        self.writes.extend(writes);
        Ok(())
    }

    /// Bind `bindings` for `program` in the open pass.
    ///
    /// # Errors
    ///
    /// Returns [`BindingHazard::Undeclared`] when the members do not match
    /// the program's group 1 layout, or when no pass is open, and
    /// [`BindingHazard::ReadWrite`] when a member would be read and written
    /// in the same pass.
    pub fn bind(&mut self, program: ProgramId, bindings: &Bindings) -> Result<(), BindingHazard> {
        let pass = self.open.unwrap_or("<no pass>");
        let entries = program.resource_entries(false);
        let members = bindings.members();
        let declared = self.open.is_some()
            && entries.len() == members.len()
            && members
                .iter()
                .zip(&entries)
                .enumerate()
                .all(|(i, (&member, entry))| fits(member, entry, i >= bindings.reads.len()));
        if !declared {
            return Err(BindingHazard::Undeclared {
                pass,
                program,
                members,
            });
        }

        let hazard = |member| BindingHazard::ReadWrite {
            pass,
            member,
            program,
        };
        if let Some(&member) = bindings.reads.iter().find(|m| self.writes.contains(m)) {
            return Err(hazard(member));
        }
        if let Some(&member) = bindings.writes.iter().find(|m| self.reads.contains(m)) {
            return Err(hazard(member));
        }
        self.reads.extend(bindings.reads.iter().copied());
        self.writes.extend(bindings.writes.iter().copied());
        Ok(())
    }

    /// End the open pass, unbinding everything it bound.
    pub fn end_pass(&mut self) {
        self.open = None;
        self.reads.clear();
        self.writes.clear();
    }

    /// Check that no pass is still open.
    ///
    /// # Errors
    ///
    /// Returns [`BindingHazard::Unreleased`] naming the open pass and what
    /// it holds.
    pub fn finish(&self) -> Result<(), BindingHazard> {
        match self.open {
            Some(pass) => Err(BindingHazard::Unreleased {
                pass,
                members: self.reads.union(&self.writes).copied().collect(),
            }),
            None => Ok(()),
        }
    }

    /// Whether no pass is open and nothing is bound.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.open.is_none() && self.reads.is_empty() && self.writes.is_empty()
    }
}

/// The ordered steps of one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FramePlan {
    /// Steps in submission order.
    pub steps: Vec<PassStep>,
}

impl FramePlan {
    /// Replay the plan through `table`, ending with every pass closed.
    ///
    /// # Errors
    ///
    /// Returns the first [`BindingHazard`] encountered.
    pub fn replay(&self, table: &mut BindingTable) -> Result<(), BindingHazard> {
        for step in &self.steps {
            table.begin_pass(step.label, step.attachment_writes())?;
            match &step.kind {
                PassKind::Render(pass) => {
                    for draw in &pass.draws {
                        table.bind(draw.program, &draw.bindings)?;
                    }
                }
                PassKind::Compute(dispatch) => {
                    table.bind(dispatch.program, &dispatch.bindings)?;
                }
                PassKind::ClearBuffer(_) => {}
            }
            table.end_pass();
        }
        table.finish()
    }

    /// For each step, whether it writes its stage's begin and end
    /// timestamps: the first and last timed pass of each stage.
    #[must_use]
    pub fn timestamp_flags(&self) -> Vec<(bool, bool)> {
        let mut flags = vec![(false, false); self.steps.len()];
        for stage in GpuStage::ALL {
            let mut timed = self
                .steps
                .iter()
                .enumerate()
                .filter(|(_, s)| s.stage == stage && s.is_timed())
                .map(|(i, _)| i);
            if let Some(first) = timed.next() {
                flags[first].0 = true;
                let last = timed.last().unwrap_or(first);
                flags[last].1 = true;
            }
        }
        flags
    }

    /// Labels in order.
    #[must_use]
    pub fn labels(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.label).collect()
    }

    /// Every program the plan runs with the resources it binds, in
    /// submission order.
    #[must_use]
    pub fn bindings(&self) -> Vec<(ProgramId, &Bindings)> {
        let mut bound = Vec::new();
        for step in &self.steps {
            match &step.kind {
                PassKind::Render(pass) => {
                    bound.extend(pass.draws.iter().map(|d| (d.program, &d.bindings)));
                }
                PassKind::Compute(dispatch) => bound.push((dispatch.program, &dispatch.bindings)),
                PassKind::ClearBuffer(_) => {}
            }
        }
        bound
    }

    /// Every program the plan runs.
    #[must_use]
    pub fn programs(&self) -> Vec<ProgramId> {
        self.bindings().into_iter().map(|(program, _)| program).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_screen(program: ProgramId, reads: &[Member]) -> DrawCall {
        DrawCall {
            program,
            bindings: Bindings::read(reads),
            geometry: Geometry::FullScreen,
            stencil_ref: None,
        }
    }

    #[test]
    fn reading_an_attachment_is_a_hazard() {
        let plan = FramePlan {
            steps: vec![PassStep {
                label: "Bad Tonemap",
                stage: GpuStage::Resolve,
                kind: PassKind::Render(RenderPassDesc {
                    color: vec![ColorAttachment {
                        target: Target::Member(Member::LitBuffer),
                        op: AttachmentOp::Load,
                    }],
                    depth: None,
                    draws: vec![full_screen(
                        ProgramId::Tonemap { flat: false },
                        &[Member::LitBuffer, Member::Depth],
                    )],
                }),
            }],
        };
        let mut table = BindingTable::default();
        let err = plan.replay(&mut table).unwrap_err();
        assert_eq!(
            err,
            BindingHazard::ReadWrite {
                pass: "Bad Tonemap",
                member: Member::LitBuffer,
                program: ProgramId::Tonemap { flat: false },
            }
        );
    }

    #[test]
    fn read_only_depth_may_be_sampled() {
        let depth = DepthAttachment {
            member: Member::DepthStencil,
            depth: AttachmentOp::ReadOnly,
            stencil: AttachmentOp::ReadOnly,
        };
        assert!(!depth.writes());
        let step = PassStep {
            label: "Lighting",
            stage: GpuStage::Lighting,
            kind: PassKind::Render(RenderPassDesc {
                color: vec![ColorAttachment {
                    target: Target::Member(Member::LitBuffer),
                    op: AttachmentOp::Clear,
                }],
                depth: Some(depth),
                draws: vec![full_screen(
                    ProgramId::BasicLoop { per_sample: false },
                    &[
                        Member::GBufferNormalSpecular,
                        Member::GBufferAlbedo,
                        Member::GBufferPositionZGrad,
                        Member::DepthStencil,
                    ],
                )],
            }),
        };
        let mut table = BindingTable::default();
        FramePlan { steps: vec![step] }.replay(&mut table).unwrap();
        assert!(table.is_clear());
    }

    #[test]
    fn storage_write_after_read_in_one_pass_is_a_hazard() {
        let mut table = BindingTable::default();
        table.begin_pass("Mixed", []).unwrap();
        table
            .bind(
                ProgramId::StreamingResolve,
                &Bindings::read(&[Member::MergeNodes, Member::NodeCounts]),
            )
            .unwrap();
        let err = table
            .bind(
                ProgramId::StreamingFill { ndi: false },
                &Bindings::read_write(&[], &[Member::MergeNodes, Member::NodeCounts]),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            BindingHazard::ReadWrite {
                member: Member::MergeNodes,
                ..
            }
        ));
        table.end_pass();
        assert!(table.is_clear());
    }

    #[test]
    fn binding_outside_the_program_layout_is_rejected() {
        let mut table = BindingTable::default();
        table.begin_pass("Tonemap", []).unwrap();

        // Depth where the lit texture belongs.
        let swapped = table.bind(
            ProgramId::Tonemap { flat: false },
            &Bindings::read(&[Member::Depth, Member::LitBuffer]),
        );
        assert!(matches!(swapped, Err(BindingHazard::Undeclared { .. })));

        // An extra member the layout has no slot for.
        let extra = table.bind(
            ProgramId::Tonemap { flat: false },
            &Bindings::read(&[Member::LitBuffer, Member::Depth, Member::GBufferAlbedo]),
        );
        assert!(matches!(extra, Err(BindingHazard::Undeclared { .. })));

        // Read-write storage bound as a plain read.
        let demoted = table.bind(
            ProgramId::StreamingFill { ndi: false },
            &Bindings::read(&[Member::MergeNodes, Member::NodeCounts]),
        );
        assert!(matches!(demoted, Err(BindingHazard::Undeclared { .. })));

        table
            .bind(
                ProgramId::Tonemap { flat: false },
                &Bindings::read(&[Member::LitBuffer, Member::Depth]),
            )
            .unwrap();
        table.end_pass();
        table.finish().unwrap();
    }

    #[test]
    fn binding_without_an_open_pass_is_rejected() {
        let mut table = BindingTable::default();
        let err = table
            .bind(ProgramId::StreamingResolve, &Bindings::read(&[Member::MergeNodes, Member::NodeCounts]))
            .unwrap_err();
        assert_eq!(err.pass(), "<no pass>");
    }

    #[test]
    fn a_pass_left_open_is_reported() {
        let mut table = BindingTable::default();
        table.begin_pass("Forward Shading", [Member::LitBuffer]).unwrap();
        assert!(!table.is_clear());
        assert_eq!(
            table.finish(),
            Err(BindingHazard::Unreleased {
                pass: "Forward Shading",
                members: vec![Member::LitBuffer],
            })
        );
        let next = table.begin_pass("Tonemap", []).unwrap_err();
        assert_eq!(next.pass(), "Forward Shading");

        table.end_pass();
        assert!(table.is_clear());
        table.begin_pass("Tonemap", []).unwrap();
    }

    #[test]
    fn timestamps_bracket_first_and_last_timed_pass() {
        let step = |label, stage, kind| PassStep { label, stage, kind };
        let empty = || {
            PassKind::Render(RenderPassDesc {
                color: Vec::new(),
                depth: None,
                draws: Vec::new(),
            })
        };
        let plan = FramePlan {
            steps: vec![
                step("clear", GpuStage::Forward, PassKind::ClearBuffer(Member::NodeCounts)),
                step("a", GpuStage::Forward, empty()),
                step("b", GpuStage::Forward, empty()),
                step("c", GpuStage::Resolve, empty()),
            ],
        };
        assert_eq!(
            plan.timestamp_flags(),
            vec![(false, false), (true, false), (false, true), (true, true)]
        );
    }
}
