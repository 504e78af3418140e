//! The resource set: every intermediate surface and buffer for one output
//! size and sample count.
//!
//! [`ResourceLayout`] is the pure description (formats, sizes, footprint)
//! and needs no GPU; [`ResourceSet`] allocates it. A resize builds a new set
//! and drops the old one whole, so no member outlives its dimensions.

use rustc_hash::FxHashMap;

use super::elements::{FlatFramebufferElement, MergeNode, MAX_SURFACES_PER_PIXEL};
use super::plan::FramePlan;
use super::programs::{PipelineSet, ProgramId};
use crate::gpu::structured_buffer::StructuredBuffer;
use crate::gpu::surface::{Surface, SurfaceDesc};
use crate::options::SUPPORTED_MSAA_SAMPLES;

/// Format of the view-normal and specular G-buffer target.
pub const NORMAL_SPECULAR_FORMAT: wgpu::TextureFormat =
    wgpu::TextureFormat::Rgba16Float;
/// Format of the albedo G-buffer target.
pub const ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Format of the view-z gradient G-buffer target.
pub const POSITION_ZGRAD_FORMAT: wgpu::TextureFormat =
    wgpu::TextureFormat::Rg16Float;
/// Format of the lit and accumulation buffers.
pub const LIT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Format of the plain depth buffer.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// The G-buffer targets in binding order.
pub const GBUFFER: [Member; 3] = [
    Member::GBufferNormalSpecular,
    Member::GBufferAlbedo,
    Member::GBufferPositionZGrad,
];

/// A named member of the resource set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Member {
    /// Depth without stencil.
    Depth,
    /// Depth with stencil for per-sample marking when multisampled.
    DepthStencil,
    /// View normal in xyz, specular amount in w.
    GBufferNormalSpecular,
    /// Material albedo.
    GBufferAlbedo,
    /// Screen-space derivatives of view z.
    GBufferPositionZGrad,
    /// HDR lit color.
    LitBuffer,
    /// Per-sample lit color packed as half floats, written by compute.
    LitBufferFlat,
    /// Additive light accumulation before the resolve combines it.
    Accumulation,
    /// Streaming surfaces, [`MAX_SURFACES_PER_PIXEL`] per pixel.
    MergeNodes,
    /// Streaming surface count per pixel.
    NodeCounts,
}

impl Member {
    /// Every member.
    pub const ALL: [Self; 10] = [
        Self::Depth,
        Self::DepthStencil,
        Self::GBufferNormalSpecular,
        Self::GBufferAlbedo,
        Self::GBufferPositionZGrad,
        Self::LitBuffer,
        Self::LitBufferFlat,
        Self::Accumulation,
        Self::MergeNodes,
        Self::NodeCounts,
    ];

    /// Debug label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Depth => "Depth",
            Self::DepthStencil => "Depth Stencil",
            Self::GBufferNormalSpecular => "G-Buffer Normal Specular",
            Self::GBufferAlbedo => "G-Buffer Albedo",
            Self::GBufferPositionZGrad => "G-Buffer Position Z Grad",
            Self::LitBuffer => "Lit Buffer",
            Self::LitBufferFlat => "Lit Buffer Flat",
            Self::Accumulation => "Accumulation",
            Self::MergeNodes => "Merge Nodes",
            Self::NodeCounts => "Node Counts",
        }
    }

    /// Whether the member is a structured buffer rather than a surface.
    #[must_use]
    pub fn is_buffer(self) -> bool {
        matches!(self, Self::LitBufferFlat | Self::MergeNodes | Self::NodeCounts)
    }

    /// Whether the member is a depth surface, bound as a depth texture.
    #[must_use]
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth | Self::DepthStencil)
    }
}

/// Dimensions and sample count of a resource set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLayout {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// MSAA samples per pixel.
    pub samples: u32,
}

const TARGET_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING);

impl ResourceLayout {
    /// Layout for a `width` x `height` output with `samples` MSAA.
    ///
    /// # Panics
    ///
    /// Panics on a zero extent or an unsupported sample count.
    #[must_use]
    pub fn new(width: u32, height: u32, samples: u32) -> Self {
        assert!(width > 0 && height > 0, "resource set needs a non-zero extent");
        assert!(
            SUPPORTED_MSAA_SAMPLES.contains(&samples),
            "unsupported MSAA sample count {samples}"
        );
        Self {
            width,
            height,
            samples,
        }
    }

    /// Whether surfaces carry more than one sample.
    #[must_use]
    pub fn is_multisampled(&self) -> bool {
        self.samples > 1
    }

    /// Pixel count.
    #[must_use]
    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Format of [`Member::DepthStencil`]; stencil is only needed to mark
    /// per-sample pixels.
    #[must_use]
    pub fn depth_stencil_format(&self) -> wgpu::TextureFormat {
        if self.is_multisampled() {
            wgpu::TextureFormat::Depth24PlusStencil8
        } else {
            DEPTH_FORMAT
        }
    }

    /// Descriptor of a surface member, `None` for buffers.
    #[must_use]
    pub fn surface_desc(&self, member: Member) -> Option<SurfaceDesc> {
        let format = match member {
            Member::Depth => DEPTH_FORMAT,
            Member::DepthStencil => self.depth_stencil_format(),
            Member::GBufferNormalSpecular => NORMAL_SPECULAR_FORMAT,
            Member::GBufferAlbedo => ALBEDO_FORMAT,
            Member::GBufferPositionZGrad => POSITION_ZGRAD_FORMAT,
            Member::LitBuffer | Member::Accumulation => LIT_FORMAT,
            Member::LitBufferFlat | Member::MergeNodes | Member::NodeCounts => {
                return None
            }
        };
        Some(self.target_desc(member, format))
    }

    fn target_desc(&self, member: Member, format: wgpu::TextureFormat) -> SurfaceDesc {
        SurfaceDesc::new(member.label(), self.width, self.height, format, TARGET_USAGE)
            .with_samples(self.samples)
    }

    /// Element count and stride of a buffer member, `None` for surfaces.
    #[must_use]
    pub fn buffer_shape(&self, member: Member) -> Option<(usize, usize)> {
        let pixels = self.pixels() as usize;
        match member {
            Member::LitBufferFlat => Some((
                pixels * self.samples as usize,
                size_of::<FlatFramebufferElement>(),
            )),
            Member::MergeNodes => {
                Some((pixels * MAX_SURFACES_PER_PIXEL, size_of::<MergeNode>()))
            }
            Member::NodeCounts => Some((pixels, size_of::<u32>())),
            _ => None,
        }
    }

    /// Bytes a member occupies.
    #[must_use]
    pub fn byte_size(&self, member: Member) -> u64 {
        if let Some(desc) = self.surface_desc(member) {
            desc.byte_size()
        } else {
            self.buffer_shape(member)
                .map_or(0, |(len, stride)| (len * stride) as u64)
        }
    }

    /// Flat lit buffer index of sample `sample` at pixel (`x`, `y`).
    #[must_use]
    pub fn flat_index(&self, x: u32, y: u32, sample: u32) -> usize {
        ((y * self.width + x) * self.samples + sample) as usize
    }

    /// Tile-shader workgroup grid covering the output.
    #[must_use]
    pub fn tile_groups(&self, tile: u32) -> (u32, u32) {
        (self.width.div_ceil(tile), self.height.div_ceil(tile))
    }
}

type BindGroupKey = (ProgramId, Vec<Member>);

/// Every surface and buffer of one [`ResourceLayout`], allocated, plus the
/// bind groups built over them.
pub struct ResourceSet {
    layout: ResourceLayout,
    depth: Surface,
    depth_stencil: Surface,
    gbuffer: [Surface; 3],
    lit: Surface,
    accumulation: Surface,
    lit_flat: StructuredBuffer<FlatFramebufferElement>,
    merge_nodes: StructuredBuffer<MergeNode>,
    node_counts: StructuredBuffer<u32>,
    bind_groups: FxHashMap<BindGroupKey, wgpu::BindGroup>,
}

impl ResourceSet {
    /// Allocate every member of `layout`.
    pub fn new(device: &wgpu::Device, layout: ResourceLayout) -> Self {
        let surface = |member: Member, format| {
            Surface::new(device, &layout.target_desc(member, format))
        };
        let buffer_len =
            |member: Member| layout.buffer_shape(member).map_or(0, |(len, _)| len);
        let storage = wgpu::BufferUsages::STORAGE;

        log::info!(
            "building resource set {}x{} with {} samples",
            layout.width,
            layout.height,
            layout.samples
        );
        Self {
            layout,
            depth: surface(Member::Depth, DEPTH_FORMAT),
            depth_stencil: surface(
                Member::DepthStencil,
                layout.depth_stencil_format(),
            ),
            gbuffer: [
                surface(Member::GBufferNormalSpecular, NORMAL_SPECULAR_FORMAT),
                surface(Member::GBufferAlbedo, ALBEDO_FORMAT),
                surface(Member::GBufferPositionZGrad, POSITION_ZGRAD_FORMAT),
            ],
            lit: surface(Member::LitBuffer, LIT_FORMAT),
            accumulation: surface(Member::Accumulation, LIT_FORMAT),
            lit_flat: StructuredBuffer::new(
                device,
                Member::LitBufferFlat.label(),
                buffer_len(Member::LitBufferFlat),
                storage,
                false,
            ),
            merge_nodes: StructuredBuffer::new(
                device,
                Member::MergeNodes.label(),
                buffer_len(Member::MergeNodes),
                storage,
                false,
            ),
            node_counts: StructuredBuffer::new(
                device,
                Member::NodeCounts.label(),
                buffer_len(Member::NodeCounts),
                storage,
                false,
            ),
            bind_groups: FxHashMap::default(),
        }
    }

    /// The layout this set was built for.
    pub fn layout(&self) -> &ResourceLayout {
        &self.layout
    }

    /// A surface member, `None` for buffers.
    pub fn surface(&self, member: Member) -> Option<&Surface> {
        match member {
            Member::Depth => Some(&self.depth),
            Member::DepthStencil => Some(&self.depth_stencil),
            Member::GBufferNormalSpecular => Some(&self.gbuffer[0]),
            Member::GBufferAlbedo => Some(&self.gbuffer[1]),
            Member::GBufferPositionZGrad => Some(&self.gbuffer[2]),
            Member::LitBuffer => Some(&self.lit),
            Member::Accumulation => Some(&self.accumulation),
            Member::LitBufferFlat | Member::MergeNodes | Member::NodeCounts => None,
        }
    }

    /// The GPU buffer behind a buffer member, `None` for surfaces.
    pub fn buffer(&self, member: Member) -> Option<&wgpu::Buffer> {
        match member {
            Member::LitBufferFlat => Some(self.lit_flat.buffer()),
            Member::MergeNodes => Some(self.merge_nodes.buffer()),
            Member::NodeCounts => Some(self.node_counts.buffer()),
            _ => None,
        }
    }

    /// What a shader binds for `member`: the shader view of a surface or
    /// the whole buffer.
    pub fn binding(&self, member: Member) -> Option<wgpu::BindingResource<'_>> {
        if let Some(surface) = self.surface(member) {
            Some(wgpu::BindingResource::TextureView(surface.shader_view()))
        } else {
            self.buffer(member).map(wgpu::Buffer::as_entire_binding)
        }
    }

    /// Attachment view of a surface member.
    pub fn attachment(&self, member: Member) -> Option<&wgpu::TextureView> {
        self.surface(member).and_then(|s| s.render_target_view(0))
    }

    /// Build any bind group `plan` needs that is not cached yet.
    ///
    /// # Panics
    ///
    /// Panics if `plan` runs a program `pipelines` lacks or binds a member
    /// with no binding resource.
    pub fn prepare_bind_groups(
        &mut self,
        device: &wgpu::Device,
        pipelines: &PipelineSet,
        plan: &FramePlan,
    ) {
        for (program, bindings) in plan.bindings() {
            let key = (program, bindings.members());
            if self.bind_groups.contains_key(&key) {
                continue;
            }
            let Some(layout) = pipelines.resource_layout(program) else {
                unreachable!("no pipeline for {program:?}");
            };
            let entries: Vec<_> = key
                .1
                .iter()
                .zip(0u32..)
                .map(|(&member, binding)| {
                    let Some(resource) = self.binding(member) else {
                        unreachable!("{program:?} binds {member:?}, which has no binding");
                    };
                    wgpu::BindGroupEntry { binding, resource }
                })
                .collect();
            let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{program:?} Resources")),
                layout,
                entries: &entries,
            });
            log::trace!("created bind group for {program:?}");
            let _ = self.bind_groups.insert(key, group);
        }
    }

    /// Cached bind group for `program` over `members`.
    pub fn bind_group(&self, program: ProgramId, members: Vec<Member>) -> Option<&wgpu::BindGroup> {
        self.bind_groups.get(&(program, members))
    }

    /// Bytes allocated for `member`.
    pub fn byte_size(&self, member: Member) -> u64 {
        self.surface(member).map_or_else(
            || match member {
                Member::LitBufferFlat => self.lit_flat.byte_size(),
                Member::MergeNodes => self.merge_nodes.byte_size(),
                Member::NodeCounts => self.node_counts.byte_size(),
                _ => 0,
            },
            Surface::byte_size,
        )
    }

    /// The compute lit buffer, for inspection.
    pub fn lit_flat_mut(&mut self) -> &mut StructuredBuffer<FlatFramebufferElement> {
        &mut self.lit_flat
    }

    /// The merge node buffer, for inspection.
    pub fn merge_nodes_mut(&mut self) -> &mut StructuredBuffer<MergeNode> {
        &mut self.merge_nodes
    }

    /// The node count buffer, for inspection.
    pub fn node_counts_mut(&mut self) -> &mut StructuredBuffer<u32> {
        &mut self.node_counts
    }
}
