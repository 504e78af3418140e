//! The lighting techniques the renderer can switch between at runtime.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::resources::Member;
use crate::gpu::timer::GpuStage;

/// Lighting technique selected per frame.
///
/// Switching technique never rebuilds resources: every member any technique
/// needs is allocated up front.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    /// Forward shading, every light per pixel.
    ForwardNoCull,
    /// Forward shading after a depth-only prepass.
    ForwardPreZ,
    /// G-buffer then a full-screen loop over every light.
    DeferredNoCull,
    /// G-buffer then one screen-aligned quad per light into the lit buffer.
    DeferredQuad,
    /// Light quads into an accumulation buffer, resolved in a second pass.
    DeferredQuadWithLightingBuffer,
    /// G-buffer then 16x16 tiles culling lights in a compute shader.
    #[default]
    ComputeTile,
    /// Multi-surface merge nodes, first surfaces kept.
    StreamingSbaa,
    /// Multi-surface merge nodes, ring replacement.
    StreamingSbaaNdi,
}

/// One displayed frame-time column: which stage it reads and how it is
/// printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedColumn {
    /// Name in the comma-separated header.
    pub header: &'static str,
    /// Prefix in the labelled form.
    pub label: &'static str,
    /// Stage whose bracket the column reports.
    pub stage: GpuStage,
}

const FORWARD_COLUMN: TimedColumn = TimedColumn {
    header: "forward",
    label: "Forward:",
    stage: GpuStage::Forward,
};
const LIGHTING_COLUMN: TimedColumn = TimedColumn {
    header: "lighting",
    label: "Lighting:",
    stage: GpuStage::Lighting,
};
const RESOLVE_COLUMN: TimedColumn = TimedColumn {
    header: "resolve",
    label: "Resolve:",
    stage: GpuStage::Resolve,
};
const LIGHTING_RESOLVE_COLUMN: TimedColumn = TimedColumn {
    header: "lighting + resolve",
    label: "Lighting + resolve:",
    stage: GpuStage::Resolve,
};

impl Technique {
    /// Every technique, in selector order.
    pub const ALL: [Self; 8] = [
        Self::ForwardNoCull,
        Self::ForwardPreZ,
        Self::DeferredNoCull,
        Self::DeferredQuad,
        Self::DeferredQuadWithLightingBuffer,
        Self::ComputeTile,
        Self::StreamingSbaa,
        Self::StreamingSbaaNdi,
    ];

    /// Position in [`Technique::ALL`]; also the value shaders see.
    #[must_use]
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Technique at `index` in [`Technique::ALL`].
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ForwardNoCull => "Forward (no culling)",
            Self::ForwardPreZ => "Forward (pre-Z)",
            Self::DeferredNoCull => "Deferred (no culling)",
            Self::DeferredQuad => "Deferred (quad)",
            Self::DeferredQuadWithLightingBuffer => {
                "Deferred (quad, lighting buffer)"
            }
            Self::ComputeTile => "Compute shader tile",
            Self::StreamingSbaa => "Streaming SBAA",
            Self::StreamingSbaaNdi => "Streaming SBAA (NDI)",
        }
    }

    /// Whether the technique shades from a G-buffer.
    #[must_use]
    pub fn is_deferred(self) -> bool {
        matches!(
            self,
            Self::DeferredNoCull
                | Self::DeferredQuad
                | Self::DeferredQuadWithLightingBuffer
                | Self::ComputeTile
        )
    }

    /// Whether the technique is one of the streaming variants.
    #[must_use]
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::StreamingSbaa | Self::StreamingSbaaNdi)
    }

    /// Resource set members the technique reads or writes.
    #[must_use]
    pub fn requirements(self) -> &'static [Member] {
        use Member as M;
        match self {
            Self::ForwardNoCull | Self::ForwardPreZ => {
                &[M::Depth, M::LitBuffer]
            }
            Self::DeferredNoCull | Self::DeferredQuad => &[
                M::DepthStencil,
                M::GBufferNormalSpecular,
                M::GBufferAlbedo,
                M::GBufferPositionZGrad,
                M::LitBuffer,
            ],
            Self::DeferredQuadWithLightingBuffer => &[
                M::DepthStencil,
                M::GBufferNormalSpecular,
                M::GBufferAlbedo,
                M::GBufferPositionZGrad,
                M::Accumulation,
                M::LitBuffer,
            ],
            Self::ComputeTile => &[
                M::Depth,
                M::GBufferNormalSpecular,
                M::GBufferAlbedo,
                M::GBufferPositionZGrad,
                M::LitBufferFlat,
            ],
            Self::StreamingSbaa | Self::StreamingSbaaNdi => &[
                M::Depth,
                M::GBufferAlbedo,
                M::MergeNodes,
                M::NodeCounts,
            ],
        }
    }

    /// Frame-time columns reported for this technique.
    #[must_use]
    pub fn timed_columns(self) -> &'static [TimedColumn] {
        if self.is_streaming() {
            &[FORWARD_COLUMN, LIGHTING_RESOLVE_COLUMN]
        } else if self.is_deferred() {
            &[FORWARD_COLUMN, LIGHTING_COLUMN, RESOLVE_COLUMN]
        } else {
            &[FORWARD_COLUMN, RESOLVE_COLUMN]
        }
    }
}

impl std::fmt::Display for Technique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_all() {
        for (i, technique) in Technique::ALL.into_iter().enumerate() {
            assert_eq!(technique.index() as usize, i);
            assert_eq!(Technique::from_index(i), Some(technique));
        }
        assert_eq!(Technique::from_index(Technique::ALL.len()), None);
    }

    #[test]
    fn only_deferred_variants_use_the_stencil_depth() {
        for technique in Technique::ALL {
            let uses_stencil =
                technique.requirements().contains(&Member::DepthStencil);
            let expected = technique.is_deferred()
                && technique != Technique::ComputeTile;
            assert_eq!(uses_stencil, expected, "{technique}");
        }
    }

    #[test]
    fn column_counts_per_family() {
        assert_eq!(Technique::ForwardPreZ.timed_columns().len(), 2);
        assert_eq!(Technique::DeferredQuad.timed_columns().len(), 3);
        assert_eq!(Technique::ComputeTile.timed_columns().len(), 3);
        assert_eq!(Technique::StreamingSbaaNdi.timed_columns().len(), 2);
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&Technique::DeferredQuadWithLightingBuffer)
            .unwrap();
        assert_eq!(json, "\"deferred_quad_with_lighting_buffer\"");
    }
}
