//! Memory footprint of the resource set, per technique.
//!
//! Computed from the [`ResourceLayout`] alone, so reports are available
//! without a GPU and are identical for any two sets built with the same
//! layout.
//!
//! A report lists every member the technique attaches or binds. Streaming
//! therefore counts its depth buffer and the albedo target its fill pass
//! writes alongside the merge nodes and node counts.

use std::fmt;

use crate::renderer::{Member, ResourceLayout, Technique};

const MIB: f64 = 1024.0 * 1024.0;

/// One line of a [`MemoryReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLine {
    /// Member reported.
    pub member: Member,
    /// Allocation size.
    pub bytes: u64,
}

impl MemoryLine {
    /// Whether the member holds lit color rather than scene data.
    #[must_use]
    pub fn is_lit_buffer(&self) -> bool {
        matches!(
            self.member,
            Member::LitBuffer | Member::LitBufferFlat | Member::Accumulation
        )
    }

    fn label(&self) -> &'static str {
        match self.member {
            Member::Depth | Member::DepthStencil => "Depth",
            Member::LitBuffer | Member::LitBufferFlat => "Lit buffer",
            Member::Accumulation => "Accumulation buffer",
            Member::GBufferNormalSpecular => "G-buffer normal/specular",
            Member::GBufferAlbedo => "G-buffer albedo",
            Member::GBufferPositionZGrad => "G-buffer z gradient",
            Member::MergeNodes => "Merge nodes",
            Member::NodeCounts => "Node counts",
        }
    }
}

/// Footprint of the members one technique uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryReport {
    technique: Technique,
    layout: ResourceLayout,
    lines: Vec<MemoryLine>,
}

impl MemoryReport {
    /// Report for `technique` at `layout`.
    #[must_use]
    pub fn for_technique(layout: &ResourceLayout, technique: Technique) -> Self {
        let lines = technique
            .requirements()
            .iter()
            .map(|&member| MemoryLine {
                member,
                bytes: layout.byte_size(member),
            })
            .collect();
        Self {
            technique,
            layout: *layout,
            lines,
        }
    }

    /// Per-member lines.
    #[must_use]
    pub fn lines(&self) -> &[MemoryLine] {
        &self.lines
    }

    /// Total bytes.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.lines.iter().map(|l| l.bytes).sum()
    }

    /// Total bytes without the lit and accumulation buffers.
    #[must_use]
    pub fn total_excluding_lit(&self) -> u64 {
        self.lines
            .iter()
            .filter(|l| !l.is_lit_buffer())
            .map(|l| l.bytes)
            .sum()
    }

    /// Total bytes divided by the pixel count.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> f64 {
        self.total() as f64 / self.layout.pixels() as f64
    }
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} at {}x{}, {}x MSAA",
            self.technique, self.layout.width, self.layout.height, self.layout.samples
        )?;
        for line in &self.lines {
            writeln!(f, "  {}: {:.2} MiB", line.label(), line.bytes as f64 / MIB)?;
        }
        writeln!(
            f,
            "  Total: {:.2} MiB ({:.1} bytes/pixel)",
            self.total() as f64 / MIB,
            self.bytes_per_pixel()
        )?;
        writeln!(
            f,
            "  Total excluding lit buffer: {:.2} MiB",
            self.total_excluding_lit() as f64 / MIB
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_support::headless_context;
    use crate::renderer::ResourceSet;

    #[test]
    fn forward_counts_depth_and_lit_buffer() {
        let layout = ResourceLayout::new(1024, 1024, 1);
        let report = MemoryReport::for_technique(&layout, Technique::ForwardNoCull);
        // Depth32Float and Rgba16Float.
        assert_eq!(report.total(), 1024 * 1024 * (4 + 8));
        assert_eq!(report.total_excluding_lit(), 1024 * 1024 * 4);
        assert_eq!(report.bytes_per_pixel(), 12.0);
    }

    #[test]
    fn streaming_reports_node_buffers() {
        let layout = ResourceLayout::new(100, 100, 4);
        let report = MemoryReport::for_technique(&layout, Technique::StreamingSbaa);
        let members: Vec<_> = report.lines().iter().map(|l| l.member).collect();
        assert!(members.contains(&Member::MergeNodes));
        assert!(members.contains(&Member::NodeCounts));
        assert_eq!(report.total(), report.total_excluding_lit());
        let text = report.to_string();
        assert!(text.contains("Merge nodes: "));
        assert!(text.contains("Total excluding lit buffer"));
    }

    #[test]
    fn streaming_reports_every_member_its_passes_touch() {
        let layout = ResourceLayout::new(100, 100, 4);
        let report = MemoryReport::for_technique(&layout, Technique::StreamingSbaaNdi);
        let members: Vec<_> = report.lines().iter().map(|l| l.member).collect();
        assert_eq!(
            members,
            [Member::Depth, Member::GBufferAlbedo, Member::MergeNodes, Member::NodeCounts]
        );
        let pixels = 100 * 100;
        // Depth32Float and Rgba8Unorm per sample, then the node buffers.
        let surfaces = pixels * 4 * (4 + 4);
        let nodes = layout.byte_size(Member::MergeNodes) + layout.byte_size(Member::NodeCounts);
        assert_eq!(report.total(), surfaces + nodes);
        assert_eq!(layout.byte_size(Member::NodeCounts), pixels * 4);
    }

    #[test]
    fn msaa_scales_surfaces_but_not_node_counts() {
        let single = ResourceLayout::new(64, 64, 1);
        let quad = ResourceLayout::new(64, 64, 4);
        let report = |layout| MemoryReport::for_technique(&layout, Technique::StreamingSbaaNdi);
        let bytes = |r: &MemoryReport, m: Member| {
            r.lines().iter().find(|l| l.member == m).map(|l| l.bytes)
        };
        assert_eq!(bytes(&report(single), Member::NodeCounts), bytes(&report(quad), Member::NodeCounts));
        assert_eq!(
            bytes(&report(quad), Member::Depth).unwrap(),
            4 * bytes(&report(single), Member::Depth).unwrap()
        );
    }

    #[test]
    fn rebuilding_the_set_keeps_the_footprint() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let layout = ResourceLayout::new(48, 32, 1);
        let sum = |set: &ResourceSet| -> u64 {
            Member::ALL.iter().map(|&m| set.byte_size(m)).sum()
        };
        let first = ResourceSet::new(&ctx.device, layout);
        let first_bytes = sum(&first);
        drop(first);
        let second = ResourceSet::new(&ctx.device, layout);
        assert_eq!(sum(&second), first_bytes);
        for technique in Technique::ALL {
            assert_eq!(
                MemoryReport::for_technique(second.layout(), technique),
                MemoryReport::for_technique(&layout, technique)
            );
        }
    }
}
