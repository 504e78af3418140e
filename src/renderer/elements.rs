//! GPU element types of the structured buffers in the resource set, with
//! CPU decoders for the inspection paths.

use glam::{Vec2, Vec3};
use half::f16;

/// Surfaces kept per pixel by the streaming technique.
pub const MAX_SURFACES_PER_PIXEL: usize = 3;

/// One sample of the compute lit buffer: RGBA as four half floats packed
/// red/blue and green/alpha. Matches `FlatFramebufferElement` in WGSL.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FlatFramebufferElement {
    /// Red in the low half, blue in the high half.
    pub rb: u32,
    /// Green in the low half, alpha in the high half.
    pub ga: u32,
}

const _: () = assert!(size_of::<FlatFramebufferElement>() == 8);

fn unpack_half2(packed: u32) -> [f32; 2] {
    [
        f16::from_bits(packed as u16).to_f32(),
        f16::from_bits((packed >> 16) as u16).to_f32(),
    ]
}

fn pack_half2(a: f32, b: f32) -> u32 {
    u32::from(f16::from_f32(a).to_bits())
        | (u32::from(f16::from_f32(b).to_bits()) << 16)
}

impl FlatFramebufferElement {
    /// Pack linear RGBA the way the tile shader does.
    #[must_use]
    pub fn pack(rgba: [f32; 4]) -> Self {
        Self {
            rb: pack_half2(rgba[0], rgba[2]),
            ga: pack_half2(rgba[1], rgba[3]),
        }
    }

    /// Linear RGBA.
    #[must_use]
    pub fn rgba(self) -> [f32; 4] {
        let [r, b] = unpack_half2(self.rb);
        let [g, a] = unpack_half2(self.ga);
        [r, g, b, a]
    }
}

/// A surface fragment stored by the streaming fill. Matches `MergeNode` in
/// WGSL.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MergeNode {
    /// Sample coverage mask.
    pub coverage: u32,
    /// Screen-space derivatives of view z as two half floats.
    pub z_view_derivatives: u32,
    /// View-space z bits.
    pub z_view: u32,
    /// Octahedral normal as two snorm16 values.
    pub normal: u32,
    /// RGBA8 unorm albedo.
    pub albedo: u32,
}

const _: () = assert!(size_of::<MergeNode>() == 20);

/// A [`MergeNode`] with every field unpacked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedMergeNode {
    /// Sample coverage mask.
    pub coverage: u32,
    /// View-space z (negative in front of the camera).
    pub z_view: f32,
    /// d(z_view)/dx and d(z_view)/dy.
    pub z_view_derivatives: Vec2,
    /// Unit view-space normal.
    pub normal: Vec3,
    /// Linear albedo with alpha.
    pub albedo: [f32; 4],
}

fn unpack_snorm16(bits: u16) -> f32 {
    (f32::from(bits as i16) / 32767.0).max(-1.0)
}

fn decode_octahedral(packed: u32) -> Vec3 {
    let p = Vec2::new(
        unpack_snorm16(packed as u16),
        unpack_snorm16((packed >> 16) as u16),
    );
    let mut n = Vec3::new(p.x, p.y, 1.0 - p.x.abs() - p.y.abs());
    let t = (-n.z).max(0.0);
    n.x += if n.x >= 0.0 { -t } else { t };
    n.y += if n.y >= 0.0 { -t } else { t };
    n.normalize_or_zero()
}

impl MergeNode {
    /// Unpack every field.
    #[must_use]
    pub fn decode(self) -> DecodedMergeNode {
        let [dx, dy] = unpack_half2(self.z_view_derivatives);
        let albedo = self.albedo.to_le_bytes().map(|c| f32::from(c) / 255.0);
        DecodedMergeNode {
            coverage: self.coverage,
            z_view: f32::from_bits(self.z_view),
            z_view_derivatives: Vec2::new(dx, dy),
            normal: decode_octahedral(self.normal),
            albedo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_element_keeps_channel_order() {
        let element = FlatFramebufferElement::pack([0.25, 0.5, 1.0, 2.0]);
        assert_eq!(element.rgba(), [0.25, 0.5, 1.0, 2.0]);
        assert_eq!(f16::from_bits(element.rb as u16).to_f32(), 0.25);
        assert_eq!(f16::from_bits((element.rb >> 16) as u16).to_f32(), 1.0);
    }

    #[test]
    fn merge_node_decodes_axis_normals_and_albedo() {
        // +Z maps to the octahedron centre, -Z to a corner.
        let facing = MergeNode {
            coverage: 0b1011,
            z_view_derivatives: pack_half2(0.5, -0.25),
            z_view: (-7.5f32).to_bits(),
            normal: 0,
            albedo: u32::from_le_bytes([255, 0, 51, 255]),
        }
        .decode();
        assert_eq!(facing.coverage, 0b1011);
        assert_eq!(facing.z_view, -7.5);
        assert_eq!(facing.z_view_derivatives, Vec2::new(0.5, -0.25));
        assert!(facing.normal.abs_diff_eq(Vec3::Z, 1e-6));
        assert_eq!(facing.albedo, [1.0, 0.0, 0.2, 1.0]);

        let corner = (32767u32 << 16) | 32767;
        let away = MergeNode {
            normal: corner,
            ..MergeNode::default()
        }
        .decode();
        assert!(away.normal.abs_diff_eq(Vec3::NEG_Z, 1e-4));
    }
}
