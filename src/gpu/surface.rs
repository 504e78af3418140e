//! GPU-resident 2D surfaces with usage-driven views.
//!
//! A [`Surface`] owns one texture and every view derived from it. Views are
//! created at construction for exactly the usages the descriptor declares,
//! so a surface never hands out a view its allocation cannot back.

/// Bytes per pixel of a single sample in `format`.
///
/// Packed depth-stencil formats report their storage size as the driver
/// typically allocates it. Used for diagnostics only.
#[must_use]
pub fn bytes_per_pixel(format: wgpu::TextureFormat) -> u64 {
    use wgpu::TextureFormat as F;
    match format {
        F::Depth16Unorm => 2,
        F::Depth24Plus | F::Depth24PlusStencil8 | F::Depth32Float => 4,
        F::Depth32FloatStencil8 => 8,
        F::Stencil8 => 1,
        other => u64::from(other.block_copy_size(None).unwrap_or(0)),
    }
}

/// Shape, format, and usage of a [`Surface`].
///
/// `usage` uses wgpu's flags directly: `RENDER_ATTACHMENT` is the
/// render-target usage, `TEXTURE_BINDING` the shader-read usage and
/// `STORAGE_BINDING` the unordered-write usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    /// Debug label.
    pub label: &'static str,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: wgpu::TextureFormat,
    /// Declared bind usages.
    pub usage: wgpu::TextureUsages,
    /// MSAA sample count (1 for single-sampled).
    pub sample_count: u32,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Number of array slices.
    pub array_layers: u32,
}

impl SurfaceDesc {
    /// Single-sampled, single-mip, single-slice surface.
    #[must_use]
    pub const fn new(
        label: &'static str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        Self {
            label,
            width,
            height,
            format,
            usage,
            sample_count: 1,
            mip_levels: 1,
            array_layers: 1,
        }
    }

    /// Same surface with `count` samples per pixel.
    #[must_use]
    pub const fn with_samples(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Same surface with `levels` mip levels.
    #[must_use]
    pub const fn with_mips(mut self, levels: u32) -> Self {
        self.mip_levels = levels;
        self
    }

    /// Same surface with `layers` array slices.
    #[must_use]
    pub const fn with_layers(mut self, layers: u32) -> Self {
        self.array_layers = layers;
        self
    }

    /// Whether more than one sample is stored per pixel.
    #[must_use]
    pub const fn is_multisampled(&self) -> bool {
        self.sample_count > 1
    }

    /// Allocation size of mip 0: width x height x bytes-per-pixel x samples
    /// x slices.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        u64::from(self.width)
            * u64::from(self.height)
            * bytes_per_pixel(self.format)
            * u64::from(self.sample_count)
            * u64::from(self.array_layers)
    }

    /// Assert the descriptor is a combination the hardware accepts.
    ///
    /// # Panics
    ///
    /// Panics on zero extents, or on storage usage or mips for a
    /// multisampled surface. These are caller bugs, not runtime conditions.
    pub fn validate(&self) {
        assert!(
            self.width > 0 && self.height > 0,
            "surface '{}' has a zero extent",
            self.label
        );
        assert!(
            self.sample_count >= 1 && self.mip_levels >= 1 && self.array_layers >= 1,
            "surface '{}' needs at least one sample, mip and slice",
            self.label
        );
        assert!(
            !(self.is_multisampled()
                && self.usage.contains(wgpu::TextureUsages::STORAGE_BINDING)),
            "surface '{}': storage views cannot be created for multisampled surfaces",
            self.label
        );
        assert!(
            !(self.is_multisampled() && self.mip_levels > 1),
            "surface '{}': multisampled surfaces cannot have mips",
            self.label
        );
    }
}

/// One GPU texture plus the views its usage flags call for. The views keep
/// the texture alive.
pub struct Surface {
    desc: SurfaceDesc,
    view: wgpu::TextureView,
    shader_view: Option<wgpu::TextureView>,
    slice_shader_views: Vec<wgpu::TextureView>,
    slice_render_target_views: Vec<wgpu::TextureView>,
    slice_storage_views: Vec<wgpu::TextureView>,
}

impl Surface {
    /// Allocate the texture and its views.
    ///
    /// # Panics
    ///
    /// Panics if [`SurfaceDesc::validate`] rejects the descriptor.
    #[must_use]
    pub fn new(device: &wgpu::Device, desc: &SurfaceDesc) -> Self {
        desc.validate();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.array_layers,
            },
            mip_level_count: desc.mip_levels,
            sample_count: desc.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });

        let layered = desc.array_layers > 1;
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(desc.label),
            dimension: Some(if layered {
                wgpu::TextureViewDimension::D2Array
            } else {
                wgpu::TextureViewDimension::D2
            }),
            ..Default::default()
        });

        // Depth formats are sampled through their depth aspect only.
        let shader_aspect = shader_aspect(desc.format);
        let readable = desc.usage.contains(wgpu::TextureUsages::TEXTURE_BINDING);
        let shader_view = (readable && shader_aspect != wgpu::TextureAspect::All)
            .then(|| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(desc.label),
                    aspect: shader_aspect,
                    ..Default::default()
                })
            });

        let slices = |mip_count: Option<u32>, aspect| -> Vec<wgpu::TextureView> {
            (0..desc.array_layers)
                .map(|layer| {
                    texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some(desc.label),
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        aspect,
                        mip_level_count: mip_count,
                        base_array_layer: layer,
                        array_layer_count: Some(1),
                        ..Default::default()
                    })
                })
                .collect()
        };
        let wants = |usage| desc.usage.contains(usage);

        Self {
            desc: *desc,
            view,
            shader_view,
            slice_shader_views: if readable && layered {
                slices(None, shader_aspect)
            } else {
                Vec::new()
            },
            slice_render_target_views: if wants(wgpu::TextureUsages::RENDER_ATTACHMENT) {
                slices(Some(1), wgpu::TextureAspect::All)
            } else {
                Vec::new()
            },
            slice_storage_views: if wants(wgpu::TextureUsages::STORAGE_BINDING) {
                slices(Some(1), wgpu::TextureAspect::All)
            } else {
                Vec::new()
            },
        }
    }

    /// The descriptor this surface was built from.
    pub fn desc(&self) -> &SurfaceDesc {
        &self.desc
    }

    /// Whole-resource shader view. Depth formats expose only their depth
    /// aspect here.
    pub fn shader_view(&self) -> &wgpu::TextureView {
        self.shader_view.as_ref().unwrap_or(&self.view)
    }

    /// Shader view of one array slice (layered surfaces only).
    pub fn slice_shader_view(&self, layer: u32) -> Option<&wgpu::TextureView> {
        self.slice_shader_views.get(layer as usize)
    }

    /// Render-target view of one array slice at mip 0. Passes attach
    /// surfaces through slice 0.
    pub fn render_target_view(&self, layer: u32) -> Option<&wgpu::TextureView> {
        self.slice_render_target_views.get(layer as usize)
    }

    /// Storage view of one array slice at mip 0.
    pub fn storage_view(&self, layer: u32) -> Option<&wgpu::TextureView> {
        self.slice_storage_views.get(layer as usize)
    }

    /// Allocation size in bytes, as reported by [`SurfaceDesc::byte_size`].
    pub fn byte_size(&self) -> u64 {
        self.desc.byte_size()
    }
}

fn shader_aspect(format: wgpu::TextureFormat) -> wgpu::TextureAspect {
    if format.is_depth_stencil_format() && format.has_depth_aspect() {
        wgpu::TextureAspect::DepthOnly
    } else {
        wgpu::TextureAspect::All
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_support::headless_context;

    const RT_READ: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
        .union(wgpu::TextureUsages::TEXTURE_BINDING);

    #[test]
    fn byte_size_scales_with_samples_and_format() {
        let single = SurfaceDesc::new(
            "lit",
            1280,
            720,
            wgpu::TextureFormat::Rgba16Float,
            RT_READ,
        );
        assert_eq!(single.byte_size(), 1280 * 720 * 8);
        assert_eq!(single.with_samples(4).byte_size(), 1280 * 720 * 8 * 4);

        let depth = SurfaceDesc::new(
            "depth",
            64,
            32,
            wgpu::TextureFormat::Depth32FloatStencil8,
            RT_READ,
        );
        assert_eq!(depth.byte_size(), 64 * 32 * 8);
    }

    #[test]
    fn bytes_per_pixel_matches_gbuffer_formats() {
        assert_eq!(bytes_per_pixel(wgpu::TextureFormat::Rgba8Unorm), 4);
        assert_eq!(bytes_per_pixel(wgpu::TextureFormat::Rg16Float), 4);
        assert_eq!(bytes_per_pixel(wgpu::TextureFormat::Rgba16Float), 8);
        assert_eq!(bytes_per_pixel(wgpu::TextureFormat::R32Uint), 4);
        assert_eq!(bytes_per_pixel(wgpu::TextureFormat::Depth24PlusStencil8), 4);
    }

    #[test]
    #[should_panic(expected = "multisampled")]
    fn storage_on_multisampled_surface_is_rejected() {
        SurfaceDesc::new(
            "bad",
            16,
            16,
            wgpu::TextureFormat::R32Uint,
            wgpu::TextureUsages::STORAGE_BINDING,
        )
        .with_samples(4)
        .validate();
    }

    #[test]
    #[should_panic(expected = "zero extent")]
    fn zero_extent_is_rejected() {
        SurfaceDesc::new(
            "empty",
            0,
            16,
            wgpu::TextureFormat::Rgba8Unorm,
            RT_READ,
        )
        .validate();
    }

    #[test]
    fn views_follow_declared_usage() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let desc = SurfaceDesc::new(
            "layers",
            8,
            8,
            wgpu::TextureFormat::R32Uint,
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING,
        )
        .with_layers(3)
        .with_mips(2);
        let surface = Surface::new(&ctx.device, &desc);
        assert!(surface.slice_shader_view(2).is_some());
        assert!(surface.storage_view(2).is_some());
        assert!(surface.storage_view(3).is_none());
        assert!(surface.render_target_view(0).is_none());
        assert_eq!(surface.byte_size(), 8 * 8 * 4 * 3);
    }

    #[test]
    #[should_panic(expected = "cannot have mips")]
    fn mipmapped_multisampled_surface_is_rejected() {
        SurfaceDesc::new("bad", 16, 16, wgpu::TextureFormat::Rgba8Unorm, RT_READ)
            .with_samples(4)
            .with_mips(2)
            .validate();
    }

    #[test]
    fn depth_surfaces_get_a_depth_only_shader_view() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let depth = Surface::new(
            &ctx.device,
            &SurfaceDesc::new("depth", 8, 8, wgpu::TextureFormat::Depth24PlusStencil8, RT_READ),
        );
        assert!(depth.shader_view.is_some());
        assert_eq!(depth.byte_size(), 8 * 8 * 4);

        let color = Surface::new(
            &ctx.device,
            &SurfaceDesc::new("albedo", 8, 8, wgpu::TextureFormat::Rgba8Unorm, RT_READ),
        );
        assert!(color.shader_view.is_none());
    }
}
