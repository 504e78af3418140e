use std::fmt;

/// Errors that can occur during GPU context initialization.
#[derive(Debug)]
pub enum RenderContextError {
    /// Failed to create a wgpu surface from the window handle.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    AdapterRequest(wgpu::RequestAdapterError),
    /// GPU device request failed (limits or features not met).
    DeviceRequest(wgpu::RequestDeviceError),
    /// Surface configuration not supported by the selected adapter.
    UnsupportedSurface,
    /// The adapter cannot run the renderer's shaders.
    UnsupportedAdapter {
        /// Backend of the rejected adapter.
        backend: wgpu::Backend,
        /// Required downlevel capabilities it lacks.
        missing: wgpu::DownlevelFlags,
    },
}

impl fmt::Display for RenderContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SurfaceCreation(e) => {
                write!(f, "surface creation failed: {e}")
            }
            Self::AdapterRequest(e) => {
                write!(f, "no compatible GPU adapter found: {e}")
            }
            Self::DeviceRequest(e) => write!(f, "device request failed: {e}"),
            Self::UnsupportedSurface => {
                write!(f, "surface configuration not supported by adapter")
            }
            Self::UnsupportedAdapter { backend, missing } if missing.is_empty() => {
                write!(f, "{backend:?} adapters cannot load from depth textures")
            }
            Self::UnsupportedAdapter { backend, missing } => {
                write!(f, "{backend:?} adapter lacks {missing:?}")
            }
        }
    }
}

impl std::error::Error for RenderContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SurfaceCreation(e) => Some(e),
            Self::AdapterRequest(e) => Some(e),
            Self::DeviceRequest(e) => Some(e),
            Self::UnsupportedSurface | Self::UnsupportedAdapter { .. } => None,
        }
    }
}

/// Optional features used when the adapter offers them. Timestamp queries
/// drive the frame timer; adapter-specific format features unlock 2x and 8x
/// MSAA.
const OPTIONAL_FEATURES: wgpu::Features = wgpu::Features::TIMESTAMP_QUERY
    .union(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES);

/// Downlevel capabilities the compute and streaming techniques rely on.
const REQUIRED_DOWNLEVEL: wgpu::DownlevelFlags = wgpu::DownlevelFlags::COMPUTE_SHADERS
    .union(wgpu::DownlevelFlags::FRAGMENT_WRITABLE_STORAGE)
    .union(wgpu::DownlevelFlags::MULTISAMPLED_SHADING);

/// Formats every multisampled surface of the resource set must support for a
/// sample count to be usable.
const MSAA_FORMATS: [wgpu::TextureFormat; 4] = [
    wgpu::TextureFormat::Rgba16Float,
    wgpu::TextureFormat::Rgba8Unorm,
    wgpu::TextureFormat::Rg16Float,
    wgpu::TextureFormat::Depth24PlusStencil8,
];

/// Owns the core wgpu resources: device, queue, optional surface, and
/// configuration.
pub struct RenderContext {
    /// The wgpu logical device.
    pub device: wgpu::Device,
    /// The wgpu command queue.
    pub queue: wgpu::Queue,
    /// The window surface for presentation (`None` when headless).
    pub surface: Option<wgpu::Surface<'static>>,
    /// Current surface configuration (format, size, present mode).
    pub config: wgpu::SurfaceConfiguration,
    /// MSAA sample counts usable with every resource-set format.
    pub sample_counts: Vec<u32>,
}

impl RenderContext {
    /// Create a new render context from the given window surface target and
    /// initial size.
    ///
    /// # Errors
    ///
    /// Returns `RenderContextError` if surface creation, adapter request,
    /// device request, or surface configuration fails.
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        initial_size: (u32, u32),
    ) -> Result<Self, RenderContextError> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window)
            .map_err(RenderContextError::SurfaceCreation)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                compatible_surface: Some(&surface),
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            })
            .await
            .map_err(RenderContextError::AdapterRequest)?;
        let (device, queue) = request_device(&adapter).await?;

        let mut config = surface
            .get_default_config(&adapter, initial_size.0, initial_size.1)
            .ok_or(RenderContextError::UnsupportedSurface)?;
        config.width = initial_size.0.max(1);
        config.height = initial_size.1.max(1);
        config.present_mode = wgpu::PresentMode::AutoNoVsync;
        surface.configure(&device, &config);

        Ok(Self {
            sample_counts: supported_sample_counts(&adapter, &device),
            device,
            queue,
            surface: Some(surface),
            config,
        })
    }

    /// Create a context without a presentation surface. Rendering goes to
    /// caller-owned textures of `format`. Only primary backends (Vulkan,
    /// Metal, DX12, WebGPU) are considered.
    ///
    /// # Errors
    ///
    /// Returns `RenderContextError` if no usable adapter or device is
    /// available.
    pub async fn headless(
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            })
            .await
            .map_err(RenderContextError::AdapterRequest)?;
        let (device, queue) = request_device(&adapter).await?;
        let sample_counts = supported_sample_counts(&adapter, &device);
        let mut context = Self::from_device(device, queue, format, width, height);
        context.sample_counts = sample_counts;
        Ok(context)
    }

    /// Create a render context from an externally-owned device and queue
    /// (no surface). Only the baseline sample counts 1 and 4 are assumed.
    #[must_use]
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
        };
        Self {
            device,
            queue,
            surface: None,
            config,
            sample_counts: vec![1, 4],
        }
    }

    /// The output texture format.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Output width in pixels.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    /// Output height in pixels.
    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Reconfigure the surface for the new window size. Ignores zero-sized
    /// dimensions.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            if let Some(ref surface) = self.surface {
                surface.configure(&self.device, &self.config);
            }
        }
    }

    /// Acquire the next swapchain texture for rendering.
    ///
    /// # Errors
    ///
    /// Returns [`wgpu::SurfaceError`] if the surface is lost, outdated,
    /// or timed out, or if no surface is available (headless mode).
    pub fn get_next_frame(
        &self,
    ) -> Result<wgpu::SurfaceTexture, wgpu::SurfaceError> {
        self.surface
            .as_ref()
            .map_or(Err(wgpu::SurfaceError::Lost), |surface| {
                surface.get_current_texture()
            })
    }

    /// Create a new command encoder for recording GPU commands.
    pub fn create_encoder(&self) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            })
    }

    /// Finish the encoder and submit its command buffer to the GPU queue.
    pub fn submit(&self, encoder: wgpu::CommandEncoder) {
        let _ = self.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// Reject adapters whose shader backend or downlevel capabilities cannot
/// run every technique. The GLSL backend cannot load from depth textures,
/// which the deferred lighting and tonemap passes do.
fn check_adapter(
    backend: wgpu::Backend,
    flags: wgpu::DownlevelFlags,
) -> Result<(), RenderContextError> {
    let missing = REQUIRED_DOWNLEVEL.difference(flags);
    if backend == wgpu::Backend::Gl || !missing.is_empty() {
        return Err(RenderContextError::UnsupportedAdapter { backend, missing });
    }
    Ok(())
}

async fn request_device(
    adapter: &wgpu::Adapter,
) -> Result<(wgpu::Device, wgpu::Queue), RenderContextError> {
    let info = adapter.get_info();
    check_adapter(info.backend, adapter.get_downlevel_capabilities().flags)?;
    let features = adapter.features() & OPTIONAL_FEATURES;
    log::info!(
        "using adapter '{}' ({:?}), optional features {features:?}",
        info.name,
        info.backend
    );
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("Primary Device"),
            required_features: features,
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        })
        .await
        .map_err(RenderContextError::DeviceRequest)
}

fn supported_sample_counts(
    adapter: &wgpu::Adapter,
    device: &wgpu::Device,
) -> Vec<u32> {
    let adapter_specific = device
        .features()
        .contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES);
    [1, 2, 4, 8]
        .into_iter()
        .filter(|&count| {
            if count == 1 || (count == 4 && !adapter_specific) {
                return true;
            }
            adapter_specific
                && MSAA_FORMATS.iter().all(|&format| {
                    adapter
                        .get_texture_format_features(format)
                        .flags
                        .sample_count_supported(count)
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gl_and_downlevel_adapters_are_rejected() {
        let full = wgpu::DownlevelFlags::compliant();
        assert!(check_adapter(wgpu::Backend::Vulkan, full).is_ok());
        assert!(check_adapter(wgpu::Backend::Metal, full).is_ok());

        let err = check_adapter(wgpu::Backend::Gl, full).unwrap_err();
        assert!(err.to_string().contains("depth textures"), "{err}");

        let no_compute = full.difference(wgpu::DownlevelFlags::COMPUTE_SHADERS);
        match check_adapter(wgpu::Backend::Vulkan, no_compute) {
            Err(RenderContextError::UnsupportedAdapter { missing, .. }) => {
                assert_eq!(missing, wgpu::DownlevelFlags::COMPUTE_SHADERS);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
