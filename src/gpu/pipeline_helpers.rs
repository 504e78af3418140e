//! Shared wgpu boilerplate for bind group layouts and pipelines.

/// Stages that read frame-wide data.
pub const ALL_STAGES: wgpu::ShaderStages = wgpu::ShaderStages::VERTEX_FRAGMENT
    .union(wgpu::ShaderStages::COMPUTE);

/// Stages that read intermediate surfaces.
pub const READ_STAGES: wgpu::ShaderStages =
    wgpu::ShaderStages::FRAGMENT.union(wgpu::ShaderStages::COMPUTE);

/// Unfilterable float 2D texture, optionally multisampled.
pub fn texture_2d_unfilterable(
    binding: u32,
    multisampled: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: READ_STAGES,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled,
        },
        count: None,
    }
}

/// Fragment-visible filterable float 2D texture (material albedo).
pub fn texture_2d(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Depth 2D texture, optionally multisampled.
pub fn depth_texture_2d(
    binding: u32,
    multisampled: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: READ_STAGES,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled,
        },
        count: None,
    }
}

/// Storage buffer binding; `read_only` selects `var<storage, read>`.
pub fn storage_buffer(
    binding: u32,
    visibility: wgpu::ShaderStages,
    read_only: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Uniform buffer binding.
pub fn uniform_buffer(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Fragment-visible filtering sampler binding.
pub fn filtering_sampler(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Repeat + linear sampler for material textures.
pub fn material_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Material Sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

/// Additive blend used to accumulate light contributions.
pub const ADDITIVE_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Create a pipeline layout named after `label`.
pub fn pipeline_layout(
    device: &wgpu::Device,
    label: &str,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} Pipeline Layout")),
        bind_group_layouts,
        push_constant_ranges: &[],
    })
}

/// Everything that varies between this crate's render pipelines.
pub struct RenderPipelineParams<'a> {
    /// Pipeline label.
    pub label: &'a str,
    /// Composed shader with a `vs_main` vertex entry point.
    pub shader: &'a wgpu::ShaderModule,
    /// Fragment entry point, if the pipeline shades fragments.
    pub fragment_entry: Option<&'a str>,
    /// Vertex buffer layouts (empty for full-screen and expanded quads).
    pub vertex_buffers: &'a [wgpu::VertexBufferLayout<'a>],
    /// Color targets.
    pub targets: &'a [Option<wgpu::ColorTargetState>],
    /// Depth/stencil state.
    pub depth_stencil: Option<wgpu::DepthStencilState>,
    /// Face culling.
    pub cull_mode: Option<wgpu::Face>,
    /// Sample count of every attachment.
    pub sample_count: u32,
}

/// Create a render pipeline with a `vs_main` vertex entry point.
pub fn create_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    params: &RenderPipelineParams<'_>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("{} Pipeline", params.label)),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: params.shader,
            entry_point: Some("vs_main"),
            buffers: params.vertex_buffers,
            compilation_options: Default::default(),
        },
        fragment: params.fragment_entry.map(|entry| wgpu::FragmentState {
            module: params.shader,
            entry_point: Some(entry),
            targets: params.targets,
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            cull_mode: params.cull_mode,
            ..Default::default()
        },
        depth_stencil: params.depth_stencil.clone(),
        multisample: wgpu::MultisampleState {
            count: params.sample_count,
            ..Default::default()
        },
        multiview: None,
        cache: None,
    })
}

/// Create a compute pipeline with a `cs_main` entry point.
pub fn create_compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
) -> wgpu::ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("{label} Pipeline")),
        layout: Some(layout),
        module: shader,
        entry_point: Some("cs_main"),
        compilation_options: Default::default(),
        cache: None,
    })
}
