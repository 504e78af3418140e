//! GPU resource management utilities.
//!
//! Provides wgpu device/surface initialization, sized surfaces and typed
//! buffers, stage timers, pipeline boilerplate and shader composition.

/// Shared wgpu boilerplate for layouts and pipelines.
pub mod pipeline_helpers;
/// wgpu device, surface, and queue initialization.
pub mod render_context;
/// WGSL shader composition with `#import` support via naga-oil.
pub mod shader_composer;
/// Typed storage buffers with discard and staging read paths.
pub mod structured_buffer;
/// Textures described once and viewed as targets, shader inputs or storage.
pub mod surface;
/// Per-stage GPU timestamp brackets.
pub mod timer;
/// Single-block uniform buffers.
pub mod uniform_buffer;

#[cfg(test)]
pub(crate) mod test_support;
