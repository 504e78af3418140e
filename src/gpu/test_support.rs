//! Headless device for GPU-gated tests.

use super::render_context::RenderContext;

/// Format used for caller-owned output targets in tests.
pub(crate) const TEST_OUTPUT_FORMAT: wgpu::TextureFormat =
    wgpu::TextureFormat::Rgba8Unorm;

/// A headless context, or `None` (with a log line) when the machine has no
/// usable adapter. Tests return early in that case.
pub(crate) fn headless_context() -> Option<RenderContext> {
    match pollster::block_on(RenderContext::headless(TEST_OUTPUT_FORMAT, 64, 64)) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            log::warn!("skipping GPU test: {e}");
            None
        }
    }
}
