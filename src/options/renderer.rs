use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::LightcullError;
use crate::renderer::Technique;

/// MSAA sample counts the resource set can be built with.
pub const SUPPORTED_MSAA_SAMPLES: [u32; 4] = [1, 2, 4, 8];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Renderer", inline)]
#[serde(default)]
/// Technique selection and framebuffer configuration.
pub struct RendererOptions {
    /// Lighting technique rendered this frame.
    #[schemars(title = "Technique")]
    pub technique: Technique,
    /// Samples per pixel of every intermediate surface.
    #[schemars(title = "MSAA Samples", range(min = 1, max = 8))]
    pub msaa_samples: u32,
    /// Linear RGB written where no geometry covers a sample.
    #[schemars(title = "Sky Color")]
    pub sky_color: [f32; 3],
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            technique: Technique::ComputeTile,
            msaa_samples: 4,
            sky_color: [0.05, 0.07, 0.1],
        }
    }
}

impl RendererOptions {
    pub(super) fn validate(&self) -> Result<(), LightcullError> {
        if !SUPPORTED_MSAA_SAMPLES.contains(&self.msaa_samples) {
            return Err(LightcullError::InvalidOption(format!(
                "renderer.msaa_samples must be one of {SUPPORTED_MSAA_SAMPLES:?}, got {}",
                self.msaa_samples
            )));
        }
        Ok(())
    }
}
