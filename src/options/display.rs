use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema,
)]
#[allow(clippy::struct_excessive_bools)]
#[schemars(title = "Display", inline)]
#[serde(default)]
/// Debug visualization toggles, read by every shading path.
pub struct DisplayOptions {
    /// Replace material albedo with white.
    #[schemars(title = "Lighting Only")]
    pub lighting_only: bool,
    /// Shade with the geometric face normal instead of the interpolated one.
    #[schemars(title = "Face Normals")]
    pub face_normals: bool,
    /// Heat-map the number of lights affecting each pixel.
    #[schemars(title = "Visualize Light Count")]
    pub visualize_light_count: bool,
    /// Tint pixels that were shaded per sample.
    #[schemars(title = "Visualize Per-Sample Shading")]
    pub visualize_per_sample_shading: bool,
}
