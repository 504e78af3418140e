use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::LightcullError;

/// What the streaming merge compares before folding two surfaces together.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum MergeMetric {
    /// Compare shading normals.
    #[default]
    Normals,
    /// Compare depth derivatives.
    Derivatives,
    /// Require both to agree.
    Both,
}

/// Streaming statistics overlay.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StreamingVisualize {
    /// No overlay.
    #[default]
    None,
    /// Pixels where surfaces merged.
    Merges,
    /// Pixels where a surface was dropped.
    Discards,
    /// Surfaces shaded per pixel.
    Shading,
    /// Fill invocations per pixel.
    Executions,
}

/// How depth derivatives of merged surfaces are combined.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DerivativesMode {
    /// Keep the first surface's derivatives.
    None,
    /// Coverage-weighted average.
    #[default]
    Average,
    /// Smallest magnitude.
    Min,
}

/// How depths of merged surfaces are combined.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DepthMode {
    /// Keep the first surface's depth.
    None,
    /// Coverage-weighted average.
    #[default]
    Average,
    /// Farthest depth.
    Max,
    /// Nearest depth.
    Min,
}

macro_rules! gpu_index {
    ($($ty:ty),*) => {$(
        impl $ty {
            /// Value written into the per-frame constant block.
            #[must_use]
            pub fn gpu_value(self) -> u32 {
                self as u32
            }
        }
    )*};
}

gpu_index!(MergeMetric, StreamingVisualize, DerivativesMode, DepthMode);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[allow(clippy::struct_excessive_bools)]
#[schemars(title = "Streaming", inline)]
#[serde(default)]
/// Debug knobs of the streaming technique.
pub struct StreamingOptions {
    /// Debug counter threshold for the execution overlay; 0 disables it.
    #[schemars(title = "Execution Count", range(min = 0, max = 16))]
    pub execution_count: u32,
    /// Normals closer than this cosine may merge.
    #[schemars(title = "Merge cos(theta)", range(min = 0.0, max = 1.0), extend("step" = 0.01))]
    pub merge_cos_theta: f32,
    /// Statistics overlay.
    #[schemars(title = "Stats")]
    pub stats: StreamingVisualize,
    /// Merge comparison.
    #[schemars(title = "Merge Metric")]
    pub merge_metric: MergeMetric,
    /// Average shading normals of merged surfaces.
    #[schemars(title = "Average Normals")]
    pub average_normals: bool,
    /// Average albedo of merged surfaces.
    #[schemars(title = "Average Shade")]
    pub average_shade: bool,
    /// Derivative combination.
    #[schemars(title = "Derivatives")]
    pub derivatives: DerivativesMode,
    /// Depth combination.
    #[schemars(title = "Depth")]
    pub depth: DepthMode,
    /// Refuse merges of overlapping coverage.
    #[schemars(title = "Compare Coverage")]
    pub compare_coverage: bool,
    /// Refuse merges across depth discontinuities.
    #[schemars(title = "Compare Depth")]
    pub compare_depth: bool,
    /// Refuse merges across normal discontinuities.
    #[schemars(title = "Compare Normals")]
    pub compare_normals: bool,
}

impl Default for StreamingOptions {
    fn default() -> Self {
        Self {
            execution_count: 0,
            merge_cos_theta: 0.8,
            stats: StreamingVisualize::None,
            merge_metric: MergeMetric::Normals,
            average_normals: true,
            average_shade: true,
            derivatives: DerivativesMode::Average,
            depth: DepthMode::Average,
            compare_coverage: true,
            compare_depth: true,
            compare_normals: true,
        }
    }
}

impl StreamingOptions {
    pub(super) fn validate(&self) -> Result<(), LightcullError> {
        if !(0.0..=1.0).contains(&self.merge_cos_theta) {
            return Err(LightcullError::InvalidOption(format!(
                "streaming.merge_cos_theta must lie in [0, 1], got {}",
                self.merge_cos_theta
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_values_follow_declaration_order() {
        assert_eq!(MergeMetric::Normals.gpu_value(), 0);
        assert_eq!(MergeMetric::Both.gpu_value(), 2);
        assert_eq!(StreamingVisualize::Executions.gpu_value(), 4);
        assert_eq!(DerivativesMode::Min.gpu_value(), 2);
        assert_eq!(DepthMode::Min.gpu_value(), 3);
    }

    #[test]
    fn cos_theta_outside_unit_range_is_rejected() {
        let opts = StreamingOptions {
            merge_cos_theta: 1.5,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }
}
