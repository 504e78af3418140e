//! Renderer options with TOML preset support.
//!
//! Everything the caller can tweak per frame lives here: the technique and
//! MSAA selection, light count and animation, the display debug toggles and
//! the streaming knobs. The display and streaming tables are copied straight
//! into the per-frame constant block.

mod display;
mod lighting;
mod renderer;
mod streaming;

use std::path::Path;

pub use display::DisplayOptions;
pub use lighting::LightingOptions;
pub use renderer::{RendererOptions, SUPPORTED_MSAA_SAMPLES};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
pub use streaming::{
    DepthMode, DerivativesMode, MergeMetric, StreamingOptions,
    StreamingVisualize,
};

use crate::error::LightcullError;

/// Top-level options container. All sub-structs use `#[serde(default)]` so
/// partial TOML files (e.g. only overriding `[lighting]`) work correctly.
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema,
)]
#[serde(default)]
pub struct Options {
    /// Technique, MSAA and sky color.
    pub renderer: RendererOptions,
    /// Light count and animation.
    pub lighting: LightingOptions,
    /// Debug visualization toggles.
    pub display: DisplayOptions,
    /// Streaming technique knobs.
    pub streaming: StreamingOptions,
}

impl Options {
    /// Generate JSON Schema describing the options.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Options)
    }

    /// Parse options from TOML text and validate them. Missing fields use
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::OptionsParse`] on malformed TOML and
    /// [`LightcullError::InvalidOption`] on out-of-range values.
    pub fn from_toml(content: &str) -> Result<Self, LightcullError> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::Io`] when the file cannot be read, plus
    /// everything [`Options::from_toml`] returns.
    pub fn load(path: &Path) -> Result<Self, LightcullError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Save options to a TOML file (pretty-printed).
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::OptionsParse`] if serialization fails and
    /// [`LightcullError::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), LightcullError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every field with a restricted domain.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::InvalidOption`] naming the first bad field.
    pub fn validate(&self) -> Result<(), LightcullError> {
        self.renderer.validate()?;
        self.lighting.validate()?;
        self.streaming.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::Technique;

    #[test]
    fn default_round_trips_through_toml() {
        let opts = Options::default();
        let toml_str = toml::to_string_pretty(&opts).unwrap();
        let parsed = Options::from_toml(&toml_str).unwrap();
        assert_eq!(opts, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
[renderer]
technique = "deferred_quad"

[streaming]
merge_metric = "both"
"#;
        let opts = Options::from_toml(toml_str).unwrap();
        assert_eq!(opts.renderer.technique, Technique::DeferredQuad);
        assert_eq!(opts.streaming.merge_metric, MergeMetric::Both);
        assert_eq!(opts.renderer.msaa_samples, 4);
        assert_eq!(opts.lighting.active_lights_power, 4);
        assert!(opts.lighting.pin_focal_light);
        assert_eq!(opts.streaming.merge_cos_theta, 0.8);
    }

    #[test]
    fn unsupported_msaa_is_rejected() {
        let err = Options::from_toml("[renderer]\nmsaa_samples = 3\n")
            .unwrap_err();
        assert!(matches!(err, LightcullError::InvalidOption(_)));
        assert!(err.to_string().contains("msaa_samples"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = Options::from_toml("[renderer\n").unwrap_err();
        assert!(matches!(err, LightcullError::OptionsParse(_)));
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir()
            .join(format!("lightcull-options-{}", std::process::id()));
        let path = dir.join("preset.toml");
        let mut opts = Options::default();
        opts.renderer.technique = Technique::StreamingSbaaNdi;
        opts.lighting.active_lights_power = 2;
        opts.display.visualize_light_count = true;
        opts.save(&path).unwrap();
        assert_eq!(Options::load(&path).unwrap(), opts);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn schema_has_expected_properties() {
        let schema_value =
            serde_json::to_value(Options::json_schema()).unwrap();
        let props = schema_value["properties"].as_object().unwrap();
        for section in ["renderer", "lighting", "display", "streaming"] {
            assert!(props.contains_key(section), "missing {section}");
        }
        let lighting = &props["lighting"]["properties"];
        assert!(lighting.get("active_lights_power").is_some());
        assert!(lighting.get("pin_focal_light").is_some());
    }
}
