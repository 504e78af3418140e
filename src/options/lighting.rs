use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::LightcullError;
use crate::lights::MAX_LIGHTS_POWER;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[schemars(title = "Lighting", inline)]
#[serde(default)]
/// Point light count and animation.
pub struct LightingOptions {
    /// Active light count as a power of two.
    #[schemars(title = "Lights (log2)", range(min = 0, max = 4))]
    pub active_lights_power: u32,
    /// Advance the light orbits every frame.
    #[schemars(title = "Animate Lights")]
    pub animate: bool,
    /// Hold light 0 at a fixed point in front of the camera path.
    #[schemars(title = "Pin Focal Light")]
    pub pin_focal_light: bool,
}

impl Default for LightingOptions {
    fn default() -> Self {
        Self {
            active_lights_power: MAX_LIGHTS_POWER,
            animate: true,
            pin_focal_light: true,
        }
    }
}

impl LightingOptions {
    /// Number of active lights.
    #[must_use]
    pub fn active_lights(&self) -> usize {
        1 << self.active_lights_power.min(MAX_LIGHTS_POWER)
    }

    pub(super) fn validate(&self) -> Result<(), LightcullError> {
        if self.active_lights_power > MAX_LIGHTS_POWER {
            return Err(LightcullError::InvalidOption(format!(
                "lighting.active_lights_power must be at most {MAX_LIGHTS_POWER}, got {}",
                self.active_lights_power
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lights::MAX_LIGHTS;

    #[test]
    fn power_maps_to_light_count() {
        let mut opts = LightingOptions::default();
        assert_eq!(opts.active_lights(), MAX_LIGHTS);
        opts.active_lights_power = 0;
        assert_eq!(opts.active_lights(), 1);
        opts.active_lights_power = MAX_LIGHTS_POWER + 1;
        assert!(opts.validate().is_err());
    }
}
