//! Seeded orbit and color parameters for the animated light set.
//!
//! The generator is deterministic: the same seed always yields the same
//! lights, so captures and timings stay comparable between runs.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// log2 of the largest light count.
pub const MAX_LIGHTS_POWER: u32 = 4;
/// Largest number of simultaneously active lights.
pub const MAX_LIGHTS: usize = 1 << MAX_LIGHTS_POWER;

const SEED: u64 = 1337;
const MAX_RADIUS: f32 = 100.0;
const ATTENUATION_BEGIN_FACTOR: f32 = 0.8;
const FOCAL_ATTENUATION_END: f32 = 100.0;

/// Circular orbit in the XZ plane at a fixed height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orbit {
    /// Distance from the origin in XZ.
    pub radius: f32,
    /// Phase at t = 0, radians.
    pub angle: f32,
    /// Constant Y.
    pub height: f32,
    /// Angular speed, radians per second (signed).
    pub speed: f32,
}

impl Orbit {
    /// World position after `total_time` seconds.
    pub fn position(&self, total_time: f32) -> Vec3 {
        let angle = self.angle + total_time * self.speed;
        Vec3::new(
            self.radius * angle.cos(),
            self.height,
            self.radius * angle.sin(),
        )
    }
}

/// Color and falloff of a light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightParams {
    /// Linear RGB intensity.
    pub color: Vec3,
    /// Distance where falloff starts.
    pub attenuation_begin: f32,
    /// Distance where the light reaches zero.
    pub attenuation_end: f32,
}

/// One procedurally generated light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratedLight {
    /// Animation parameters.
    pub orbit: Orbit,
    /// Shading parameters.
    pub params: LightParams,
}

/// Generate the first `count` lights of the fixed-seed sequence.
///
/// Generation is prefix-stable: the first `n` lights of a larger request
/// equal a request for `n`. Light 0 gets a fixed falloff so it can light the
/// focal point at full strength.
pub fn generate_lights(count: usize) -> Vec<GeneratedLight> {
    let mut rng = StdRng::seed_from_u64(SEED);
    (0..count)
        .map(|index| {
            let radius = rng.random_range(0.0..1.0f32).sqrt() * MAX_RADIUS;
            let angle = rng.random_range(0.0..TAU);
            let height = rng.random_range(0.0..20.0f32);
            let direction = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
            let speed = direction * rng.random_range(2.0..20.0f32) / radius.max(f32::EPSILON);
            let hue = rng.random_range(0.0..1.0f32);
            let intensity = rng.random_range(0.1..0.5f32);
            let attenuation_end = if index == 0 {
                FOCAL_ATTENUATION_END
            } else {
                rng.random_range(2.0..150.0f32)
            };

            GeneratedLight {
                orbit: Orbit {
                    radius,
                    angle,
                    height,
                    speed,
                },
                params: LightParams {
                    color: hue_to_rgb(hue) * intensity,
                    attenuation_begin: ATTENUATION_BEGIN_FACTOR * attenuation_end,
                    attenuation_end,
                },
            }
        })
        .collect()
}

/// Fully saturated, half-lightness HSL color for `hue` in [0, 1].
pub fn hue_to_rgb(hue: f32) -> Vec3 {
    let h = hue * 6.0;
    Vec3::new(
        (h - 3.0).abs() - 1.0,
        2.0 - (h - 2.0).abs(),
        2.0 - (h - 4.0).abs(),
    )
    .clamp(Vec3::ZERO, Vec3::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic_and_prefix_stable() {
        let a = generate_lights(MAX_LIGHTS);
        let b = generate_lights(MAX_LIGHTS);
        assert_eq!(a, b);
        assert_eq!(generate_lights(4)[..], a[..4]);
        assert!(generate_lights(0).is_empty());
    }

    #[test]
    fn parameters_stay_in_range() {
        for (i, light) in generate_lights(MAX_LIGHTS).iter().enumerate() {
            assert!((0.0..=MAX_RADIUS).contains(&light.orbit.radius));
            assert!((0.0..TAU).contains(&light.orbit.angle));
            assert!((0.0..20.0).contains(&light.orbit.height));
            let linear = light.orbit.speed.abs() * light.orbit.radius;
            assert!(linear > 2.0 - 1e-3 && linear < 20.0 + 1e-3, "light {i}: {linear}");
            let p = light.params;
            assert!((p.attenuation_begin - 0.8 * p.attenuation_end).abs() < 1e-4);
            if i == 0 {
                assert_eq!(p.attenuation_end, 100.0);
            } else {
                assert!((2.0..150.0).contains(&p.attenuation_end));
            }
            assert!(p.color.max_element() <= 0.5);
        }
    }

    #[test]
    fn orbit_is_circular_at_constant_height() {
        for light in generate_lights(MAX_LIGHTS) {
            for t in [0.0, 0.5, 3.0, 120.0] {
                let p = light.orbit.position(t);
                assert!((p.y - light.orbit.height).abs() < 1e-5);
                let xz = (p.x * p.x + p.z * p.z).sqrt();
                assert!((xz - light.orbit.radius).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn hue_wheel_primaries() {
        assert!(hue_to_rgb(0.0).abs_diff_eq(Vec3::X, 1e-5));
        assert!(hue_to_rgb(1.0 / 3.0).abs_diff_eq(Vec3::Y, 1e-5));
        assert!(hue_to_rgb(2.0 / 3.0).abs_diff_eq(Vec3::Z, 1e-5));
    }
}
