//! Procedurally animated point lights and their GPU mirror.
//!
//! [`generator`] produces deterministic orbit and color parameters from a
//! fixed seed. [`LightState`] animates them on the CPU and transforms them
//! into view space; [`LightPool`] owns the storage buffer shaders read.

pub mod generator;
mod pool;

pub use generator::{GeneratedLight, LightParams, MAX_LIGHTS, MAX_LIGHTS_POWER, Orbit};
pub use pool::{FOCAL_LIGHT_POSITION, GpuPointLight, LightPool, LightState};
