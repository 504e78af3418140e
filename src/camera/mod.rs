//! Camera system for 3D scene viewing.
//!
//! Provides the [`CameraProvider`] seam the renderer consumes, a reversed
//! depth perspective camera, an orbital controller and frustum culling.

/// Orbital camera controller managing rotation, pan and zoom.
pub mod controller;
/// Core camera struct and the provider trait.
pub mod core;
/// View frustum extraction and intersection tests.
pub mod frustum;
/// Window-event-based camera input handler.
#[cfg(feature = "viewer")]
pub mod input;

pub use self::core::{Camera, CameraProvider};
