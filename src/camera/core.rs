use glam::{Mat4, Vec3};

/// Source of the per-frame view and projection the renderer consumes.
pub trait CameraProvider {
    /// World-to-view transform.
    fn view(&self) -> Mat4;
    /// View-to-clip transform.
    fn projection(&self) -> Mat4;
    /// Near clip distance.
    fn near(&self) -> f32;
    /// Far clip distance.
    fn far(&self) -> f32;

    /// Combined view-projection matrix.
    fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

/// Perspective camera defined by eye position, target, and projection
/// parameters.
///
/// The projection uses reversed depth: the near plane maps to 1 and the far
/// plane to 0, so depth buffers clear to 0 and test with `GreaterEqual`.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Eye (camera) position in world space.
    pub eye: Vec3,
    /// Look-at target position.
    pub target: Vec3,
    /// Up direction vector.
    pub up: Vec3,
    /// Viewport aspect ratio (width / height).
    pub aspect: f32,
    /// Vertical field of view in degrees.
    pub fovy: f32,
    /// Near clipping plane distance.
    pub znear: f32,
    /// Far clipping plane distance.
    pub zfar: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 4.0, 12.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            aspect: 16.0 / 9.0,
            fovy: 60.0,
            znear: 0.05,
            zfar: 300.0,
        }
    }
}

impl Camera {
    /// Camera at the origin looking down -Z, whose view matrix is the
    /// identity.
    pub fn at_origin(aspect: f32) -> Self {
        Self {
            eye: Vec3::ZERO,
            target: Vec3::NEG_Z,
            aspect,
            ..Self::default()
        }
    }

    /// World-to-view matrix.
    pub fn build_view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Reversed-depth projection: far and near are swapped so the [0,1]
    /// depth range runs from the far plane to the near plane.
    pub fn build_projection(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fovy.to_radians(),
            self.aspect,
            self.zfar,
            self.znear,
        )
    }
}

impl CameraProvider for Camera {
    fn view(&self) -> Mat4 {
        self.build_view()
    }

    fn projection(&self) -> Mat4 {
        self.build_projection()
    }

    fn near(&self) -> f32 {
        self.znear
    }

    fn far(&self) -> f32 {
        self.zfar
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;

    #[test]
    fn origin_camera_has_identity_view() {
        let camera = Camera::at_origin(1.0);
        assert!(camera.view().abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn projection_reverses_depth() {
        let camera = Camera::at_origin(1.0);
        let proj = camera.projection();
        let near = proj * Vec4::new(0.0, 0.0, -camera.znear, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -camera.zfar, 1.0);
        assert!((near.z / near.w - 1.0).abs() < 1e-5);
        assert!((far.z / far.w).abs() < 1e-5);
    }
}
