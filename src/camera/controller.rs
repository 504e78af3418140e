use glam::{Mat4, Quat, Vec2, Vec3};

use super::core::{Camera, CameraProvider};

/// Orbital camera: rotates around and zooms toward a focus point.
pub struct CameraController {
    orientation: Quat,
    distance: f32,
    focus_point: Vec3,

    /// Camera derived from the orbit state.
    pub camera: Camera,

    rotate_speed: f32,
    pan_speed: f32,
    zoom_speed: f32,
}

impl CameraController {
    /// Orbit `focus_point` from `distance` with the given viewport size.
    pub fn new(focus_point: Vec3, distance: f32, width: u32, height: u32) -> Self {
        let mut controller = Self {
            orientation: Quat::from_rotation_x(-0.3),
            distance,
            focus_point,
            camera: Camera {
                aspect: aspect(width, height),
                ..Camera::default()
            },
            rotate_speed: 0.005,
            pan_speed: 0.02,
            zoom_speed: 0.05,
        };
        controller.update_camera_pos();
        controller
    }

    fn update_camera_pos(&mut self) {
        let dir = self.orientation * Vec3::Z;

        self.camera.eye = self.focus_point + (dir * self.distance);
        self.camera.target = self.focus_point;
        self.camera.up = self.orientation * Vec3::Y;
    }

    /// Track a new viewport size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.aspect = aspect(width, height);
    }

    /// Rotate by a mouse delta in pixels.
    pub fn rotate(&mut self, delta: Vec2) {
        let up = self.orientation * Vec3::Y;
        let horizontal = Quat::from_axis_angle(up, -delta.x * self.rotate_speed);
        self.orientation = horizontal * self.orientation;

        let right = self.orientation * Vec3::X;
        let vertical = Quat::from_axis_angle(right, -delta.y * self.rotate_speed);
        self.orientation = vertical * self.orientation;

        self.update_camera_pos();
    }

    /// Move the focus point in the view plane.
    pub fn pan(&mut self, delta: Vec2) {
        let right = self.orientation * Vec3::X;
        let up = self.orientation * Vec3::Y;
        let scale = self.pan_speed * self.distance * 0.05;
        self.focus_point += right * (-delta.x * scale) + up * (delta.y * scale);
        self.update_camera_pos();
    }

    /// Zoom toward the focus point; positive `delta` moves closer.
    pub fn zoom(&mut self, delta: f32) {
        self.distance *= 1.0 - delta * self.zoom_speed;
        self.distance = self.distance.clamp(0.5, 250.0);
        self.update_camera_pos();
    }
}

impl CameraProvider for CameraController {
    fn view(&self) -> Mat4 {
        self.camera.view()
    }

    fn projection(&self) -> Mat4 {
        self.camera.projection()
    }

    fn near(&self) -> f32 {
        self.camera.znear
    }

    fn far(&self) -> f32 {
        self.camera.zfar
    }
}

#[allow(clippy::cast_precision_loss)]
fn aspect(width: u32, height: u32) -> f32 {
    width.max(1) as f32 / height.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_keeps_distance_to_focus() {
        let focus = Vec3::new(1.0, 2.0, 3.0);
        let mut controller = CameraController::new(focus, 10.0, 800, 600);
        controller.rotate(Vec2::new(120.0, -40.0));
        let dist = (controller.camera.eye - focus).length();
        assert!((dist - 10.0).abs() < 1e-3);
        assert_eq!(controller.camera.target, focus);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut controller = CameraController::new(Vec3::ZERO, 10.0, 800, 600);
        for _ in 0..200 {
            controller.zoom(1.0);
        }
        assert!((controller.camera.eye.length() - 0.5).abs() < 1e-3);
    }
}
