use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

use super::controller::CameraController;

/// What a held mouse drag does to the orbit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drag {
    Orbit,
    Pan,
}

/// Turns window mouse events into orbit, pan and zoom on a
/// [`CameraController`]. Left drag orbits; right drag, or left drag with
/// shift held, pans.
#[derive(Debug, Default)]
pub struct InputHandler {
    cursor: Option<Vec2>,
    drag: Option<Drag>,
    shift: bool,
}

impl InputHandler {
    /// Apply `event` to `controller`. Returns whether the camera consumed
    /// it.
    pub fn handle_event(
        &mut self,
        controller: &mut CameraController,
        event: &WindowEvent,
    ) -> bool {
        match event {
            WindowEvent::ModifiersChanged(modifiers) => {
                self.shift = modifiers.state().shift_key();
                false
            }
            WindowEvent::MouseInput { button, state, .. } => {
                let mode = match button {
                    MouseButton::Left if self.shift => Drag::Pan,
                    MouseButton::Left => Drag::Orbit,
                    MouseButton::Right => Drag::Pan,
                    _ => return false,
                };
                self.drag = (*state == ElementState::Pressed).then_some(mode);
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                let cursor = Vec2::new(position.x as f32, position.y as f32);
                let delta = self.cursor.map_or(Vec2::ZERO, |last| cursor - last);
                self.cursor = Some(cursor);
                match self.drag {
                    Some(Drag::Orbit) => controller.rotate(delta),
                    Some(Drag::Pan) => controller.pan(delta),
                    None => return false,
                }
                true
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                self.drag = None;
                false
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.01,
                };
                controller.zoom(scroll);
                true
            }
            _ => false,
        }
    }
}
