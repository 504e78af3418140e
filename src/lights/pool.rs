use glam::{Mat4, Vec3};

use super::generator::{GeneratedLight, MAX_LIGHTS, generate_lights};
use crate::gpu::structured_buffer::StructuredBuffer;

/// World position light 0 is pinned to while
/// [`LightState::pin_focal_light`] is set.
pub const FOCAL_LIGHT_POSITION: Vec3 = Vec3::new(4.744, 3.208, -4.43);

/// GPU layout of one light; matches `PointLight` in `frame.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuPointLight {
    /// View-space position.
    pub position_view: [f32; 3],
    /// Distance where falloff starts.
    pub attenuation_begin: f32,
    /// Linear RGB intensity.
    pub color: [f32; 3],
    /// Distance where the light reaches zero.
    pub attenuation_end: f32,
}

const _: () = assert!(size_of::<GpuPointLight>() == 32);

/// CPU side of the light pool: generated parameters, animation clock and
/// the active count.
#[derive(Debug, Clone)]
pub struct LightState {
    lights: Vec<GeneratedLight>,
    total_time: f32,
    /// Pin light 0 to [`FOCAL_LIGHT_POSITION`] instead of its orbit.
    pub pin_focal_light: bool,
}

impl LightState {
    /// State with `active` lights at t = 0.
    pub fn new(active: usize, pin_focal_light: bool) -> Self {
        let mut state = Self {
            lights: Vec::new(),
            total_time: 0.0,
            pin_focal_light,
        };
        state.configure(active);
        state
    }

    /// Change the active count. Growing regenerates the parameters; the
    /// sequence is prefix-stable, so existing lights keep theirs.
    ///
    /// # Panics
    ///
    /// Panics if `active` exceeds [`MAX_LIGHTS`].
    pub fn configure(&mut self, active: usize) {
        assert!(active <= MAX_LIGHTS, "{active} lights exceeds the maximum of {MAX_LIGHTS}");
        if active > self.lights.len() {
            self.lights = generate_lights(active);
        } else {
            self.lights.truncate(active);
        }
    }

    /// Number of active lights.
    pub fn active(&self) -> usize {
        self.lights.len()
    }

    /// Generated parameters of the active lights.
    pub fn lights(&self) -> &[GeneratedLight] {
        &self.lights
    }

    /// Seconds of animation accumulated so far.
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Advance the animation clock.
    pub fn advance(&mut self, elapsed_seconds: f32) {
        self.total_time += elapsed_seconds;
    }

    /// World positions of the active lights, with the focal pin applied.
    pub fn world_positions(&self) -> Vec<Vec3> {
        self.lights
            .iter()
            .enumerate()
            .map(|(i, light)| {
                if i == 0 && self.pin_focal_light {
                    FOCAL_LIGHT_POSITION
                } else {
                    light.orbit.position(self.total_time)
                }
            })
            .collect()
    }

    /// GPU records for the active lights, positioned in view space.
    pub fn view_space(&self, view: Mat4) -> Vec<GpuPointLight> {
        self.world_positions()
            .into_iter()
            .zip(&self.lights)
            .map(|(world, light)| GpuPointLight {
                position_view: view.transform_point3(world).to_array(),
                attenuation_begin: light.params.attenuation_begin,
                color: light.params.color.to_array(),
                attenuation_end: light.params.attenuation_end,
            })
            .collect()
    }
}

/// Active lights plus the storage buffer mirroring them for shaders.
///
/// The mirror holds exactly the active subset and is rewritten every frame
/// through the discard path.
pub struct LightPool {
    state: LightState,
    buffer: StructuredBuffer<GpuPointLight>,
}

impl LightPool {
    /// Pool with `active` lights.
    pub fn new(device: &wgpu::Device, active: usize, pin_focal_light: bool) -> Self {
        let state = LightState::new(active, pin_focal_light);
        let buffer = Self::create_mirror(device, state.active());
        Self { state, buffer }
    }

    fn create_mirror(device: &wgpu::Device, len: usize) -> StructuredBuffer<GpuPointLight> {
        StructuredBuffer::new(device, "Point Lights", len, wgpu::BufferUsages::STORAGE, true)
    }

    /// Resize the mirror to exactly `active` entries. The buffer is
    /// replaced, so bind groups holding the old one must be rebuilt.
    pub fn configure(&mut self, device: &wgpu::Device, active: usize) {
        self.state.configure(active);
        self.buffer = Self::create_mirror(device, active);
        log::info!("light pool resized to {active} lights");
    }

    /// Advance the animation clock.
    pub fn advance(&mut self, elapsed_seconds: f32) {
        self.state.advance(elapsed_seconds);
    }

    /// Write view-space lights into the mirror the frame bind group holds.
    pub fn upload(&mut self, queue: &wgpu::Queue, view: Mat4) {
        let lights = self.state.view_space(view);
        self.buffer.map_discard().copy_from_slice(&lights);
        self.buffer.unmap(queue);
    }

    /// The mirror buffer.
    pub fn buffer(&self) -> &wgpu::Buffer {
        self.buffer.buffer()
    }

    /// Number of active lights.
    pub fn active(&self) -> usize {
        self.state.active()
    }

    /// CPU state.
    pub fn state(&self) -> &LightState {
        &self.state
    }

    /// Mutable CPU state, for toggling the focal pin.
    pub fn state_mut(&mut self) -> &mut LightState {
        &mut self.state
    }

    /// Read the mirror back through the staging path. Debug only.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LightcullError::BufferMap`] when the staging
    /// map fails.
    pub fn read_back(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Vec<GpuPointLight>, crate::error::LightcullError> {
        self.buffer.map(device, queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_support::headless_context;
    use crate::lights::generator::MAX_LIGHTS;

    #[test]
    fn focal_light_is_pinned_before_the_view_transform() {
        let state = LightState::new(1, true);
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let gpu = state.view_space(view);
        let expected = FOCAL_LIGHT_POSITION + Vec3::new(0.0, 0.0, -5.0);
        assert!(Vec3::from(gpu[0].position_view).abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn unpinned_light_zero_follows_its_orbit() {
        let mut state = LightState::new(2, false);
        state.advance(1.5);
        let orbit = state.lights()[0].orbit;
        assert_eq!(state.world_positions()[0], orbit.position(1.5));
    }

    #[test]
    fn growing_keeps_existing_lights() {
        let mut state = LightState::new(2, true);
        let before = state.lights().to_vec();
        state.configure(MAX_LIGHTS);
        assert_eq!(state.active(), MAX_LIGHTS);
        assert_eq!(state.lights()[..2], before[..]);
        state.configure(0);
        assert_eq!(state.active(), 0);
        assert!(state.view_space(Mat4::IDENTITY).is_empty());
    }

    #[test]
    #[should_panic(expected = "exceeds the maximum")]
    fn too_many_lights_is_a_contract_violation() {
        let _ = LightState::new(MAX_LIGHTS + 1, true);
    }

    #[test]
    fn gpu_mirror_round_trips_active_lights() {
        let Some(ctx) = headless_context() else {
            return;
        };
        let mut pool = LightPool::new(&ctx.device, 1, true);
        for active in [1, MAX_LIGHTS, 0] {
            pool.configure(&ctx.device, active);
            pool.advance(0.25);
            pool.upload(&ctx.queue, Mat4::IDENTITY);
            let read = pool.read_back(&ctx.device, &ctx.queue).unwrap();
            assert_eq!(read, pool.state().view_space(Mat4::IDENTITY));
        }
    }
}
