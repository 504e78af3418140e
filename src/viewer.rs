//! Standalone comparison window backed by winit.
//!
//! Renders the procedural demo scene with an orbit camera. Number keys
//! `1`-`8` select the technique, `M` cycles the MSAA sample count and
//! `+`/`-` double or halve the active light count. Stage times are logged
//! once a second.
//!
//! ```no_run
//! # use lightcull::viewer::Viewer;
//! Viewer::builder().build().run().unwrap();
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Mat4, Vec3};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::camera::controller::CameraController;
use crate::camera::input::InputHandler;
use crate::error::LightcullError;
use crate::gpu::render_context::RenderContext;
use crate::lights::MAX_LIGHTS_POWER;
use crate::mesh::procedural::demo_scene;
use crate::mesh::StaticMesh;
use crate::options::Options;
use crate::renderer::{
    FrameInput, OutputTarget, Renderer, SceneMeshes, Technique, Viewport,
};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

// ── Builder ──────────────────────────────────────────────────────────────

/// Fluent builder for [`Viewer`].
pub struct ViewerBuilder {
    options: Option<Options>,
    title: String,
}

impl ViewerBuilder {
    fn new() -> Self {
        Self {
            options: None,
            title: "lightcull".into(),
        }
    }

    /// Override the default options.
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the window title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Consume the builder and produce a [`Viewer`].
    #[must_use]
    pub fn build(self) -> Viewer {
        Viewer {
            options: self.options.unwrap_or_default(),
            title: self.title,
        }
    }
}

// ── Viewer ───────────────────────────────────────────────────────────────

/// A window that renders the demo scene with any technique.
pub struct Viewer {
    options: Options,
    title: String,
}

impl Viewer {
    /// Start a new builder.
    #[must_use]
    pub fn builder() -> ViewerBuilder {
        ViewerBuilder::new()
    }

    /// Open the window and run the event loop. Blocks until the window is
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns [`LightcullError::Viewer`] if the event loop fails.
    pub fn run(self) -> Result<(), LightcullError> {
        let event_loop =
            EventLoop::new().map_err(|e| LightcullError::Viewer(e.to_string()))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut app = ViewerApp {
            window: None,
            state: None,
            options: self.options,
            title: self.title,
            last_frame_time: Instant::now(),
            last_report: Instant::now(),
        };
        event_loop
            .run_app(&mut app)
            .map_err(|e| LightcullError::Viewer(e.to_string()))
    }
}

// ── Winit app ────────────────────────────────────────────────────────────

/// GPU-side state, created once the window exists.
struct ViewerState {
    ctx: RenderContext,
    renderer: Renderer,
    controller: CameraController,
    input: InputHandler,
    opaque: StaticMesh,
    alpha_tested: StaticMesh,
}

impl ViewerState {
    fn new(
        window: Arc<Window>,
        options: &Options,
    ) -> Result<Self, LightcullError> {
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));
        let ctx = pollster::block_on(RenderContext::new(window, (width, height)))?;
        let renderer = Renderer::new(&ctx, options)?;

        let scene = demo_scene();
        let layout = renderer.material_layout();
        let opaque = StaticMesh::new(&ctx.device, &ctx.queue, layout, &scene.opaque);
        let alpha_tested =
            StaticMesh::new(&ctx.device, &ctx.queue, layout, &scene.alpha_tested);

        Ok(Self {
            controller: CameraController::new(Vec3::new(0.0, 2.0, 0.0), 40.0, width, height),
            input: InputHandler::default(),
            ctx,
            renderer,
            opaque,
            alpha_tested,
        })
    }

    fn resize(&mut self, width: u32, height: u32, samples: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.ctx.resize(width, height);
        self.controller.resize(width, height);
        if let Err(e) = self.renderer.resize(&self.ctx, width, height, samples) {
            log::error!("resize failed: {e}");
        }
    }

    fn render(&mut self, options: &Options) -> Result<(), wgpu::SurfaceError> {
        let frame = self.ctx.get_next_frame()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.renderer.render(
            &self.ctx,
            &FrameInput {
                camera: &self.controller,
                world: Mat4::IDENTITY,
                options,
            },
            SceneMeshes {
                opaque: &mut self.opaque,
                alpha_tested: &mut self.alpha_tested,
            },
            &OutputTarget {
                view: &view,
                viewport: Viewport::full(self.ctx.width(), self.ctx.height()),
            },
        );
        frame.present();
        let _ = self.renderer.poll_timers(&self.ctx.device);
        Ok(())
    }

    /// Next sample count the adapter supports after the current one.
    fn next_sample_count(&self) -> u32 {
        let counts = &self.ctx.sample_counts;
        let current = self.renderer.layout().samples;
        counts
            .iter()
            .position(|&s| s == current)
            .and_then(|i| counts.get((i + 1) % counts.len()))
            .copied()
            .unwrap_or(1)
    }
}

struct ViewerApp {
    window: Option<Arc<Window>>,
    state: Option<ViewerState>,
    options: Options,
    title: String,
    last_frame_time: Instant,
    last_report: Instant,
}

impl ViewerApp {
    fn handle_key(&mut self, code: KeyCode) {
        let Some(state) = &mut self.state else {
            return;
        };
        let digit = match code {
            KeyCode::Digit1 => Some(0),
            KeyCode::Digit2 => Some(1),
            KeyCode::Digit3 => Some(2),
            KeyCode::Digit4 => Some(3),
            KeyCode::Digit5 => Some(4),
            KeyCode::Digit6 => Some(5),
            KeyCode::Digit7 => Some(6),
            KeyCode::Digit8 => Some(7),
            _ => None,
        };
        if let Some(technique) = digit.and_then(Technique::from_index) {
            self.options.renderer.technique = technique;
            return;
        }

        let lighting = &mut self.options.lighting;
        match code {
            KeyCode::KeyM => {
                let samples = state.next_sample_count();
                self.options.renderer.msaa_samples = samples;
                let (width, height) = (state.ctx.width(), state.ctx.height());
                state.resize(width, height, samples);
                log::info!("MSAA: {samples}x");
            }
            KeyCode::Equal | KeyCode::NumpadAdd => {
                lighting.active_lights_power = (lighting.active_lights_power + 1).min(MAX_LIGHTS_POWER);
                log::info!("lights: {}", lighting.active_lights());
            }
            KeyCode::Minus | KeyCode::NumpadSubtract => {
                lighting.active_lights_power = lighting.active_lights_power.saturating_sub(1);
                log::info!("lights: {}", lighting.active_lights());
            }
            _ => {}
        }
    }

    fn redraw(&mut self) {
        let Some(state) = &mut self.state else {
            return;
        };
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        state.renderer.update(&state.ctx.device, dt, &self.options);
        match state.render(&self.options) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                if let Some(w) = &self.window {
                    let inner = w.inner_size();
                    state.resize(inner.width, inner.height, self.options.renderer.msaa_samples);
                }
            }
            Err(e) => log::error!("render error: {e:?}"),
        }

        if now.duration_since(self.last_report) >= REPORT_INTERVAL {
            let times = state.renderer.frame_times();
            if times.is_ready() {
                log::info!("{}: {} ({})", times.technique(), times.csv(), times.header());
            }
            self.last_report = now;
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title(&self.title)
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
        let window = match event_loop.create_window(attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        match ViewerState::new(window.clone(), &self.options) {
            Ok(state) => {
                log::info!(
                    "{}",
                    state.renderer.memory_report(self.options.renderer.technique)
                );
                self.state = Some(state);
            }
            Err(e) => {
                log::error!("Failed to initialize renderer: {e}");
                event_loop.exit();
                return;
            }
        }
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: WindowId,
        event: WindowEvent,
    ) {
        if matches!(event, WindowEvent::CloseRequested) {
            event_loop.exit();
            return;
        }

        match event {
            WindowEvent::Resized(size) => {
                let samples = self.options.renderer.msaa_samples;
                if let Some(state) = &mut self.state {
                    state.resize(size.width, size.height, samples);
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.handle_key(code);
                }
            }
            other => {
                if let Some(state) = &mut self.state {
                    let _ = state.input.handle_event(&mut state.controller, &other);
                }
            }
        }
    }
}
