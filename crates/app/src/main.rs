//! ember - windowed driver for the engine.
//!
//! Opens a window, loads the configured assets and renders a spinning
//! textured mesh until the window is closed or Escape is pressed.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use ember_core::config::{AnimationConfig, CameraConfig};
use ember_core::{EngineConfig, Timer};
use ember_platform::Window;
use ember_renderer::{Engine, EngineAssets, FrameOutcome, UniformBufferObject, vk};
use ember_scene::{Camera, Spin};

const FPS_REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "ember", version, about = "Render a textured mesh with Vulkan")]
struct Cli {
    /// Configuration file. Defaults to ./ember.toml when present.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Camera and model animation driving the uniforms.
struct SceneState {
    camera: Camera,
    spin: Spin,
}

impl SceneState {
    fn from_config(camera: &CameraConfig, animation: &AnimationConfig) -> Self {
        Self {
            camera: Camera::new(
                Vec3::from(camera.eye),
                Vec3::from(camera.target),
                Vec3::from(camera.up),
                camera.fov_y_degrees.to_radians(),
                camera.near,
                camera.far,
            ),
            spin: Spin::new(Vec3::from(animation.axis), animation.degrees_per_second),
        }
    }

    /// Uniforms for time `seconds` on a swapchain of `extent`.
    fn uniforms(&self, seconds: f32, extent: vk::Extent2D) -> UniformBufferObject {
        let aspect = if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        };
        UniformBufferObject::new(
            self.spin.model(seconds),
            self.camera.view(),
            self.camera.projection(aspect),
        )
    }
}

struct App {
    config: EngineConfig,
    scene: SceneState,
    // Declared before the window so the engine and its surface drop first.
    engine: Option<Engine>,
    window: Option<Window>,
    timer: Timer,
    failed: bool,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        let scene = SceneState::from_config(&config.camera, &config.animation);
        Self {
            config,
            scene,
            engine: None,
            window: None,
            timer: Timer::new(),
            failed: false,
        }
    }

    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window =
            Window::new(event_loop, &self.config.window).context("Failed to create window")?;
        let assets =
            EngineAssets::load(&self.config.assets).context("Failed to load assets")?;
        let engine = Engine::initialize(&window, assets, &self.config.renderer)
            .context("Failed to initialize engine")?;

        self.engine = Some(engine);
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(engine), Some(window)) = (self.engine.as_mut(), self.window.as_ref()) else {
            return Ok(());
        };

        if window.is_minimized() {
            return Ok(());
        }

        let seconds = self.timer.elapsed_secs();
        let scene = &self.scene;
        let outcome = engine
            .render_frame(window, |extent| scene.uniforms(seconds, extent))
            .context("Frame failed")?;

        match outcome {
            FrameOutcome::Presented => {}
            FrameOutcome::Skipped => debug!("Frame skipped, swapchain was stale"),
            FrameOutcome::PresentedAndRecreated => debug!(
                "Swapchain recreated at {:?} (generation {})",
                engine.extent(),
                engine.swapchain_generation()
            ),
        }

        self.timer.tick();
        if let Some(fps) = self.timer.fps_report(FPS_REPORT_INTERVAL) {
            info!("{:.1} fps", fps);
        }
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(engine) = self.engine.take()
            && let Err(e) = engine.shutdown()
        {
            error!("Engine shutdown failed: {:?}", e);
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match self.initialize(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => {
                error!("{:#}", e);
                self.failed = true;
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                info!("Escape pressed, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(engine) = self.engine.as_mut() {
                    engine.notify_resized();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    error!("{:#}", e);
                    self.failed = true;
                    self.shutdown(event_loop);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    ember_core::init_logging();
    info!("Starting ember");

    let config = EngineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if app.failed {
        anyhow::bail!("ember stopped after a fatal error");
    }
    info!("Exited cleanly");
    Ok(())
}
