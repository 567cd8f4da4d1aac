//! Clear-color pulse demo
//!
//! Opens a window and clears it to a slowly cycling color through the frame
//! pipeline. Resizing, minimizing and stale surfaces are handled by the
//! render session. An engine configuration file (`.toml` or `.ron`) may be
//! passed as the first argument.

use std::sync::Arc;
use std::time::Instant;

use frame_engine::config::{Config, ConfigError};
use frame_engine::foundation::logging;
use frame_engine::prelude::*;
use frame_engine::render::api::SharedDevice;
use frame_engine::render::backends::vulkan::{self, GlfwWindow, VulkanDevice, WindowError};
use thiserror::Error;

#[derive(Error, Debug)]
enum AppError {
    #[error("window: {0}")]
    Window(#[from] WindowError),

    #[error("render: {0}")]
    Render(#[from] RenderError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

struct PulseApp {
    // The session owns the surface and must go before the window.
    session: RenderSession,
    device: Arc<VulkanDevice>,
    window: GlfwWindow,
    clear_depth: bool,
    start: Instant,
    frames_presented: u64,
    rebuilds: u64,
}

impl PulseApp {
    fn new(config: &EngineConfig) -> Result<Self, AppError> {
        log::info!("Creating window...");
        let mut window = GlfwWindow::new(&config.vulkan.application_name, 1280, 720)?;
        let extensions = window.required_instance_extensions()?;

        log::info!("Creating Vulkan backend...");
        let (device, presenter) = vulkan::create_backend(&config.vulkan, &extensions, |instance| {
            window.create_vulkan_surface(instance)
        })?;
        log::info!("Rendering on {}", device.name());

        let shared: SharedDevice = device.clone();
        let mut session = RenderSession::new(shared, Box::new(presenter), &mut window, config)?;
        session.swapchain_mut().attach_render_pass()?;

        Ok(Self {
            session,
            device,
            window,
            clear_depth: config.swapchain.depth_format.is_some(),
            start: Instant::now(),
            frames_presented: 0,
            rebuilds: 0,
        })
    }

    fn run(&mut self) -> Result<(), AppError> {
        log::info!("Starting pulse loop");

        while !self.window.should_close() {
            let events = self.window.poll_events();
            if events.close_requested {
                break;
            }
            if events.resized {
                self.session.handle_resize();
            }

            let color = self.clear_color();
            let clear_depth = self.clear_depth;
            let device = &self.device;

            let outcome = self.session.draw_frame(&mut self.window, |frame| {
                if let (Some(render_pass), Some(framebuffer)) = (frame.render_pass(), frame.framebuffer()) {
                    device.record_clear_pass(
                        frame.token().command_buffer(),
                        render_pass,
                        framebuffer,
                        frame.extent(),
                        color,
                        clear_depth,
                    );
                }
                Ok(())
            })?;

            match outcome {
                FrameOutcome::Presented { .. } => self.frames_presented += 1,
                FrameOutcome::SwapchainRebuilt => {
                    self.rebuilds += 1;
                    log::debug!("Swapchain rebuilt ({} so far)", self.rebuilds);
                }
            }
        }

        self.session.wait_idle()?;

        let elapsed = self.start.elapsed().as_secs_f64();
        let stats = self.session.stats();
        log::info!(
            "Presented {} frames in {elapsed:.1}s ({:.1} fps), {} blocking waits, {} swapchain rebuilds",
            self.frames_presented,
            self.frames_presented as f64 / elapsed.max(f64::EPSILON),
            stats.blocking_waits,
            self.rebuilds,
        );
        Ok(())
    }

    /// Color cycling through hue over roughly six seconds
    fn clear_color(&self) -> [f32; 4] {
        let t = self.start.elapsed().as_secs_f32();
        let phase = std::f32::consts::TAU / 3.0;
        [
            0.5 + 0.5 * t.sin(),
            0.5 + 0.5 * (t + phase).sin(),
            0.5 + 0.5 * (t + 2.0 * phase).sin(),
            1.0,
        ]
    }
}

fn run() -> Result<(), AppError> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from {path}");
            EngineConfig::load_from_file(path)?
        }
        None => EngineConfig::new("Pulse"),
    };
    config.checked()?;

    let mut app = PulseApp::new(&config)?;
    app.run()
}

fn main() {
    logging::init_with_level(log::LevelFilter::Info);

    if let Err(err) = run() {
        log::error!("Pulse demo failed: {err}");
        std::process::exit(1);
    }
}
