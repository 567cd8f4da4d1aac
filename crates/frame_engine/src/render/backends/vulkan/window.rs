//! GLFW window for the Vulkan backend

use ash::vk;
use thiserror::Error;

use super::context::VulkanInstance;
use crate::render::api::{Extent2D, WindowSurface};
use crate::render::error::{RenderError, RenderResult};

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    #[error("GLFW initialization failed")]
    InitializationFailed,

    #[error("Window creation failed")]
    CreationFailed,

    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Events gathered by one [`GlfwWindow::poll_events`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolledEvents {
    /// The framebuffer changed size
    pub resized: bool,
    /// Close was requested (window button or Escape)
    pub close_requested: bool,
}

/// GLFW window without a client API, ready for a Vulkan surface
pub struct GlfwWindow {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl GlfwWindow {
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self, WindowError> {
        let mut glfw =
            glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
        })
    }

    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Pump the event queue and summarize what happened
    pub fn poll_events(&mut self) -> PolledEvents {
        self.glfw.poll_events();

        let mut polled = PolledEvents::default();
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::FramebufferSize(..) => polled.resized = true,
                glfw::WindowEvent::Close
                | glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    polled.close_requested = true;
                }
                _ => {}
            }
        }

        if polled.close_requested {
            self.window.set_should_close(true);
        }
        polled
    }

    /// Instance extensions GLFW needs for surface creation
    pub fn required_instance_extensions(&self) -> Result<Vec<String>, WindowError> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::GlfwError("Vulkan is not supported".to_string()))
    }

    /// Create a Vulkan surface for this window
    pub fn create_vulkan_surface(&self, instance: &VulkanInstance) -> RenderResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(
            instance.instance.handle(),
            std::ptr::null(),
            &mut surface,
        );

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(RenderError::creation_failed("window surface", format!("{result:?}")))
        }
    }
}

impl WindowSurface for GlfwWindow {
    fn framebuffer_extent(&self) -> Extent2D {
        let (width, height) = self.window.get_framebuffer_size();
        Extent2D::new(width.max(0) as u32, height.max(0) as u32)
    }

    fn wait_events(&mut self) {
        self.glfw.wait_events();
    }
}
