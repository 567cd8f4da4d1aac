//! Vulkan backend
//!
//! Implements the collaborator traits with ash. [`create_backend`] brings up
//! the instance, lets the window system create a surface, selects a GPU and
//! returns the device and presenter a [`RenderSession`] runs on.
//!
//! [`RenderSession`]: crate::render::session::RenderSession

pub mod context;
pub mod convert;
pub mod device;
pub mod presenter;
#[cfg(feature = "windowing")]
pub mod window;

use ash::extensions::khr::Surface;
use ash::vk;
use std::sync::Arc;

pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanInstance};
pub use device::VulkanDevice;
pub use presenter::VulkanPresenter;
#[cfg(feature = "windowing")]
pub use window::{GlfwWindow, WindowError};

use crate::core::config::VulkanBackendConfig;
use crate::render::error::RenderResult;

/// Create a Vulkan device and presenter for a window surface
///
/// `window_extensions` are the instance extensions the window system needs;
/// `create_surface` is called once the instance exists.
pub fn create_backend<F>(
    config: &VulkanBackendConfig,
    window_extensions: &[String],
    create_surface: F,
) -> RenderResult<(Arc<VulkanDevice>, VulkanPresenter)>
where
    F: FnOnce(&VulkanInstance) -> RenderResult<vk::SurfaceKHR>,
{
    let instance = Arc::new(VulkanInstance::new(config, window_extensions)?);
    let surface_loader = Surface::new(&instance.entry, &instance.instance);
    let surface = create_surface(&instance)?;

    let logical = context::extension_names(&config.device_extensions).and_then(|extensions| {
        let physical = PhysicalDeviceInfo::select_suitable_device(
            &instance.instance,
            surface,
            &surface_loader,
            &extensions,
        )?;
        LogicalDevice::new(&instance.instance, physical, &extensions)
    });

    let logical = match logical {
        Ok(logical) => Arc::new(logical),
        Err(err) => {
            unsafe { surface_loader.destroy_surface(surface, None) };
            return Err(err);
        }
    };

    let device = Arc::new(VulkanDevice::new(logical.clone(), instance.clone()));
    let presenter = VulkanPresenter::new(surface, surface_loader, logical, instance);
    Ok((device, presenter))
}
