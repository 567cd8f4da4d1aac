//! [`PresentationSurface`] over a `VkSurfaceKHR` and its swapchain

use ash::extensions::khr::Surface;
use ash::vk;
use std::sync::Arc;
use std::time::Duration;

use super::context::{LogicalDevice, VulkanInstance};
use super::convert::{self, vk_err, vk_error, vk_handle};
use crate::render::api::{
    AcquiredImage, ImageHandle, PresentStatus, PresentationSurface, SemaphoreHandle,
    SurfaceCapabilities, SwapchainImages, SwapchainRequest,
};
use crate::render::error::{RenderError, RenderResult};

/// Window surface plus the swapchain built on it
pub struct VulkanPresenter {
    swapchain: vk::SwapchainKHR,
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    logical: Arc<LogicalDevice>,
    // Keeps the instance alive until the surface is destroyed.
    _instance: Arc<VulkanInstance>,
}

impl VulkanPresenter {
    pub(super) fn new(
        surface: vk::SurfaceKHR,
        surface_loader: Surface,
        logical: Arc<LogicalDevice>,
        instance: Arc<VulkanInstance>,
    ) -> Self {
        Self {
            swapchain: vk::SwapchainKHR::null(),
            surface,
            surface_loader,
            logical,
            _instance: instance,
        }
    }

    fn choose_surface_format(&self, request: &SwapchainRequest) -> RenderResult<vk::SurfaceFormatKHR> {
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.logical.physical.device, self.surface)
        }
        .map_err(vk_err("surface formats"))?;

        let wanted = convert::format(request.format);
        formats
            .iter()
            .find(|sf| sf.format == wanted && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .or_else(|| formats.iter().find(|sf| convert::texture_format(sf.format).is_some()))
            .copied()
            .ok_or_else(|| RenderError::creation_failed("swapchain", "no supported surface format"))
    }

    fn choose_present_mode(&self, request: &SwapchainRequest) -> RenderResult<vk::PresentModeKHR> {
        let modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.logical.physical.device, self.surface)
        }
        .map_err(vk_err("present modes"))?;

        let wanted = convert::present_mode(request.present_mode);
        Ok(if modes.contains(&wanted) {
            wanted
        } else {
            vk::PresentModeKHR::FIFO
        })
    }
}

impl PresentationSurface for VulkanPresenter {
    fn capabilities(&self) -> RenderResult<SurfaceCapabilities> {
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.logical.physical.device, self.surface)
        }
        .map_err(vk_err("surface capabilities"))?;

        let current_extent = (caps.current_extent.width != u32::MAX)
            .then(|| convert::from_vk_extent(caps.current_extent));

        Ok(SurfaceCapabilities {
            min_image_count: caps.min_image_count,
            max_image_count: caps.max_image_count,
            current_extent,
            min_extent: convert::from_vk_extent(caps.min_image_extent),
            max_extent: convert::from_vk_extent(caps.max_image_extent),
        })
    }

    fn create_swapchain(&mut self, request: &SwapchainRequest) -> RenderResult<SwapchainImages> {
        let surface_format = self.choose_surface_format(request)?;
        let present_mode = self.choose_present_mode(request)?;
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.logical.physical.device, self.surface)
        }
        .map_err(vk_err("surface capabilities"))?;

        let physical = &self.logical.physical;
        let families = [physical.graphics_family, physical.present_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(request.image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(convert::extent(request.extent))
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);

        create_info = if physical.graphics_family == physical.present_family {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        };

        let loader = &self.logical.swapchain_loader;
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(vk_err("swapchain"))?;

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { loader.destroy_swapchain(self.swapchain, None) };
        }
        self.swapchain = swapchain;

        let images = unsafe { loader.get_swapchain_images(swapchain) }
            .map_err(vk_err("swapchain images"))?;

        let format = convert::texture_format(surface_format.format)
            .ok_or_else(|| RenderError::creation_failed("swapchain", "unsupported surface format"))?;

        log::debug!(
            "Created swapchain: {} images, {:?}, {:?}",
            images.len(),
            surface_format.format,
            present_mode
        );

        Ok(SwapchainImages {
            images: images
                .into_iter()
                .map(|image| ImageHandle::from_raw(convert::raw(image)))
                .collect(),
            format,
            extent: request.extent,
        })
    }

    fn destroy_swapchain(&mut self) {
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.logical
                    .swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            self.swapchain = vk::SwapchainKHR::null();
        }
    }

    fn acquire_next_image(
        &mut self,
        signal: SemaphoreHandle,
        timeout: Duration,
    ) -> RenderResult<AcquiredImage> {
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let result = unsafe {
            self.logical.swapchain_loader.acquire_next_image(
                self.swapchain,
                nanos,
                vk_handle(signal.as_raw()),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquiredImage { index, suboptimal }),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Err(RenderError::Timeout {
                what: "swapchain image",
                waited: timeout,
            }),
            Err(err) => Err(vk_error("swapchain acquire", err)),
        }
    }

    fn present(&mut self, image_index: u32, wait: SemaphoreHandle) -> RenderResult<PresentStatus> {
        let wait_semaphores = [vk_handle::<vk::Semaphore>(wait.as_raw())];
        let swapchains = [self.swapchain];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let loader = &self.logical.swapchain_loader;
        let result = self
            .logical
            .with_queues(|_, present| unsafe { loader.queue_present(present, &present_info) });

        match result {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(err) => Err(vk_error("present", err)),
        }
    }
}

impl Drop for VulkanPresenter {
    fn drop(&mut self) {
        self.destroy_swapchain();
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
