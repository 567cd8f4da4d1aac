//! Swapchain lifecycle
//!
//! [`SwapchainLifecycle`] owns the presentation surface collaborator and the
//! [`PresentableImageSet`] derived from it. It never touches the frame ring:
//! a rebuild drains the device, drops every image-derived resource and
//! recreates the set at the surface's current extent.

use std::time::Duration;

use crate::core::config::SwapchainConfig;
use crate::render::api::{
    AcquiredImage, Extent2D, FramebufferHandle, ImageAspect, ImageHandle, ImageViewHandle,
    PresentStatus, PresentationSurface, RenderPassHandle, SemaphoreHandle, SharedDevice,
    SwapchainImages, SwapchainRequest, TextureFormat, WindowSurface,
};
use crate::render::error::{RenderError, RenderResult};
use crate::render::framebuffer::{DepthBuffer, Framebuffer, ImageView, RenderPass};

/// Presentable images plus everything derived from their dimensions
pub struct PresentableImageSet {
    // Field order is drop order: framebuffers reference views and depth targets.
    framebuffers: Vec<Framebuffer>,
    depth_buffers: Vec<DepthBuffer>,
    views: Vec<ImageView>,
    images: Vec<ImageHandle>,
    format: TextureFormat,
    extent: Extent2D,
}

impl PresentableImageSet {
    fn new(
        device: &SharedDevice,
        created: SwapchainImages,
        depth_format: Option<TextureFormat>,
        render_pass: Option<RenderPassHandle>,
    ) -> RenderResult<Self> {
        let views = created
            .images
            .iter()
            .map(|&image| ImageView::new(device.clone(), image, created.format, ImageAspect::Color))
            .collect::<RenderResult<Vec<_>>>()?;

        let depth_buffers = match depth_format {
            Some(format) => created
                .images
                .iter()
                .map(|_| DepthBuffer::new(device.clone(), created.extent, format))
                .collect::<RenderResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let mut set = Self {
            framebuffers: Vec::new(),
            depth_buffers,
            views,
            images: created.images,
            format: created.format,
            extent: created.extent,
        };

        if let Some(render_pass) = render_pass {
            set.create_framebuffers(device, render_pass)?;
        }

        Ok(set)
    }

    fn create_framebuffers(
        &mut self,
        device: &SharedDevice,
        render_pass: RenderPassHandle,
    ) -> RenderResult<()> {
        self.framebuffers.clear();

        for (index, view) in self.views.iter().enumerate() {
            let mut attachments = vec![view.handle()];
            if let Some(depth) = self.depth_buffers.get(index) {
                attachments.push(depth.image_view());
            }

            let framebuffer =
                Framebuffer::new(device.clone(), render_pass, &attachments, self.extent)?;
            self.framebuffers.push(framebuffer);
        }

        log::debug!("Created {} framebuffers", self.framebuffers.len());
        Ok(())
    }

    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Presentable image by index
    pub fn image(&self, index: u32) -> Option<ImageHandle> {
        self.images.get(index as usize).copied()
    }

    /// Color view of the image at `index`
    pub fn view(&self, index: u32) -> Option<ImageViewHandle> {
        self.views.get(index as usize).map(ImageView::handle)
    }

    /// Depth view paired with the image at `index`
    pub fn depth_view(&self, index: u32) -> Option<ImageViewHandle> {
        self.depth_buffers.get(index as usize).map(DepthBuffer::image_view)
    }

    /// Framebuffer for the image at `index`, once a render pass is attached
    pub fn framebuffer(&self, index: u32) -> Option<FramebufferHandle> {
        self.framebuffers.get(index as usize).map(Framebuffer::handle)
    }

    /// Image format
    pub const fn format(&self) -> TextureFormat {
        self.format
    }

    /// Image extent
    pub const fn extent(&self) -> Extent2D {
        self.extent
    }
}

/// Owner of the presentation surface and its presentable images
pub struct SwapchainLifecycle {
    // Field order is drop order: image-derived resources, then the render
    // pass, then the surface collaborator.
    images: Option<PresentableImageSet>,
    render_pass: Option<RenderPass>,
    surface: Box<dyn PresentationSurface>,
    device: SharedDevice,
    config: SwapchainConfig,
    stale: bool,
    rebuilds: u64,
}

impl SwapchainLifecycle {
    /// Wrap a surface; no images exist until the first [`rebuild`](Self::rebuild)
    pub fn new(
        device: SharedDevice,
        surface: Box<dyn PresentationSurface>,
        config: SwapchainConfig,
    ) -> Self {
        Self {
            images: None,
            render_pass: None,
            surface,
            device,
            config,
            stale: true,
            rebuilds: 0,
        }
    }

    /// Recreate the presentable image set for the window's current size
    ///
    /// While the extent the swapchain would be created at is zero (the window
    /// or its surface is minimized) this blocks on window events. It then
    /// drains the device, destroys views, depth targets and framebuffers, and
    /// recreates everything at the new extent.
    pub fn rebuild(&mut self, window: &mut dyn WindowSurface) -> RenderResult<()> {
        let mut window_extent = window.framebuffer_extent();
        let mut capabilities = self.surface.capabilities()?;
        while window_extent.is_zero() || capabilities.choose_extent(window_extent).is_zero() {
            log::debug!("Window minimized, waiting for events before rebuilding swapchain");
            window.wait_events();
            window_extent = window.framebuffer_extent();
            capabilities = self.surface.capabilities()?;
        }
        let extent = capabilities.choose_extent(window_extent);

        self.device.wait_idle()?;
        self.images = None;

        let request = SwapchainRequest {
            extent,
            image_count: capabilities.preferred_image_count(self.config.extra_images),
            format: self.config.color_format,
            present_mode: self.config.present_mode,
        };

        let created = self.surface.create_swapchain(&request)?;
        let render_pass = self.render_pass.as_ref().map(RenderPass::handle);
        let images =
            PresentableImageSet::new(&self.device, created, self.config.depth_format, render_pass)?;

        log::info!(
            "Swapchain rebuilt: {} images at {}x{}",
            images.image_count(),
            images.extent().width,
            images.extent().height
        );

        self.images = Some(images);
        self.stale = false;
        self.rebuilds += 1;
        Ok(())
    }

    /// Create a clear-and-present render pass and framebuffers for every image
    ///
    /// The render pass survives rebuilds; framebuffers are recreated with the
    /// image set.
    pub fn attach_render_pass(&mut self) -> RenderResult<RenderPassHandle> {
        let color_format = self
            .images
            .as_ref()
            .map_or(self.config.color_format, PresentableImageSet::format);

        let render_pass = RenderPass::new(self.device.clone(), color_format, self.config.depth_format)?;
        let handle = render_pass.handle();

        if let Some(images) = self.images.as_mut() {
            images.create_framebuffers(&self.device, handle)?;
        }

        self.render_pass = Some(render_pass);
        Ok(handle)
    }

    /// Acquire the next presentable image, signaling `signal` when it is ready
    ///
    /// A stale surface or a missing image set is reported as
    /// [`RenderError::SurfaceStale`]. A suboptimal acquire succeeds but marks
    /// the lifecycle stale.
    pub fn acquire(
        &mut self,
        signal: SemaphoreHandle,
        timeout: Duration,
    ) -> RenderResult<AcquiredImage> {
        let Some(image_count) = self.images.as_ref().map(PresentableImageSet::image_count) else {
            return Err(RenderError::SurfaceStale);
        };

        if self.stale {
            return Err(RenderError::SurfaceStale);
        }

        match self.surface.acquire_next_image(signal, timeout) {
            Ok(acquired) => {
                if acquired.index as usize >= image_count {
                    log::error!(
                        "Surface returned image {} but the swapchain has {image_count}; \
                         the image-available semaphore stays signaled",
                        acquired.index
                    );
                    return Err(RenderError::Validation(format!(
                        "Acquired image {} of a {image_count}-image swapchain",
                        acquired.index
                    )));
                }
                if acquired.suboptimal {
                    log::warn!("Acquired image from suboptimal swapchain");
                    self.stale = true;
                }
                Ok(acquired)
            }
            Err(err) => {
                if matches!(err, RenderError::SurfaceStale) {
                    log::warn!("Swapchain out of date on acquire");
                    self.stale = true;
                }
                Err(err)
            }
        }
    }

    /// Present `image_index` once `wait` is signaled
    ///
    /// Returns [`PresentStatus::Suboptimal`] when the image was presented but
    /// the lifecycle is now stale.
    pub fn present(&mut self, image_index: u32, wait: SemaphoreHandle) -> RenderResult<PresentStatus> {
        match self.surface.present(image_index, wait) {
            Ok(PresentStatus::Optimal) if !self.stale => Ok(PresentStatus::Optimal),
            Ok(_) => {
                log::warn!("Swapchain suboptimal on present");
                self.stale = true;
                Ok(PresentStatus::Suboptimal)
            }
            Err(err) => {
                if matches!(err, RenderError::SurfaceStale) {
                    log::warn!("Swapchain out of date on present");
                    self.stale = true;
                }
                Err(err)
            }
        }
    }

    /// Flag the image set for a rebuild (e.g. on a resize notification)
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Whether a rebuild is required before the next frame
    pub const fn is_stale(&self) -> bool {
        self.stale
    }

    /// Mark stale when the window size no longer matches the image set
    ///
    /// Returns whether the lifecycle is stale afterwards.
    pub fn check_extent(&mut self, window: &dyn WindowSurface) -> bool {
        let window_extent = window.framebuffer_extent();
        if let Some(images) = &self.images {
            if images.extent() != window_extent {
                log::debug!(
                    "Window is {}x{}, swapchain is {}x{}",
                    window_extent.width,
                    window_extent.height,
                    images.extent().width,
                    images.extent().height
                );
                self.stale = true;
            }
        }
        self.stale
    }

    /// Current image set, if built
    pub const fn images(&self) -> Option<&PresentableImageSet> {
        self.images.as_ref()
    }

    /// Number of presentable images, zero before the first rebuild
    pub fn image_count(&self) -> usize {
        self.images.as_ref().map_or(0, PresentableImageSet::image_count)
    }

    /// Current image extent
    pub fn extent(&self) -> Option<Extent2D> {
        self.images.as_ref().map(PresentableImageSet::extent)
    }

    /// Framebuffer for `image_index`, when a render pass is attached
    pub fn framebuffer(&self, image_index: u32) -> Option<FramebufferHandle> {
        self.images.as_ref().and_then(|images| images.framebuffer(image_index))
    }

    /// Attached render pass
    pub fn render_pass(&self) -> Option<RenderPassHandle> {
        self.render_pass.as_ref().map(RenderPass::handle)
    }

    /// Completed rebuilds
    pub const fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}

impl Drop for SwapchainLifecycle {
    fn drop(&mut self) {
        self.images = None;
        self.render_pass = None;
        self.surface.destroy_swapchain();
    }
}
