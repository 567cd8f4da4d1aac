//! Image-derived render targets
//!
//! RAII wrappers for everything that depends on presentable image dimensions:
//! image views, depth targets, framebuffers, and the render pass they are
//! compatible with.

use crate::render::api::{
    AllocatedImage, Extent2D, FramebufferHandle, ImageAspect, ImageHandle, ImageViewHandle,
    RenderPassHandle, SharedDevice, TextureFormat,
};
use crate::render::error::RenderResult;

/// Image view wrapper with RAII cleanup
pub struct ImageView {
    device: SharedDevice,
    view: ImageViewHandle,
}

impl ImageView {
    /// Create a view over `image`
    pub fn new(
        device: SharedDevice,
        image: ImageHandle,
        format: TextureFormat,
        aspect: ImageAspect,
    ) -> RenderResult<Self> {
        let view = device.create_image_view(image, format, aspect)?;
        Ok(Self { device, view })
    }

    /// Get the view handle
    pub const fn handle(&self) -> ImageViewHandle {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.view);
    }
}

/// Device-local depth image with its memory
struct DepthImage {
    device: SharedDevice,
    image: AllocatedImage,
}

impl Drop for DepthImage {
    fn drop(&mut self) {
        self.device.destroy_depth_image(self.image);
    }
}

/// Depth buffer wrapper with RAII cleanup
pub struct DepthBuffer {
    // Field order is drop order: the view goes before the image it covers.
    view: ImageView,
    image: DepthImage,
}

impl DepthBuffer {
    /// Create a depth image and its view
    pub fn new(device: SharedDevice, extent: Extent2D, format: TextureFormat) -> RenderResult<Self> {
        let image = DepthImage {
            image: device.create_depth_image(extent, format)?,
            device: device.clone(),
        };
        let view = ImageView::new(device, image.image.image, format, ImageAspect::Depth)?;

        Ok(Self { view, image })
    }

    /// Get the image view handle
    pub const fn image_view(&self) -> ImageViewHandle {
        self.view.handle()
    }

    /// Get the image handle
    pub const fn image(&self) -> ImageHandle {
        self.image.image.image
    }
}

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: SharedDevice,
    framebuffer: FramebufferHandle,
}

impl Framebuffer {
    /// Create a new framebuffer
    pub fn new(
        device: SharedDevice,
        render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        extent: Extent2D,
    ) -> RenderResult<Self> {
        let framebuffer = device.create_framebuffer(render_pass, attachments, extent)?;
        Ok(Self { device, framebuffer })
    }

    /// Get the framebuffer handle
    pub const fn handle(&self) -> FramebufferHandle {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.device.destroy_framebuffer(self.framebuffer);
    }
}

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: SharedDevice,
    render_pass: RenderPassHandle,
    color_format: TextureFormat,
    depth_format: Option<TextureFormat>,
}

impl RenderPass {
    /// Create a clear-and-present render pass for the given attachment formats
    pub fn new(
        device: SharedDevice,
        color_format: TextureFormat,
        depth_format: Option<TextureFormat>,
    ) -> RenderResult<Self> {
        let render_pass = device.create_render_pass(color_format, depth_format)?;
        Ok(Self {
            device,
            render_pass,
            color_format,
            depth_format,
        })
    }

    /// Get the render pass handle
    pub const fn handle(&self) -> RenderPassHandle {
        self.render_pass
    }

    /// Color attachment format
    pub const fn color_format(&self) -> TextureFormat {
        self.color_format
    }

    /// Depth attachment format, if any
    pub const fn depth_format(&self) -> Option<TextureFormat> {
        self.depth_format
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.device.destroy_render_pass(self.render_pass);
    }
}
