//! Presentation and window collaborator boundaries

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::handles::{ImageHandle, SemaphoreHandle};
use crate::render::error::RenderResult;

/// 2D extent in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Extent2D {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Extent2D {
    /// Create a new extent
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero (minimized window)
    pub const fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clamp each dimension into `[min, max]`
    pub fn clamp(self, min: Self, max: Self) -> Self {
        Self {
            width: self.width.clamp(min.width, max.width.max(min.width)),
            height: self.height.clamp(min.height, max.height.max(min.height)),
        }
    }
}

/// Image formats used by presentable images and depth targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 8-bit BGRA, sRGB encoded
    Bgra8Srgb,
    /// 8-bit BGRA, linear
    Bgra8Unorm,
    /// 8-bit RGBA, sRGB encoded
    Rgba8Srgb,
    /// 8-bit RGBA, linear
    Rgba8Unorm,
    /// 32-bit float depth
    D32Float,
    /// 24-bit depth with 8-bit stencil
    D24UnormS8,
}

impl TextureFormat {
    /// Whether the format carries depth
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::D32Float | Self::D24UnormS8)
    }
}

/// Presentation scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresentMode {
    /// Vsync queue; always supported
    Fifo,
    /// Vsync with replacement of queued images
    Mailbox,
    /// No vsync
    Immediate,
}

/// Surface limits reported by the presentation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    /// Minimum presentable images
    pub min_image_count: u32,
    /// Maximum presentable images; zero means unbounded
    pub max_image_count: u32,
    /// Extent the surface dictates; `None` when the swapchain picks it
    pub current_extent: Option<Extent2D>,
    /// Smallest allowed extent
    pub min_extent: Extent2D,
    /// Largest allowed extent
    pub max_extent: Extent2D,
}

impl SurfaceCapabilities {
    /// Image count to request: one above the minimum, capped by the maximum
    pub fn preferred_image_count(&self, extra: u32) -> u32 {
        let desired = self.min_image_count.saturating_add(extra).max(1);
        if self.max_image_count > 0 {
            desired.min(self.max_image_count)
        } else {
            desired
        }
    }

    /// Extent to create the swapchain at for the given window extent
    pub fn choose_extent(&self, window: Extent2D) -> Extent2D {
        self.current_extent
            .unwrap_or_else(|| window.clamp(self.min_extent, self.max_extent))
    }
}

/// Parameters of a swapchain (re)creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainRequest {
    /// Image extent
    pub extent: Extent2D,
    /// Presentable image count
    pub image_count: u32,
    /// Preferred color format
    pub format: TextureFormat,
    /// Preferred present mode
    pub present_mode: PresentMode,
}

/// What a swapchain (re)creation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainImages {
    /// Presentable images in index order
    pub images: Vec<ImageHandle>,
    /// Format actually chosen
    pub format: TextureFormat,
    /// Extent actually chosen
    pub extent: Extent2D,
}

/// A successfully acquired presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index into the presentable image set
    pub index: u32,
    /// Usable this frame, but the swapchain should be rebuilt soon
    pub suboptimal: bool,
}

/// Outcome of a successful present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// Surface and swapchain still match
    Optimal,
    /// Presented, but the swapchain no longer matches the surface
    Suboptimal,
}

/// Presentation engine collaborator
///
/// An out-of-date surface is reported as
/// [`RenderError::SurfaceStale`](crate::render::error::RenderError::SurfaceStale).
pub trait PresentationSurface: Send {
    /// Current surface limits
    fn capabilities(&self) -> RenderResult<SurfaceCapabilities>;
    /// Create the swapchain, retiring and destroying any previous one
    fn create_swapchain(&mut self, request: &SwapchainRequest) -> RenderResult<SwapchainImages>;
    /// Destroy the swapchain if one exists
    fn destroy_swapchain(&mut self);
    /// Acquire the next presentable image, signaling `signal` when it is ready
    fn acquire_next_image(
        &mut self,
        signal: SemaphoreHandle,
        timeout: Duration,
    ) -> RenderResult<AcquiredImage>;
    /// Queue `image_index` for presentation once `wait` is signaled
    fn present(&mut self, image_index: u32, wait: SemaphoreHandle) -> RenderResult<PresentStatus>;
}

/// Window collaborator
pub trait WindowSurface {
    /// Drawable size in pixels; zero while minimized
    fn framebuffer_extent(&self) -> Extent2D;
    /// Block until at least one window event arrives
    fn wait_events(&mut self);
}
