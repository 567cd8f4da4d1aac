//! Render session
//!
//! A [`RenderSession`] pairs one [`FramePipeline`] with one
//! [`SwapchainLifecycle`] and runs whole frames with local recovery from stale
//! surfaces. It also owns a session-wide [`DescriptorAllocator`] sized by
//! `EngineConfig::descriptors` for sets that outlive a single frame.
//! Dropping it quiesces the GPU, then destroys the frame ring and the shared
//! descriptor pools, then the image-derived resources; the device and surface
//! collaborators go last.

use crate::config::ConfigError;
use crate::core::config::EngineConfig;
use crate::render::api::{
    Extent2D, FramebufferHandle, PresentationSurface, RenderPassHandle, SharedDevice,
    WindowSurface,
};
use crate::render::descriptors::DescriptorAllocator;
use crate::render::error::{RenderError, RenderResult};
use crate::render::frame::{FramePipeline, FrameStats, FrameToken};
use crate::render::swapchain::SwapchainLifecycle;

/// What [`RenderSession::draw_frame`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and presented
    Presented {
        /// Presentable image that was drawn
        image_index: u32,
        /// Frame generation
        generation: u64,
    },
    /// The surface was stale; the swapchain was rebuilt instead
    SwapchainRebuilt,
}

/// The frame being recorded, as seen by a [`RenderSession::draw_frame`] closure
pub struct ActiveFrame<'a> {
    token: FrameToken,
    descriptors: &'a mut DescriptorAllocator,
    shared_descriptors: &'a mut DescriptorAllocator,
    device: &'a SharedDevice,
    framebuffer: Option<FramebufferHandle>,
    render_pass: Option<RenderPassHandle>,
    extent: Extent2D,
}

impl ActiveFrame<'_> {
    /// Slot, image index, generation and command buffer of this frame
    pub const fn token(&self) -> &FrameToken {
        &self.token
    }

    /// Frame-local descriptor sets; cleared when this ring slot is reused
    pub fn descriptors(&mut self) -> &mut DescriptorAllocator {
        self.descriptors
    }

    /// Session-wide descriptor sets, marked as referenced by this frame
    pub fn shared_descriptors(&mut self) -> &mut DescriptorAllocator {
        self.shared_descriptors.mark_in_use(self.token.generation());
        self.shared_descriptors
    }

    /// Device to record against
    pub const fn device(&self) -> &SharedDevice {
        self.device
    }

    /// Framebuffer of the acquired image, when a render pass is attached
    pub const fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    /// Attached render pass
    pub const fn render_pass(&self) -> Option<RenderPassHandle> {
        self.render_pass
    }

    /// Extent of the acquired image
    pub const fn extent(&self) -> Extent2D {
        self.extent
    }
}

/// One frame pipeline and one swapchain lifecycle
pub struct RenderSession {
    // Field order is drop order.
    pipeline: FramePipeline,
    descriptors: DescriptorAllocator,
    swapchain: SwapchainLifecycle,
    device: SharedDevice,
}

impl RenderSession {
    /// Create the frame ring and build the first swapchain
    pub fn new(
        device: SharedDevice,
        surface: Box<dyn PresentationSurface>,
        window: &mut dyn WindowSurface,
        config: &EngineConfig,
    ) -> RenderResult<Self> {
        config.validate().map_err(ConfigError::Invalid)?;

        let pipeline = FramePipeline::new(device.clone(), &config.pipeline)?;
        let descriptors = DescriptorAllocator::new(device.clone(), config.descriptors.clone())?;
        let mut swapchain = SwapchainLifecycle::new(device.clone(), surface, config.swapchain.clone());
        swapchain.rebuild(window)?;

        Ok(Self {
            pipeline,
            descriptors,
            swapchain,
            device,
        })
    }

    /// Run one frame: begin, `record`, end
    ///
    /// A stale surface reported by either end of the frame is handled here by
    /// rebuilding the swapchain; it never reaches the caller. An error from
    /// `record` is returned after the frame has been submitted so the ring
    /// stays consistent.
    pub fn draw_frame<F>(&mut self, window: &mut dyn WindowSurface, record: F) -> RenderResult<FrameOutcome>
    where
        F: FnOnce(&mut ActiveFrame<'_>) -> RenderResult<()>,
    {
        if self.swapchain.is_stale() {
            self.swapchain.rebuild(window)?;
        }

        let token = match self.pipeline.begin_frame(&mut self.swapchain) {
            Ok(token) => token,
            Err(RenderError::SurfaceStale) => {
                self.swapchain.rebuild(window)?;
                return Ok(FrameOutcome::SwapchainRebuilt);
            }
            Err(err) => return Err(err),
        };

        // Sets allocated earlier may be bound by this frame without going
        // through the frame accessor.
        if self.descriptors.stats().sets_allocated > 0 {
            self.descriptors.mark_in_use(token.generation());
        }

        let extent = self.swapchain.extent().unwrap_or_default();
        let framebuffer = self.swapchain.framebuffer(token.image_index());
        let render_pass = self.swapchain.render_pass();
        let recorded = {
            let mut frame = ActiveFrame {
                token,
                descriptors: self.pipeline.frame_descriptors(&token)?,
                shared_descriptors: &mut self.descriptors,
                device: &self.device,
                framebuffer,
                render_pass,
                extent,
            };
            record(&mut frame)
        };

        let ended = self.pipeline.end_frame(token, &mut self.swapchain);
        recorded?;

        match ended {
            Ok(()) => Ok(FrameOutcome::Presented {
                image_index: token.image_index(),
                generation: token.generation(),
            }),
            Err(RenderError::SurfaceStale) => {
                self.swapchain.rebuild(window)?;
                Ok(FrameOutcome::SwapchainRebuilt)
            }
            Err(err) => Err(err),
        }
    }

    /// Note a window resize; the swapchain is rebuilt before the next frame
    pub fn handle_resize(&mut self) {
        self.swapchain.mark_stale();
    }

    /// Block until the device is idle
    pub fn wait_idle(&mut self) -> RenderResult<()> {
        self.pipeline.wait_idle()
    }

    /// Session-wide descriptor allocator
    pub const fn descriptors(&self) -> &DescriptorAllocator {
        &self.descriptors
    }

    /// Session-wide descriptor allocator, for allocations outside a frame
    pub fn descriptors_mut(&mut self) -> &mut DescriptorAllocator {
        &mut self.descriptors
    }

    /// Release every session-wide descriptor set
    ///
    /// Fails with [`RenderError::PoolInUse`] while a frame that referenced
    /// them is still executing; [`wait_idle`](Self::wait_idle) first to force it.
    pub fn clear_shared_descriptors(&mut self) -> RenderResult<()> {
        let completed = self.pipeline.refresh_completed()?;
        self.descriptors.clear_pools(completed)
    }

    /// Frame pipeline
    pub const fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    /// Frame pipeline
    pub fn pipeline_mut(&mut self) -> &mut FramePipeline {
        &mut self.pipeline
    }

    /// Swapchain lifecycle
    pub const fn swapchain(&self) -> &SwapchainLifecycle {
        &self.swapchain
    }

    /// Swapchain lifecycle
    pub fn swapchain_mut(&mut self) -> &mut SwapchainLifecycle {
        &mut self.swapchain
    }

    /// Device the session renders with
    pub const fn device(&self) -> &SharedDevice {
        &self.device
    }

    /// Pipeline counters
    pub const fn stats(&self) -> FrameStats {
        self.pipeline.stats()
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if let Err(err) = self.pipeline.wait_idle() {
            log::error!("Failed to quiesce GPU during session teardown: {err}");
        }
    }
}
