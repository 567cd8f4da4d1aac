//! Frames-in-flight ring
//!
//! The pipeline cycles through N [`FrameContext`] slots. The only CPU-side
//! backpressure is the wait on a slot's "frame complete" fence in
//! [`FramePipeline::begin_frame`], so at most N frames are ever in flight.
//! Inside a frame, ordering is carried by semaphores: submission waits for the
//! acquired image, presentation waits for the submitted work.
//!
//! The ring index advances on every path out of a frame, including stale
//! surface reports, so a failed acquire never pins the CPU on one slot.

use std::time::Duration;

use crate::core::config::PipelineConfig;
use crate::config::ConfigError;
use crate::render::api::{CommandBufferHandle, PresentStatus, SharedDevice, SubmitInfo};
use crate::render::descriptors::DescriptorAllocator;
use crate::render::error::{RenderError, RenderResult};
use crate::render::frame::context::{FrameContext, SlotState};
use crate::render::swapchain::SwapchainLifecycle;

/// Ties a successful [`FramePipeline::begin_frame`] to its `end_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameToken {
    slot: usize,
    image_index: u32,
    generation: u64,
    command_buffer: CommandBufferHandle,
}

impl FrameToken {
    /// Ring slot the frame occupies
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Index of the acquired presentable image
    pub const fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Monotonic frame number, starting at 1
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Command buffer to record this frame's work into
    pub const fn command_buffer(&self) -> CommandBufferHandle {
        self.command_buffer
    }
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Frames that reached `Recording`
    pub frames_begun: u64,
    /// Queue submissions
    pub submits: u64,
    /// Presentation requests accepted by the surface
    pub presents: u64,
    /// `begin_frame` calls that found their fence unsignaled and had to block
    pub blocking_waits: u64,
    /// Stale or suboptimal surface reports from acquire or present
    pub stale_events: u64,
}

/// Owner of the frame ring
pub struct FramePipeline {
    frames: Vec<FrameContext>,
    device: SharedDevice,
    current: usize,
    next_generation: u64,
    completed_generation: u64,
    fence_timeout: Duration,
    acquire_timeout: Duration,
    stats: FrameStats,
}

impl FramePipeline {
    /// Create the ring of `config.frames_in_flight` slots
    ///
    /// Every slot fence starts signaled so the first N frames never block.
    pub fn new(device: SharedDevice, config: &PipelineConfig) -> RenderResult<Self> {
        config.validate().map_err(ConfigError::Invalid)?;

        let frames = (0..config.frames_in_flight)
            .map(|_| FrameContext::new(&device, &config.frame_descriptors))
            .collect::<RenderResult<Vec<_>>>()?;

        log::info!(
            "Frame pipeline created on {} with {} frames in flight",
            device.name(),
            frames.len()
        );

        Ok(Self {
            frames,
            device,
            current: 0,
            next_generation: 1,
            completed_generation: 0,
            fence_timeout: config.fence_timeout(),
            acquire_timeout: config.acquire_timeout(),
            stats: FrameStats::default(),
        })
    }

    /// Start a frame on the current slot
    ///
    /// Blocks until the slot's previous submission completed (bounded by the
    /// fence timeout), then acquires a presentable image. A stale surface is
    /// reported as [`RenderError::SurfaceStale`]; the slot fence stays
    /// signaled and the ring advances. On success the slot's command buffer
    /// is open for recording and its frame-local descriptors are cleared.
    pub fn begin_frame(&mut self, swapchain: &mut SwapchainLifecycle) -> RenderResult<FrameToken> {
        let slot = self.current;
        let frame = &mut self.frames[slot];

        if frame.state() == SlotState::Recording {
            return Err(RenderError::InvalidFrameState {
                slot,
                expected: "idle or submitted",
                actual: SlotState::Recording.name(),
            });
        }

        let fence = &frame.sync().in_flight;
        if !fence.is_signaled()? {
            self.stats.blocking_waits += 1;
            log::trace!("Frame slot {slot} waiting for GPU");
        }
        fence.wait(self.fence_timeout)?;

        if let Some(generation) = frame.last_generation() {
            self.completed_generation = self.completed_generation.max(generation);
        }
        frame.set_state(SlotState::Idle);

        let image_available = frame.sync().image_available.handle();
        let acquired = match swapchain.acquire(image_available, self.acquire_timeout) {
            Ok(acquired) => acquired,
            Err(err) => {
                if matches!(err, RenderError::SurfaceStale) {
                    self.stats.stale_events += 1;
                }
                self.advance();
                return Err(err);
            }
        };

        let command_buffer = frame.command_buffer();
        frame.sync().in_flight.reset()?;
        self.device.reset_command_buffer(command_buffer)?;
        self.device.begin_command_buffer(command_buffer)?;
        frame.descriptors_mut().clear_pools(self.completed_generation)?;
        frame.set_state(SlotState::Recording);

        let generation = self.next_generation;
        self.next_generation += 1;
        self.stats.frames_begun += 1;

        Ok(FrameToken {
            slot,
            image_index: acquired.index,
            generation,
            command_buffer,
        })
    }

    /// Submit and present the frame started by `token`
    ///
    /// Submission waits on "image available" and signals "work finished" plus
    /// the slot fence; presentation waits on "work finished". A stale or
    /// suboptimal surface is reported as [`RenderError::SurfaceStale`] after
    /// the work was submitted. The ring advances whatever the outcome.
    pub fn end_frame(
        &mut self,
        token: FrameToken,
        swapchain: &mut SwapchainLifecycle,
    ) -> RenderResult<()> {
        self.check_recording(&token)?;
        let result = self.submit_and_present(&token, swapchain);
        self.advance();
        result
    }

    /// Frame-local descriptor allocator of a frame being recorded
    pub fn frame_descriptors(&mut self, token: &FrameToken) -> RenderResult<&mut DescriptorAllocator> {
        self.check_recording(token)?;
        Ok(self.frames[token.slot].descriptors_mut())
    }

    /// Block until the device is idle and mark every submitted frame complete
    pub fn wait_idle(&mut self) -> RenderResult<()> {
        self.device.wait_idle()?;
        self.completed_generation = self.next_generation - 1;
        for frame in &mut self.frames {
            if frame.state() == SlotState::Submitted {
                frame.set_state(SlotState::Idle);
            }
        }
        Ok(())
    }

    /// Poll slot fences without blocking and return the newest completed generation
    pub fn refresh_completed(&mut self) -> RenderResult<u64> {
        for frame in &mut self.frames {
            if frame.state() != SlotState::Submitted {
                continue;
            }
            if frame.sync().in_flight.is_signaled()? {
                if let Some(generation) = frame.last_generation() {
                    self.completed_generation = self.completed_generation.max(generation);
                }
                frame.set_state(SlotState::Idle);
            }
        }
        Ok(self.completed_generation)
    }

    /// Newest frame generation known to have completed on the GPU
    pub const fn completed_generation(&self) -> u64 {
        self.completed_generation
    }

    /// Generation the next successful `begin_frame` will hand out
    pub const fn next_generation(&self) -> u64 {
        self.next_generation
    }

    /// Slot the next `begin_frame` will use
    pub const fn current_slot(&self) -> usize {
        self.current
    }

    /// Ring size N
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Ring slot by index
    pub fn frame(&self, slot: usize) -> Option<&FrameContext> {
        self.frames.get(slot)
    }

    /// Pipeline counters
    pub const fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Device the ring was created on
    pub const fn device(&self) -> &SharedDevice {
        &self.device
    }

    fn check_recording(&self, token: &FrameToken) -> RenderResult<()> {
        let state = self
            .frames
            .get(token.slot)
            .map_or(SlotState::Idle, FrameContext::state);

        if token.slot != self.current || state != SlotState::Recording {
            return Err(RenderError::InvalidFrameState {
                slot: token.slot,
                expected: SlotState::Recording.name(),
                actual: state.name(),
            });
        }
        Ok(())
    }

    fn submit_and_present(
        &mut self,
        token: &FrameToken,
        swapchain: &mut SwapchainLifecycle,
    ) -> RenderResult<()> {
        let frame = &mut self.frames[token.slot];
        let image_available = frame.sync().image_available.handle();
        let render_finished = frame.sync().render_finished.handle();

        self.device.end_command_buffer(token.command_buffer)?;
        self.device.submit(&SubmitInfo {
            command_buffer: token.command_buffer,
            wait_semaphore: Some(image_available),
            signal_semaphore: Some(render_finished),
            fence: Some(frame.sync().in_flight.handle()),
        })?;
        frame.record_submission(token.generation);
        self.stats.submits += 1;

        match swapchain.present(token.image_index, render_finished) {
            Ok(PresentStatus::Optimal) => {
                self.stats.presents += 1;
                Ok(())
            }
            Ok(PresentStatus::Suboptimal) => {
                self.stats.presents += 1;
                self.stats.stale_events += 1;
                Err(RenderError::SurfaceStale)
            }
            Err(err) => {
                if matches!(err, RenderError::SurfaceStale) {
                    self.stats.stale_events += 1;
                }
                Err(err)
            }
        }
    }

    fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames.len();
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Failed to drain GPU before destroying frame ring: {err}");
        }
    }
}
