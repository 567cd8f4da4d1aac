//! Synchronization primitives and command pools
//!
//! RAII wrappers over device semaphores, fences and command pools. Each
//! wrapper holds a clone of the shared device and destroys its object on drop.

use std::time::Duration;

use crate::render::api::{
    CommandBufferHandle, CommandPoolHandle, FenceHandle, SemaphoreHandle, SharedDevice,
};
use crate::render::error::RenderResult;

/// GPU-GPU synchronization primitive
///
/// Signaled by one queue operation and waited on by another:
/// - Image acquisition signals, rendering waits
/// - Rendering signals, presentation waits
pub struct Semaphore {
    device: SharedDevice,
    semaphore: SemaphoreHandle,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: SharedDevice) -> RenderResult<Self> {
        let semaphore = device.create_semaphore()?;
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub const fn handle(&self) -> SemaphoreHandle {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
    }
}

/// CPU-GPU synchronization primitive
pub struct Fence {
    device: SharedDevice,
    fence: FenceHandle,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: SharedDevice, signaled: bool) -> RenderResult<Self> {
        let fence = device.create_fence(signaled)?;
        Ok(Self { device, fence })
    }

    /// Wait for fence
    pub fn wait(&self, timeout: Duration) -> RenderResult<()> {
        self.device.wait_for_fence(self.fence, timeout)
    }

    /// Whether the fence is already signaled
    pub fn is_signaled(&self) -> RenderResult<bool> {
        self.device.fence_signaled(self.fence)
    }

    /// Reset fence
    pub fn reset(&self) -> RenderResult<()> {
        self.device.reset_fence(self.fence)
    }

    /// Get the fence handle
    pub const fn handle(&self) -> FenceHandle {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
    }
}

/// Command pool whose buffers can be reset individually
///
/// Destroying the pool frees every buffer allocated from it.
pub struct CommandPool {
    device: SharedDevice,
    pool: CommandPoolHandle,
}

impl CommandPool {
    /// Create a new command pool
    pub fn new(device: SharedDevice) -> RenderResult<Self> {
        let pool = device.create_command_pool()?;
        Ok(Self { device, pool })
    }

    /// Allocate one primary command buffer
    pub fn allocate(&self) -> RenderResult<CommandBufferHandle> {
        self.device.allocate_command_buffer(self.pool)
    }

    /// Get the command pool handle
    pub const fn handle(&self) -> CommandPoolHandle {
        self.pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.pool);
    }
}

/// Frame synchronization objects for in-flight frame management
pub struct FrameSync {
    /// Signaled when the acquired image is ready for rendering
    pub image_available: Semaphore,
    /// Signaled when the frame's commands finish
    pub render_finished: Semaphore,
    /// Signaled when the frame's submission completes; created signaled
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects
    pub fn new(device: &SharedDevice) -> RenderResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device.clone(), true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}
