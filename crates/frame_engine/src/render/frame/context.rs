//! Per-slot frame resources

use crate::core::config::DescriptorPoolConfig;
use crate::render::api::{CommandBufferHandle, SharedDevice};
use crate::render::descriptors::DescriptorAllocator;
use crate::render::error::RenderResult;
use crate::render::sync::{CommandPool, FrameSync};

/// Lifecycle of one ring slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Free for the next frame
    Idle,
    /// Between a successful `begin_frame` and its `end_frame`
    Recording,
    /// Submitted; its fence has not been observed yet
    Submitted,
}

impl SlotState {
    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Submitted => "submitted",
        }
    }
}

/// One of the N ring slots
///
/// Owns the slot's command scope, its three synchronization signals and a
/// frame-local descriptor allocator that is cleared whenever the slot is
/// reused.
pub struct FrameContext {
    // Descriptor sets are released before the sync objects and command pool.
    descriptors: DescriptorAllocator,
    sync: FrameSync,
    command_buffer: CommandBufferHandle,
    command_pool: CommandPool,
    state: SlotState,
    last_generation: Option<u64>,
}

impl FrameContext {
    /// Create the resources of one slot
    pub fn new(device: &SharedDevice, descriptors: &DescriptorPoolConfig) -> RenderResult<Self> {
        let sync = FrameSync::new(device)?;
        let command_pool = CommandPool::new(device.clone())?;
        let command_buffer = command_pool.allocate()?;
        let descriptors = DescriptorAllocator::new(device.clone(), descriptors.clone())?;

        Ok(Self {
            descriptors,
            sync,
            command_buffer,
            command_pool,
            state: SlotState::Idle,
            last_generation: None,
        })
    }

    /// Synchronization signals of this slot
    pub const fn sync(&self) -> &FrameSync {
        &self.sync
    }

    /// The slot's command buffer
    pub const fn command_buffer(&self) -> CommandBufferHandle {
        self.command_buffer
    }

    /// The slot's command pool
    pub const fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Frame-local descriptor allocator
    pub fn descriptors_mut(&mut self) -> &mut DescriptorAllocator {
        &mut self.descriptors
    }

    /// Frame-local descriptor allocator
    pub const fn descriptors(&self) -> &DescriptorAllocator {
        &self.descriptors
    }

    /// Current slot state
    pub const fn state(&self) -> SlotState {
        self.state
    }

    /// Generation of the last frame submitted from this slot
    pub const fn last_generation(&self) -> Option<u64> {
        self.last_generation
    }

    pub(crate) fn set_state(&mut self, state: SlotState) {
        self.state = state;
    }

    pub(crate) fn record_submission(&mut self, generation: u64) {
        self.state = SlotState::Submitted;
        self.last_generation = Some(generation);
        self.descriptors.mark_in_use(generation);
    }
}
