//! Growable descriptor pool allocator
//!
//! Sets are drawn from a list of sub-pools. Sub-pools with spare capacity sit
//! in `ready_pools`; a sub-pool that reports exhaustion moves to `full_pools`
//! and the allocation is retried on another one, up to the configured retry
//! bound. Every new sub-pool doubles the set count of the previous one until
//! the `max_sets_per_pool` threshold.
//!
//! Clearing resets every sub-pool at once and invalidates every set handed out
//! since the last clear. The allocator tracks the newest frame generation that
//! referenced its sets and refuses to clear until that generation completed.

use crate::core::config::DescriptorPoolConfig;
use crate::config::ConfigError;
use crate::foundation::collections::GrowableBuffer;
use crate::render::api::{
    DescriptorPoolHandle, DescriptorSetHandle, PoolSize, SetAllocation, SharedDevice,
};
use crate::render::descriptors::layout::DescriptorSetLayout;
use crate::render::error::{ErrorKind, RenderError, RenderResult};

/// Allocator counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocatorStats {
    /// Sub-pools owned
    pub pool_count: usize,
    /// Sub-pools with spare capacity
    pub ready_count: usize,
    /// Sub-pools exhausted since the last clear
    pub full_count: usize,
    /// Sets handed out since the last clear
    pub sets_allocated: u64,
}

/// Descriptor set allocator over a growing list of sub-pools
pub struct DescriptorAllocator {
    device: SharedDevice,
    config: DescriptorPoolConfig,
    ready_pools: GrowableBuffer<DescriptorPoolHandle>,
    full_pools: GrowableBuffer<DescriptorPoolHandle>,
    next_pool_sets: u32,
    sets_allocated: u64,
    in_use_generation: Option<u64>,
}

impl DescriptorAllocator {
    /// Create an allocator and its first sub-pool
    pub fn new(device: SharedDevice, config: DescriptorPoolConfig) -> RenderResult<Self> {
        config.validate().map_err(ConfigError::Invalid)?;

        let mut allocator = Self {
            device,
            next_pool_sets: config.initial_sets,
            config,
            ready_pools: GrowableBuffer::try_new()?,
            full_pools: GrowableBuffer::try_new()?,
            sets_allocated: 0,
            in_use_generation: None,
        };

        let pool = allocator.create_pool()?;
        allocator.park(pool, false)?;
        Ok(allocator)
    }

    /// Allocate one set for `layout`
    ///
    /// Tries at most `1 + max_allocation_retries` sub-pools. Sub-pools that
    /// report exhaustion are never offered again before the next clear.
    pub fn allocate(&mut self, layout: &DescriptorSetLayout) -> RenderResult<DescriptorSetHandle> {
        let mut pool = self.take_ready_pool()?;
        let mut attempts = 1;

        loop {
            match self.device.allocate_descriptor_set(pool, layout.handle()) {
                Ok(SetAllocation::Allocated(set)) => {
                    self.park(pool, false)?;
                    self.sets_allocated += 1;
                    return Ok(set);
                }
                Ok(SetAllocation::PoolExhausted) => {
                    self.park(pool, true)?;

                    if attempts > self.config.max_allocation_retries {
                        log::warn!("Descriptor allocation failed after {attempts} sub-pools");
                        return Err(RenderError::DescriptorPoolExhausted { attempts });
                    }

                    log::trace!("Descriptor sub-pool {pool:?} exhausted, retrying");
                    pool = self.take_ready_pool()?;
                    attempts += 1;
                }
                Err(err) => {
                    self.park(pool, false)?;
                    return Err(err);
                }
            }
        }
    }

    /// Record that sets from this allocator are referenced by frame `generation`
    pub fn mark_in_use(&mut self, generation: u64) {
        self.in_use_generation = Some(self.in_use_generation.map_or(generation, |g| g.max(generation)));
    }

    /// Reset every sub-pool and make all of them ready again
    ///
    /// Fails with [`RenderError::PoolInUse`] if a frame newer than
    /// `completed_generation` was marked as using these sets.
    pub fn clear_pools(&mut self, completed_generation: u64) -> RenderResult<()> {
        if let Some(pending) = self.in_use_generation {
            if pending > completed_generation {
                return Err(RenderError::PoolInUse {
                    pending,
                    completed: completed_generation,
                });
            }
        }

        for pool in self.ready_pools.iter().chain(self.full_pools.iter()) {
            self.device.reset_descriptor_pool(*pool)?;
        }

        let full: Vec<_> = self.full_pools.drain_all().collect();
        self.ready_pools.append(&full)?;

        self.sets_allocated = 0;
        self.in_use_generation = None;
        Ok(())
    }

    /// Destroy every sub-pool
    ///
    /// The allocator stays usable; the next allocation creates a new sub-pool.
    pub fn destroy(&mut self) {
        for pool in self.ready_pools.drain_all().chain(self.full_pools.drain_all()) {
            self.device.destroy_descriptor_pool(pool);
        }
        self.sets_allocated = 0;
        self.in_use_generation = None;
    }

    /// Current counters
    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            pool_count: self.ready_pools.len() + self.full_pools.len(),
            ready_count: self.ready_pools.len(),
            full_count: self.full_pools.len(),
            sets_allocated: self.sets_allocated,
        }
    }

    /// Set count the next new sub-pool will be created with
    pub const fn next_pool_sets(&self) -> u32 {
        self.next_pool_sets
    }

    /// Newest generation marked as referencing these sets
    pub const fn in_use_generation(&self) -> Option<u64> {
        self.in_use_generation
    }

    fn take_ready_pool(&mut self) -> RenderResult<DescriptorPoolHandle> {
        match self.ready_pools.pop() {
            Some(pool) => Ok(pool),
            None => self.create_pool(),
        }
    }

    fn create_pool(&mut self) -> RenderResult<DescriptorPoolHandle> {
        let sets = self.next_pool_sets;
        let mut sizes = GrowableBuffer::try_new()?;
        for ratio in &self.config.ratios {
            sizes.push(PoolSize {
                kind: ratio.kind,
                count: ratio.descriptors_for(sets),
            })?;
        }

        let pool = self
            .device
            .create_descriptor_pool(sets, sizes.as_slice())
            .map_err(|err| match err.kind() {
                ErrorKind::AllocationFailed | ErrorKind::DeviceLost => err,
                _ => RenderError::PoolCreationFailed(err.to_string()),
            })?;

        self.next_pool_sets = sets.saturating_mul(2).min(self.config.max_sets_per_pool);
        log::debug!("Created descriptor sub-pool {pool:?} for {sets} sets");
        Ok(pool)
    }

    /// Return a sub-pool to one of the lists, destroying it if the list cannot grow
    fn park(&mut self, pool: DescriptorPoolHandle, full: bool) -> RenderResult<()> {
        let list = if full { &mut self.full_pools } else { &mut self.ready_pools };
        if let Err(err) = list.push(pool) {
            self.device.destroy_descriptor_pool(pool);
            return Err(err.into());
        }
        Ok(())
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        self.destroy();
    }
}
