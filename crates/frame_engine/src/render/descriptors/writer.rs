//! Batched descriptor writes

use crate::foundation::collections::GrowableBuffer;
use crate::render::api::{
    BufferHandle, DescriptorKind, DescriptorPayload, DescriptorSetHandle, DescriptorWrite,
    GpuDevice, ImageLayout, ImageViewHandle, SamplerHandle,
};
use crate::render::error::RenderResult;

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    slot: u32,
    kind: DescriptorKind,
    payload: DescriptorPayload,
}

/// Descriptor set writer for updating descriptor sets
///
/// Writes accumulate until [`update_set`](Self::update_set) applies them to a
/// set in one device call. The batch is kept afterwards so it can be replayed
/// onto each frame's copy of a set; [`clear_writes`](Self::clear_writes)
/// empties it.
pub struct DescriptorWriter {
    writes: GrowableBuffer<PendingWrite>,
}

impl DescriptorWriter {
    /// Create a new descriptor set writer
    pub fn new() -> Self {
        Self {
            writes: GrowableBuffer::new(),
        }
    }

    /// Queue an image view binding
    pub fn write_image(
        &mut self,
        slot: u32,
        kind: DescriptorKind,
        view: ImageViewHandle,
        layout: ImageLayout,
    ) -> RenderResult<&mut Self> {
        self.queue(slot, kind, DescriptorPayload::Image { view, sampler: None, layout })
    }

    /// Queue a standalone sampler binding
    pub fn write_sampler(&mut self, slot: u32, sampler: SamplerHandle) -> RenderResult<&mut Self> {
        self.queue(slot, DescriptorKind::Sampler, DescriptorPayload::Sampler(sampler))
    }

    /// Queue a combined image sampler binding
    pub fn write_combined_image(
        &mut self,
        slot: u32,
        view: ImageViewHandle,
        sampler: SamplerHandle,
        layout: ImageLayout,
    ) -> RenderResult<&mut Self> {
        self.queue(
            slot,
            DescriptorKind::CombinedImageSampler,
            DescriptorPayload::Image { view, sampler: Some(sampler), layout },
        )
    }

    /// Queue a buffer range binding
    pub fn write_buffer(
        &mut self,
        slot: u32,
        kind: DescriptorKind,
        buffer: BufferHandle,
        range: u64,
        offset: u64,
    ) -> RenderResult<&mut Self> {
        self.queue(slot, kind, DescriptorPayload::Buffer { buffer, offset, range })
    }

    /// Apply every queued write to `set` in one batched update
    pub fn update_set(&self, device: &dyn GpuDevice, set: DescriptorSetHandle) -> RenderResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }

        let mut stamped = GrowableBuffer::try_new()?;
        for write in &self.writes {
            stamped.push(DescriptorWrite {
                set,
                slot: write.slot,
                kind: write.kind,
                payload: write.payload,
            })?;
        }

        device.update_descriptor_sets(stamped.as_slice());
        Ok(())
    }

    /// Drop every queued write
    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether no writes are queued
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    fn queue(
        &mut self,
        slot: u32,
        kind: DescriptorKind,
        payload: DescriptorPayload,
    ) -> RenderResult<&mut Self> {
        self.writes.push(PendingWrite { slot, kind, payload })?;
        Ok(self)
    }
}

impl Default for DescriptorWriter {
    fn default() -> Self {
        Self::new()
    }
}
