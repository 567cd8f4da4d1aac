//! Descriptor set layout builder

use crate::foundation::collections::GrowableBuffer;
use crate::render::api::{
    DescriptorKind, DescriptorSetLayoutHandle, LayoutBinding, ShaderStages, SharedDevice,
};
use crate::render::error::{RenderError, RenderResult};

/// Descriptor set layout builder for creating reusable layouts
///
/// Bindings are kept in insertion order. The builder can be cleared and
/// reused; its storage is kept across `clear()`.
pub struct DescriptorLayoutBuilder {
    bindings: GrowableBuffer<LayoutBinding>,
}

impl DescriptorLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self {
            bindings: GrowableBuffer::new(),
        }
    }

    /// Append a binding
    pub fn add_binding(
        &mut self,
        slot: u32,
        kind: DescriptorKind,
        stages: ShaderStages,
    ) -> RenderResult<&mut Self> {
        self.bindings.push(LayoutBinding {
            slot,
            kind,
            count: 1,
            stages,
        })?;
        Ok(self)
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(&mut self, slot: u32, stages: ShaderStages) -> RenderResult<&mut Self> {
        self.add_binding(slot, DescriptorKind::UniformBuffer, stages)
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(
        &mut self,
        slot: u32,
        stages: ShaderStages,
    ) -> RenderResult<&mut Self> {
        self.add_binding(slot, DescriptorKind::CombinedImageSampler, stages)
    }

    /// Add a storage buffer binding
    pub fn add_storage_buffer(&mut self, slot: u32, stages: ShaderStages) -> RenderResult<&mut Self> {
        self.add_binding(slot, DescriptorKind::StorageBuffer, stages)
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[LayoutBinding] {
        self.bindings.as_slice()
    }

    /// Forget every binding, keeping the allocation
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Build the descriptor set layout
    ///
    /// A device rejection (duplicate slot, unsupported kind) is reported as
    /// [`RenderError::LayoutCreationFailed`].
    pub fn build(&self, device: &SharedDevice) -> RenderResult<DescriptorSetLayout> {
        let layout = device
            .create_descriptor_set_layout(self.bindings.as_slice())
            .map_err(|err| match err {
                RenderError::ResourceCreationFailed { reason, .. } => {
                    RenderError::LayoutCreationFailed(reason)
                }
                other => other,
            })?;

        log::debug!(
            "Created descriptor set layout {:?} with {} bindings",
            layout,
            self.bindings.len()
        );

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings.as_slice().to_vec(),
        })
    }
}

impl Default for DescriptorLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: DescriptorSetLayoutHandle,
    device: SharedDevice,
    bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayout {
    /// Get the descriptor set layout handle
    pub const fn handle(&self) -> DescriptorSetLayoutHandle {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.device.destroy_descriptor_set_layout(self.layout);
    }
}

impl std::fmt::Debug for DescriptorSetLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSetLayout")
            .field("layout", &self.layout)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}
