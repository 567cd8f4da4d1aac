//! Opaque device object handles
//!
//! Backends hand these out and translate them back to native objects. The
//! render core never looks inside; it only stores, compares and returns them.

macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u64);

            impl $name {
                /// The null handle
                pub const NULL: Self = Self(0);

                /// Wrap a raw backend value
                pub const fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                /// Raw backend value
                pub const fn as_raw(self) -> u64 {
                    self.0
                }

                /// Whether this is the null handle
                pub const fn is_null(self) -> bool {
                    self.0 == 0
                }
            }
        )*
    };
}

define_handle! {
    /// GPU-to-GPU signal
    SemaphoreHandle;
    /// GPU-to-CPU signal
    FenceHandle;
    /// Command buffer allocator
    CommandPoolHandle;
    /// Command recording scope
    CommandBufferHandle;
    /// Immutable descriptor binding schema
    DescriptorSetLayoutHandle;
    /// Descriptor sub-pool
    DescriptorPoolHandle;
    /// Descriptor set drawn from a sub-pool
    DescriptorSetHandle;
    /// Image (presentable or device-local)
    ImageHandle;
    /// Backing memory of a device-local image
    DeviceMemoryHandle;
    /// View onto an image
    ImageViewHandle;
    /// Render target bound to a render pass
    FramebufferHandle;
    /// Render pass the framebuffers are compatible with
    RenderPassHandle;
    /// Device buffer
    BufferHandle;
    /// Texture sampler
    SamplerHandle;
    /// Compiled shader stage
    ShaderModuleHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        assert!(FenceHandle::NULL.is_null());
        assert!(!FenceHandle::from_raw(7).is_null());
        assert_eq!(ImageHandle::from_raw(42).as_raw(), 42);
    }
}
