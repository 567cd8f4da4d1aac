//! Device collaborator boundary
//!
//! [`GpuDevice`] is everything the render core asks of a logical device. It is
//! object safe and shared as `Arc<dyn GpuDevice>`; every RAII wrapper in the
//! core keeps a clone so destruction never outlives the device.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::handles::*;
use super::surface::{Extent2D, TextureFormat};
use crate::render::error::RenderResult;

/// Kind of resource a descriptor binding refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorKind {
    /// Standalone sampler
    Sampler,
    /// Sampled image with an attached sampler
    CombinedImageSampler,
    /// Sampled image without a sampler
    SampledImage,
    /// Read/write storage image
    StorageImage,
    /// Uniform buffer
    UniformBuffer,
    /// Storage buffer
    StorageBuffer,
    /// Uniform buffer with a dynamic offset
    UniformBufferDynamic,
    /// Storage buffer with a dynamic offset
    StorageBufferDynamic,
    /// Render pass input attachment
    InputAttachment,
}

impl DescriptorKind {
    /// Whether the descriptor points at an image view
    pub const fn is_image(self) -> bool {
        matches!(
            self,
            Self::CombinedImageSampler | Self::SampledImage | Self::StorageImage | Self::InputAttachment
        )
    }

    /// Whether the descriptor points at a buffer range
    pub const fn is_buffer(self) -> bool {
        matches!(
            self,
            Self::UniformBuffer
                | Self::StorageBuffer
                | Self::UniformBufferDynamic
                | Self::StorageBufferDynamic
        )
    }
}

bitflags! {
    /// Shader stages that can see a binding
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex stage
        const VERTEX = 0x01;
        /// Tessellation control stage
        const TESSELLATION_CONTROL = 0x02;
        /// Tessellation evaluation stage
        const TESSELLATION_EVALUATION = 0x04;
        /// Geometry stage
        const GEOMETRY = 0x08;
        /// Fragment stage
        const FRAGMENT = 0x10;
        /// Compute stage
        const COMPUTE = 0x20;
        /// Every graphics stage
        const ALL_GRAPHICS = 0x1F;
    }
}

/// One entry of a binding schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    /// Binding slot index
    pub slot: u32,
    /// Resource kind
    pub kind: DescriptorKind,
    /// Array element count
    pub count: u32,
    /// Stages the binding is visible to
    pub stages: ShaderStages,
}

/// Descriptor budget of one kind in a sub-pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSize {
    /// Resource kind
    pub kind: DescriptorKind,
    /// Descriptors of that kind
    pub count: u32,
}

/// Result of drawing a set from a sub-pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetAllocation {
    /// The sub-pool produced a set
    Allocated(DescriptorSetHandle),
    /// The sub-pool has no room left (out of pool memory or fragmented)
    PoolExhausted,
}

/// Image layout a descriptor expects at shader access time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents undefined
    Undefined,
    /// Any access
    General,
    /// Read in shaders
    ShaderReadOnly,
    /// Color attachment writes
    ColorAttachment,
    /// Depth/stencil attachment writes
    DepthStencilAttachment,
    /// Depth/stencil reads
    DepthStencilReadOnly,
    /// Transfer source
    TransferSrc,
    /// Transfer destination
    TransferDst,
    /// Ready for presentation
    PresentSrc,
}

/// Payload of a pending descriptor write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorPayload {
    /// Image view, optionally with a sampler
    Image {
        /// View being bound
        view: ImageViewHandle,
        /// Sampler for combined image samplers
        sampler: Option<SamplerHandle>,
        /// Layout at access time
        layout: ImageLayout,
    },
    /// Standalone sampler
    Sampler(SamplerHandle),
    /// Buffer range
    Buffer {
        /// Buffer being bound
        buffer: BufferHandle,
        /// Byte offset
        offset: u64,
        /// Byte length
        range: u64,
    },
}

/// A pending write stamped with its target set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    /// Target set
    pub set: DescriptorSetHandle,
    /// Target binding slot
    pub slot: u32,
    /// Resource kind
    pub kind: DescriptorKind,
    /// What gets bound
    pub payload: DescriptorPayload,
}

/// Which aspect of an image a view covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAspect {
    /// Color data
    Color,
    /// Depth data
    Depth,
}

/// A device-local image with its own memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedImage {
    /// Image handle
    pub image: ImageHandle,
    /// Backing memory
    pub memory: DeviceMemoryHandle,
}

/// One queue submission
///
/// Execution waits on `wait_semaphore` at the color-output stage, then signals
/// `signal_semaphore` and `fence` once the command buffer completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitInfo {
    /// Recorded commands
    pub command_buffer: CommandBufferHandle,
    /// Signal to wait on before color output
    pub wait_semaphore: Option<SemaphoreHandle>,
    /// Signal raised when the commands finish
    pub signal_semaphore: Option<SemaphoreHandle>,
    /// Fence raised when the commands finish
    pub fence: Option<FenceHandle>,
}

/// Logical device operations the render core depends on
///
/// Destroy calls are infallible; backends log and continue if the native call
/// reports an error during teardown.
pub trait GpuDevice: Send + Sync {
    /// Human-readable device name for logs
    fn name(&self) -> &str;

    /// Create a binary semaphore
    fn create_semaphore(&self) -> RenderResult<SemaphoreHandle>;
    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> RenderResult<FenceHandle>;
    /// Destroy a fence
    fn destroy_fence(&self, fence: FenceHandle);
    /// Block until the fence is signaled
    ///
    /// Expiry of `timeout` is reported as [`RenderError::Timeout`](crate::render::error::RenderError::Timeout).
    fn wait_for_fence(&self, fence: FenceHandle, timeout: Duration) -> RenderResult<()>;
    /// Query the fence without blocking
    fn fence_signaled(&self, fence: FenceHandle) -> RenderResult<bool>;
    /// Return the fence to the unsignaled state
    fn reset_fence(&self, fence: FenceHandle) -> RenderResult<()>;

    /// Create a command pool whose buffers can be reset individually
    fn create_command_pool(&self) -> RenderResult<CommandPoolHandle>;
    /// Destroy a command pool and every buffer allocated from it
    fn destroy_command_pool(&self, pool: CommandPoolHandle);
    /// Allocate one primary command buffer
    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> RenderResult<CommandBufferHandle>;
    /// Discard previously recorded commands
    fn reset_command_buffer(&self, buffer: CommandBufferHandle) -> RenderResult<()>;
    /// Open a one-time-submit recording scope
    fn begin_command_buffer(&self, buffer: CommandBufferHandle) -> RenderResult<()>;
    /// Close the recording scope
    fn end_command_buffer(&self, buffer: CommandBufferHandle) -> RenderResult<()>;

    /// Submit recorded work to the graphics queue
    fn submit(&self, info: &SubmitInfo) -> RenderResult<()>;
    /// Block until all submitted work completes
    fn wait_idle(&self) -> RenderResult<()>;

    /// Realize a binding schema as an immutable layout
    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBinding],
    ) -> RenderResult<DescriptorSetLayoutHandle>;
    /// Destroy a layout
    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);

    /// Create a descriptor sub-pool
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[PoolSize],
    ) -> RenderResult<DescriptorPoolHandle>;
    /// Return every set of the sub-pool to it
    fn reset_descriptor_pool(&self, pool: DescriptorPoolHandle) -> RenderResult<()>;
    /// Destroy a sub-pool
    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle);
    /// Draw one set from a sub-pool
    ///
    /// Exhaustion is an ordinary outcome, not an error.
    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> RenderResult<SetAllocation>;
    /// Apply a batch of descriptor writes in one call
    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]);

    /// Create a view onto an image
    fn create_image_view(
        &self,
        image: ImageHandle,
        format: TextureFormat,
        aspect: ImageAspect,
    ) -> RenderResult<ImageViewHandle>;
    /// Destroy a view
    fn destroy_image_view(&self, view: ImageViewHandle);

    /// Create a device-local depth attachment image
    fn create_depth_image(
        &self,
        extent: Extent2D,
        format: TextureFormat,
    ) -> RenderResult<AllocatedImage>;
    /// Destroy a depth image and free its memory
    fn destroy_depth_image(&self, image: AllocatedImage);

    /// Create a single-subpass render pass that clears and presents
    fn create_render_pass(
        &self,
        color: TextureFormat,
        depth: Option<TextureFormat>,
    ) -> RenderResult<RenderPassHandle>;
    /// Destroy a render pass
    fn destroy_render_pass(&self, render_pass: RenderPassHandle);

    /// Create a framebuffer over the given attachments
    fn create_framebuffer(
        &self,
        render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        extent: Extent2D,
    ) -> RenderResult<FramebufferHandle>;
    /// Destroy a framebuffer
    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);

    /// Create a shader module from SPIR-V words
    fn create_shader_module(&self, code: &[u32]) -> RenderResult<ShaderModuleHandle>;
    /// Destroy a shader module
    fn destroy_shader_module(&self, module: ShaderModuleHandle);
}
