//! Collaborator boundaries of the render core
//!
//! The frame pipeline, swapchain lifecycle and descriptor layer talk to the
//! GPU, the presentation engine and the window only through these traits.
//! `backends::vulkan` implements them with ash; `backends::headless`
//! implements them with an in-process simulated GPU.

pub mod device;
pub mod handles;
pub mod surface;

pub use device::{
    AllocatedImage, DescriptorKind, DescriptorPayload, DescriptorWrite, GpuDevice, ImageAspect,
    ImageLayout, LayoutBinding, PoolSize, SetAllocation, ShaderStages, SubmitInfo,
};
pub use handles::*;
pub use surface::{
    AcquiredImage, Extent2D, PresentMode, PresentStatus, PresentationSurface, SurfaceCapabilities,
    SwapchainImages, SwapchainRequest, TextureFormat, WindowSurface,
};

/// Shared ownership of a device; every RAII wrapper holds one
pub type SharedDevice = std::sync::Arc<dyn GpuDevice>;
