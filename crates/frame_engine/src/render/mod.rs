//! Rendering core
//!
//! The frame pipeline, swapchain lifecycle and descriptor layer, written
//! against the collaborator traits in [`api`]. Backends live in [`backends`].
//!
//! Ownership follows one rule: anything created from a device holds a
//! [`api::SharedDevice`] clone and destroys itself on drop, so teardown order
//! is the reverse of construction and never outlives the device.

pub mod api;
pub mod backends;
pub mod descriptors;
pub mod error;
pub mod frame;
pub mod framebuffer;
pub mod session;
pub mod shader;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
mod tests;

pub use error::{ErrorKind, RenderError, RenderResult};
pub use frame::{FramePipeline, FrameToken};
pub use session::{ActiveFrame, FrameOutcome, RenderSession};
pub use swapchain::SwapchainLifecycle;
