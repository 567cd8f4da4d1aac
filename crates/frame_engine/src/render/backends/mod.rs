//! Collaborator implementations
//!
//! `vulkan` drives real hardware through ash; `headless` is an in-process
//! simulation used by the test suite and by tools that need the frame
//! machinery without a GPU.

pub mod headless;
pub mod vulkan;

pub use headless::{CompletionMode, HeadlessDevice, HeadlessGpu, HeadlessStats, HeadlessSurface, HeadlessWindow};
