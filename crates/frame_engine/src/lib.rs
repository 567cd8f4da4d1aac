//! # Frame Engine
//!
//! Frames-in-flight rendering core with Vulkan and headless backends.
//!
//! ## Features
//!
//! - **Frame Pipeline**: a fixed ring of frame contexts so the CPU records frame
//!   N+1 while the GPU still executes frame N
//! - **Descriptor Recycling**: growable descriptor pools with bounded retry and
//!   generation-checked clearing
//! - **Swapchain Recovery**: stale or resized surfaces are rebuilt without
//!   touching the frame ring
//! - **Headless Backend**: an in-process GPU executor for CI and tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use frame_engine::prelude::*;
//! use frame_engine::render::backends::headless::{HeadlessDevice, HeadlessSurface, HeadlessWindow};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let device = HeadlessDevice::new();
//!     let surface = HeadlessSurface::new(&device, 3);
//!     let mut window = HeadlessWindow::new(800, 600);
//!
//!     let mut session = RenderSession::new(
//!         Arc::new(device),
//!         Box::new(surface),
//!         &mut window,
//!         &config,
//!     )?;
//!
//!     session.draw_frame(&mut window, |_frame| Ok(()))?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod core;

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{
            DescriptorPoolConfig, EngineConfig, PipelineConfig, PoolRatio, SwapchainConfig,
            VulkanBackendConfig,
        },
        foundation::collections::{BufferError, GrowableBuffer},
        render::{
            api::{DescriptorKind, Extent2D, GpuDevice, PresentationSurface, ShaderStages, WindowSurface},
            descriptors::{DescriptorAllocator, DescriptorLayoutBuilder, DescriptorWriter},
            error::{ErrorKind, RenderError, RenderResult},
            frame::{FramePipeline, FrameToken},
            session::{FrameOutcome, RenderSession},
            swapchain::SwapchainLifecycle,
        },
    };
}
