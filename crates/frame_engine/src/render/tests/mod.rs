//! Render core scenarios driven through the headless backend

mod descriptors;
mod frame_ring;
mod session;
mod swapchain;

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{PipelineConfig, SwapchainConfig};
use crate::foundation::logging;
use crate::render::api::SharedDevice;
use crate::render::backends::headless::{CompletionMode, HeadlessDevice, HeadlessGpu, HeadlessSurface, HeadlessWindow};
use crate::render::swapchain::SwapchainLifecycle;

/// Device, its controller, and a surface requiring `min_images` images
fn rig(mode: CompletionMode, min_images: u32) -> (SharedDevice, HeadlessGpu, HeadlessSurface) {
    logging::init_for_tests();
    let device = HeadlessDevice::with_mode(mode);
    let gpu = device.gpu();
    let surface = HeadlessSurface::new(&device, min_images);
    let device: SharedDevice = Arc::new(device);
    (device, gpu, surface)
}

/// Ring of `frames` slots with a generous fence timeout
fn pipeline_config(frames: usize) -> PipelineConfig {
    PipelineConfig::new(frames).with_fence_timeout(Duration::from_secs(5))
}

/// Swapchain lifecycle already built for `window`
fn built_swapchain(
    device: &SharedDevice,
    surface: HeadlessSurface,
    window: &mut HeadlessWindow,
) -> SwapchainLifecycle {
    let mut swapchain =
        SwapchainLifecycle::new(device.clone(), Box::new(surface), SwapchainConfig::new());
    swapchain.rebuild(window).unwrap();
    swapchain
}
