use std::time::Duration;

use super::{built_swapchain, pipeline_config, rig};
use crate::core::config::SwapchainConfig;
use crate::render::api::{
    AcquiredImage, Extent2D, PresentStatus, PresentationSurface, SemaphoreHandle,
    SurfaceCapabilities, SwapchainImages, SwapchainRequest, WindowSurface,
};
use crate::render::backends::headless::{CompletionMode, HeadlessSurface, HeadlessWindow};
use crate::render::error::RenderResult;
use crate::render::error::{ErrorKind, RenderError};
use crate::render::frame::FramePipeline;
use crate::render::swapchain::SwapchainLifecycle;

#[test]
fn test_resize_mid_frame_recovers_after_rebuild() {
    let (device, gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut window = HeadlessWindow::new(800, 600);
    let mut swapchain = built_swapchain(&device, surface, &mut window);
    let mut pipeline = FramePipeline::new(device.clone(), &pipeline_config(2)).unwrap();
    assert_eq!(swapchain.image_count(), 3);

    let token = pipeline.begin_frame(&mut swapchain).unwrap();
    window.set_extent(1024, 768);
    gpu.set_min_image_count(3);
    gpu.invalidate_surface();

    let end = pipeline.end_frame(token, &mut swapchain).unwrap_err();
    assert!(matches!(end, RenderError::SurfaceStale));
    assert!(end.is_recoverable());

    let begin = pipeline.begin_frame(&mut swapchain).unwrap_err();
    assert_eq!(begin.kind(), ErrorKind::SurfaceStale);
    assert!(swapchain.is_stale());
    assert_eq!(pipeline.stats().stale_events, 2);

    swapchain.rebuild(&mut window).unwrap();
    assert!(!swapchain.is_stale());
    assert_eq!(swapchain.image_count(), 4);
    assert_eq!(swapchain.extent(), Some(Extent2D::new(1024, 768)));

    for _ in 0..8 {
        let token = pipeline.begin_frame(&mut swapchain).unwrap();
        assert!((token.image_index() as usize) < swapchain.image_count());
        pipeline.end_frame(token, &mut swapchain).unwrap();
    }
}

#[test]
fn test_rebuild_is_idempotent() {
    let (device, gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut window = HeadlessWindow::new(800, 600);
    let mut swapchain = built_swapchain(&device, surface, &mut window);
    swapchain.attach_render_pass().unwrap();
    let live_after_first = gpu.stats().live_objects;
    let extent = swapchain.extent();

    swapchain.rebuild(&mut window).unwrap();
    swapchain.rebuild(&mut window).unwrap();

    assert_eq!(swapchain.rebuild_count(), 3);
    assert_eq!(swapchain.extent(), extent);
    assert_eq!(swapchain.image_count(), 3);
    assert_eq!(gpu.stats().live_objects, live_after_first);
    assert_eq!(gpu.stats().swapchains_created, 3);
}

#[test]
fn test_minimized_window_waits_for_events() {
    let (device, _gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut window = HeadlessWindow::new(0, 0);
    window.queue_extent(0, 0);
    window.queue_extent(640, 360);

    let swapchain = built_swapchain(&device, surface, &mut window);

    assert_eq!(window.wait_calls(), 2);
    assert_eq!(swapchain.extent(), Some(Extent2D::new(640, 360)));
}

#[test]
fn test_zero_surface_extent_waits_for_events() {
    let (device, gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut window = HeadlessWindow::new(800, 600).tracking_surface(&gpu);
    gpu.resize_surface(Extent2D::new(0, 0));
    window.queue_extent(0, 0);
    window.queue_extent(1024, 768);

    let swapchain = built_swapchain(&device, surface, &mut window);

    assert_eq!(window.wait_calls(), 2);
    assert_eq!(swapchain.extent(), Some(Extent2D::new(1024, 768)));
    assert_eq!(gpu.stats().swapchains_created, 1);
}

#[test]
fn test_surface_extent_and_image_limits_win() {
    let (device, _gpu, surface) = rig(CompletionMode::Immediate, 3);
    let surface = surface
        .with_max_image_count(3)
        .with_fixed_extent(Extent2D::new(500, 400));
    let mut window = HeadlessWindow::new(800, 600);

    let swapchain = built_swapchain(&device, surface, &mut window);

    assert_eq!(swapchain.image_count(), 3);
    assert_eq!(swapchain.extent(), Some(Extent2D::new(500, 400)));
}

#[test]
fn test_render_pass_framebuffers_follow_rebuilds() {
    let (device, gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut window = HeadlessWindow::new(800, 600);
    let mut swapchain = built_swapchain(&device, surface, &mut window);
    assert_eq!(swapchain.framebuffer(0), None);

    let render_pass = swapchain.attach_render_pass().unwrap();
    assert_eq!(swapchain.render_pass(), Some(render_pass));
    let before: Vec<_> = (0..3).map(|i| swapchain.framebuffer(i)).collect();
    assert!(before.iter().all(Option::is_some));

    window.set_extent(1280, 720);
    gpu.invalidate_surface();
    swapchain.rebuild(&mut window).unwrap();

    let images = swapchain.images().unwrap();
    for index in 0..3 {
        assert!(images.framebuffer(index).is_some());
        assert!(images.depth_view(index).is_some());
        assert!(images.view(index).is_some());
    }
    assert_eq!(images.image(3), None);
    assert_eq!(swapchain.render_pass(), Some(render_pass));
}

#[test]
fn test_suboptimal_surface_presents_then_goes_stale() {
    let (device, gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut window = HeadlessWindow::new(800, 600);
    let mut swapchain = built_swapchain(&device, surface, &mut window);
    let mut pipeline = FramePipeline::new(device.clone(), &pipeline_config(2)).unwrap();

    gpu.set_suboptimal(true);
    let token = pipeline.begin_frame(&mut swapchain).unwrap();
    assert!(swapchain.is_stale());

    let err = pipeline.end_frame(token, &mut swapchain).unwrap_err();
    assert!(matches!(err, RenderError::SurfaceStale));
    assert_eq!(gpu.stats().presents, 1);
    assert_eq!(pipeline.stats().presents, 1);
}

#[test]
fn test_check_extent_flags_resized_window() {
    let (device, _gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut window = HeadlessWindow::new(800, 600);
    let mut swapchain = built_swapchain(&device, surface, &mut window);

    assert!(!swapchain.check_extent(&window));
    window.set_extent(801, 600);
    assert_eq!(window.framebuffer_extent(), Extent2D::new(801, 600));
    assert!(swapchain.check_extent(&window));
}

#[test]
fn test_acquire_before_first_rebuild_is_stale() {
    let (device, _gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut swapchain = SwapchainLifecycle::new(
        device.clone(),
        Box::new(surface),
        SwapchainConfig::new().with_depth_format(None),
    );
    let mut pipeline = FramePipeline::new(device.clone(), &pipeline_config(2)).unwrap();

    assert!(matches!(
        pipeline.begin_frame(&mut swapchain),
        Err(RenderError::SurfaceStale)
    ));
    assert_eq!(swapchain.image_count(), 0);
    assert_eq!(pipeline.current_slot(), 1);
}

/// Surface that reports an image index past the end of its swapchain
struct OutOfRangeSurface(HeadlessSurface);

impl PresentationSurface for OutOfRangeSurface {
    fn capabilities(&self) -> RenderResult<SurfaceCapabilities> {
        self.0.capabilities()
    }

    fn create_swapchain(&mut self, request: &SwapchainRequest) -> RenderResult<SwapchainImages> {
        self.0.create_swapchain(request)
    }

    fn destroy_swapchain(&mut self) {
        self.0.destroy_swapchain();
    }

    fn acquire_next_image(
        &mut self,
        signal: SemaphoreHandle,
        timeout: Duration,
    ) -> RenderResult<AcquiredImage> {
        let acquired = self.0.acquire_next_image(signal, timeout)?;
        Ok(AcquiredImage {
            index: acquired.index + 16,
            ..acquired
        })
    }

    fn present(&mut self, image_index: u32, wait: SemaphoreHandle) -> RenderResult<PresentStatus> {
        self.0.present(image_index, wait)
    }
}

#[test]
fn test_out_of_range_image_index_is_fatal() {
    let (device, _gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut window = HeadlessWindow::new(800, 600);
    let mut swapchain = SwapchainLifecycle::new(
        device.clone(),
        Box::new(OutOfRangeSurface(surface)),
        SwapchainConfig::new(),
    );
    swapchain.rebuild(&mut window).unwrap();
    let mut pipeline = FramePipeline::new(device.clone(), &pipeline_config(2)).unwrap();

    let err = pipeline.begin_frame(&mut swapchain).unwrap_err();
    assert!(matches!(err, RenderError::Validation(_)));
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(!swapchain.is_stale());
    assert_eq!(pipeline.stats().frames_begun, 0);
}
