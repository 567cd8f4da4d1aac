use super::{pipeline_config, rig};
use crate::core::config::{DescriptorPoolConfig, EngineConfig, PoolRatio};
use crate::render::api::{DescriptorKind, Extent2D, ShaderStages};
use crate::render::backends::headless::{CompletionMode, HeadlessGpu, HeadlessWindow};
use crate::render::descriptors::DescriptorLayoutBuilder;
use crate::render::error::RenderError;
use crate::render::session::{FrameOutcome, RenderSession};

fn session(mode: CompletionMode, window: &mut HeadlessWindow) -> (RenderSession, HeadlessGpu) {
    let (device, gpu, surface) = rig(mode, 2);
    let config = EngineConfig::new("session-test").with_pipeline(pipeline_config(2));
    let session = RenderSession::new(device, Box::new(surface), window, &config).unwrap();
    (session, gpu)
}

#[test]
fn test_frames_present_in_order() {
    let mut window = HeadlessWindow::new(800, 600);
    let (mut session, gpu) = session(CompletionMode::Immediate, &mut window);
    let layout = DescriptorLayoutBuilder::new()
        .add_uniform_buffer(0, ShaderStages::VERTEX)
        .unwrap()
        .build(session.device())
        .unwrap();

    for frame in 0..4u32 {
        let outcome = session
            .draw_frame(&mut window, |active| {
                assert_eq!(active.extent(), Extent2D::new(800, 600));
                active.descriptors().allocate(&layout)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                image_index: frame % 3,
                generation: u64::from(frame) + 1,
            }
        );
    }

    assert_eq!(session.stats().presents, 4);
    assert_eq!(gpu.stats().submits, 4);
}

#[test]
fn test_stale_surface_rebuilds_instead_of_failing() {
    let mut window = HeadlessWindow::new(800, 600);
    let (mut session, gpu) = session(CompletionMode::Immediate, &mut window);
    session.draw_frame(&mut window, |_| Ok(())).unwrap();

    gpu.invalidate_surface();
    let mut recorded = false;
    let outcome = session
        .draw_frame(&mut window, |_| {
            recorded = true;
            Ok(())
        })
        .unwrap();
    assert_eq!(outcome, FrameOutcome::SwapchainRebuilt);
    assert!(!recorded);
    assert_eq!(session.swapchain().rebuild_count(), 2);

    let outcome = session.draw_frame(&mut window, |_| Ok(())).unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { generation: 2, .. }));
}

#[test]
fn test_stale_present_rebuilds_after_submit() {
    let mut window = HeadlessWindow::new(800, 600);
    let (mut session, gpu) = session(CompletionMode::Immediate, &mut window);

    gpu.set_suboptimal(true);
    let outcome = session.draw_frame(&mut window, |_| Ok(())).unwrap();
    assert_eq!(outcome, FrameOutcome::SwapchainRebuilt);
    assert_eq!(gpu.stats().submits, 1);
    assert_eq!(gpu.stats().presents, 1);

    gpu.set_suboptimal(false);
    let outcome = session.draw_frame(&mut window, |_| Ok(())).unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
}

#[test]
fn test_resize_rebuilds_before_next_frame() {
    let mut window = HeadlessWindow::new(800, 600);
    let (mut session, _gpu) = session(CompletionMode::Immediate, &mut window);

    window.set_extent(1024, 768);
    session.handle_resize();
    assert!(session.swapchain().is_stale());

    let outcome = session
        .draw_frame(&mut window, |active| {
            assert_eq!(active.extent(), Extent2D::new(1024, 768));
            Ok(())
        })
        .unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(session.swapchain().rebuild_count(), 2);
    assert_eq!(session.swapchain().extent(), Some(Extent2D::new(1024, 768)));
}

#[test]
fn test_record_error_is_returned_after_submit() {
    let mut window = HeadlessWindow::new(800, 600);
    let (mut session, gpu) = session(CompletionMode::Immediate, &mut window);

    let err = session
        .draw_frame(&mut window, |_| {
            Err(RenderError::Validation("recording failed".to_string()))
        })
        .unwrap_err();
    assert!(matches!(err, RenderError::Validation(_)));
    assert_eq!(gpu.stats().submits, 1);
    assert_eq!(session.pipeline().current_slot(), 1);

    for _ in 0..3 {
        let outcome = session.draw_frame(&mut window, |_| Ok(())).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    }
}

#[test]
fn test_framebuffer_available_once_render_pass_attached() {
    let mut window = HeadlessWindow::new(800, 600);
    let (mut session, _gpu) = session(CompletionMode::Immediate, &mut window);

    session
        .draw_frame(&mut window, |active| {
            assert_eq!(active.framebuffer(), None);
            assert_eq!(active.render_pass(), None);
            Ok(())
        })
        .unwrap();

    let render_pass = session.swapchain_mut().attach_render_pass().unwrap();
    session
        .draw_frame(&mut window, |active| {
            assert!(active.framebuffer().is_some());
            assert_eq!(active.render_pass(), Some(render_pass));
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_drop_quiesces_and_releases_everything() {
    let mut window = HeadlessWindow::new(800, 600);
    let (mut session, gpu) = session(CompletionMode::Manual, &mut window);
    session.swapchain_mut().attach_render_pass().unwrap();

    for _ in 0..2 {
        session.draw_frame(&mut window, |_| Ok(())).unwrap();
    }
    assert_eq!(gpu.pending_submissions(), 2);
    assert!(gpu.stats().live_objects > 0);

    drop(session);

    assert_eq!(gpu.pending_submissions(), 0);
    assert_eq!(gpu.stats().completed, 2);
    assert_eq!(gpu.stats().live_objects, 0);
}

#[test]
fn test_shared_descriptors_sized_from_config() {
    let mut window = HeadlessWindow::new(800, 600);
    let (device, gpu, surface) = rig(CompletionMode::Immediate, 2);
    let descriptors = DescriptorPoolConfig::new(3, vec![PoolRatio::new(DescriptorKind::UniformBuffer, 1.0)])
        .with_max_sets_per_pool(12);
    let config = EngineConfig::new("session-test")
        .with_pipeline(pipeline_config(2))
        .with_descriptors(descriptors);
    let created = gpu.stats().descriptor_pools_created;

    let session = RenderSession::new(device, Box::new(surface), &mut window, &config).unwrap();
    assert_eq!(session.descriptors().stats().pool_count, 1);
    assert_eq!(session.descriptors().next_pool_sets(), 6);
    // Two per-frame sub-pools and the shared one.
    assert_eq!(gpu.stats().descriptor_pools_created, created + 3);
}

#[test]
fn test_shared_descriptors_kept_until_frames_complete() {
    let mut window = HeadlessWindow::new(800, 600);
    let (mut session, gpu) = session(CompletionMode::Manual, &mut window);
    let layout = DescriptorLayoutBuilder::new()
        .add_uniform_buffer(0, ShaderStages::VERTEX)
        .unwrap()
        .build(session.device())
        .unwrap();

    session.descriptors_mut().allocate(&layout).unwrap();
    session.draw_frame(&mut window, |_| Ok(())).unwrap();
    assert_eq!(session.descriptors().in_use_generation(), Some(1));

    let err = session.clear_shared_descriptors().unwrap_err();
    assert!(matches!(err, RenderError::PoolInUse { pending: 1, completed: 0 }));
    assert_eq!(session.descriptors().stats().sets_allocated, 1);

    gpu.complete_all();
    session.clear_shared_descriptors().unwrap();
    assert_eq!(session.descriptors().stats().sets_allocated, 0);
    assert_eq!(session.descriptors().in_use_generation(), None);
}

#[test]
fn test_frame_access_marks_shared_descriptors() {
    let mut window = HeadlessWindow::new(800, 600);
    let (mut session, _gpu) = session(CompletionMode::Manual, &mut window);
    let layout = DescriptorLayoutBuilder::new()
        .add_uniform_buffer(0, ShaderStages::VERTEX)
        .unwrap()
        .build(session.device())
        .unwrap();

    session.draw_frame(&mut window, |_| Ok(())).unwrap();
    assert_eq!(session.descriptors().in_use_generation(), None);

    session
        .draw_frame(&mut window, |active| {
            active.shared_descriptors().allocate(&layout)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(session.descriptors().in_use_generation(), Some(2));

    session.wait_idle().unwrap();
    session.clear_shared_descriptors().unwrap();
}
