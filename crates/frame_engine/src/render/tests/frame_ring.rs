use std::thread;
use std::time::Duration;

use super::{built_swapchain, pipeline_config, rig};
use crate::render::backends::headless::{CompletionMode, HeadlessWindow};
use crate::render::error::{ErrorKind, RenderError};
use crate::render::frame::{FramePipeline, SlotState};

#[test]
fn test_ring_blocks_only_when_slot_reused() {
    let (device, gpu, surface) = rig(CompletionMode::Manual, 2);
    let mut window = HeadlessWindow::new(640, 480);
    let mut swapchain = built_swapchain(&device, surface, &mut window);
    let mut pipeline = FramePipeline::new(device.clone(), &pipeline_config(3)).unwrap();

    // The first N frames run on fresh, signaled fences.
    for frame in 0..3 {
        let token = pipeline.begin_frame(&mut swapchain).unwrap();
        assert_eq!(token.slot(), frame);
        assert_eq!(token.generation(), frame as u64 + 1);
        pipeline.end_frame(token, &mut swapchain).unwrap();
    }
    assert_eq!(pipeline.stats().blocking_waits, 0);
    assert_eq!(gpu.pending_submissions(), 3);

    // Frame 3 lands on slot 0 while frame 0 is still executing.
    let helper = {
        let gpu = gpu.clone();
        thread::spawn(move || {
            let blocked = gpu.wait_until_blocked(Duration::from_secs(5));
            let completed = gpu.complete_oldest();
            (blocked, completed)
        })
    };
    let token = pipeline.begin_frame(&mut swapchain).unwrap();
    assert_eq!(helper.join().unwrap(), (true, true));
    assert_eq!(token.slot(), 0);
    assert_eq!(pipeline.stats().blocking_waits, 1);
    assert_eq!(pipeline.completed_generation(), 1);
    pipeline.end_frame(token, &mut swapchain).unwrap();

    // Retire one frame ahead of each begin; nothing blocks again.
    for _ in 4..10 {
        assert!(gpu.complete_oldest());
        let token = pipeline.begin_frame(&mut swapchain).unwrap();
        pipeline.end_frame(token, &mut swapchain).unwrap();
        assert!(gpu.pending_submissions() <= 3);
    }

    let stats = pipeline.stats();
    assert_eq!(stats.frames_begun, 10);
    assert_eq!(stats.submits, 10);
    assert_eq!(stats.presents, 10);
    assert_eq!(stats.blocking_waits, 1);
    assert_eq!(gpu.stats().submits, 10);
    assert_eq!(gpu.stats().presents, 10);
    assert_eq!(gpu.stats().blocked_waits, 1);
}

#[test]
fn test_generations_are_monotonic_and_slots_cycle() {
    let (device, _gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut window = HeadlessWindow::new(320, 240);
    let mut swapchain = built_swapchain(&device, surface, &mut window);
    let mut pipeline = FramePipeline::new(device.clone(), &pipeline_config(2)).unwrap();

    let mut last = 0;
    for frame in 0..6 {
        assert_eq!(pipeline.current_slot(), frame % 2);
        let token = pipeline.begin_frame(&mut swapchain).unwrap();
        assert!(token.generation() > last);
        last = token.generation();
        pipeline.end_frame(token, &mut swapchain).unwrap();
    }

    assert_eq!(pipeline.next_generation(), 7);
    assert_eq!(pipeline.refresh_completed().unwrap(), 6);
}

#[test]
fn test_fence_timeout_is_device_loss() {
    let (device, gpu, surface) = rig(CompletionMode::Manual, 2);
    let mut window = HeadlessWindow::new(640, 480);
    let mut swapchain = built_swapchain(&device, surface, &mut window);
    let config = pipeline_config(1).with_fence_timeout(Duration::from_millis(20));
    let mut pipeline = FramePipeline::new(device.clone(), &config).unwrap();

    let token = pipeline.begin_frame(&mut swapchain).unwrap();
    pipeline.end_frame(token, &mut swapchain).unwrap();

    let err = pipeline.begin_frame(&mut swapchain).unwrap_err();
    assert!(matches!(err, RenderError::Timeout { what: "fence", .. }));
    assert_eq!(err.kind(), ErrorKind::DeviceLost);
    assert!(!err.is_recoverable());
    assert_eq!(gpu.stats().fence_timeouts, 1);
}

#[test]
fn test_out_of_order_calls_are_rejected() {
    let (device, _gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut window = HeadlessWindow::new(640, 480);
    let mut swapchain = built_swapchain(&device, surface, &mut window);
    let mut pipeline = FramePipeline::new(device.clone(), &pipeline_config(2)).unwrap();

    let token = pipeline.begin_frame(&mut swapchain).unwrap();
    let again = pipeline.begin_frame(&mut swapchain).unwrap_err();
    assert!(matches!(again, RenderError::InvalidFrameState { slot: 0, .. }));
    assert_eq!(again.kind(), ErrorKind::Usage);

    pipeline.end_frame(token, &mut swapchain).unwrap();
    let twice = pipeline.end_frame(token, &mut swapchain).unwrap_err();
    assert!(matches!(twice, RenderError::InvalidFrameState { expected: "recording", .. }));
    assert!(pipeline.frame_descriptors(&token).is_err());
    assert_eq!(pipeline.frame(0).unwrap().state(), SlotState::Submitted);
}

#[test]
fn test_frame_local_descriptors_cleared_on_reuse() {
    use crate::render::api::ShaderStages;
    use crate::render::descriptors::DescriptorLayoutBuilder;

    let (device, _gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut window = HeadlessWindow::new(640, 480);
    let mut swapchain = built_swapchain(&device, surface, &mut window);
    let mut pipeline = FramePipeline::new(device.clone(), &pipeline_config(2)).unwrap();

    let layout = DescriptorLayoutBuilder::new()
        .add_uniform_buffer(0, ShaderStages::VERTEX)
        .unwrap()
        .build(&device)
        .unwrap();

    let token = pipeline.begin_frame(&mut swapchain).unwrap();
    for _ in 0..3 {
        pipeline.frame_descriptors(&token).unwrap().allocate(&layout).unwrap();
    }
    pipeline.end_frame(token, &mut swapchain).unwrap();
    assert_eq!(pipeline.frame(0).unwrap().descriptors().stats().sets_allocated, 3);
    assert_eq!(pipeline.frame(0).unwrap().last_generation(), Some(1));

    let token = pipeline.begin_frame(&mut swapchain).unwrap();
    pipeline.end_frame(token, &mut swapchain).unwrap();

    // Slot 0 again: its sets were released before recording started.
    let token = pipeline.begin_frame(&mut swapchain).unwrap();
    assert_eq!(token.slot(), 0);
    let descriptors = pipeline.frame_descriptors(&token).unwrap();
    assert_eq!(descriptors.stats().sets_allocated, 0);
    assert_eq!(descriptors.in_use_generation(), None);
    pipeline.end_frame(token, &mut swapchain).unwrap();
}

#[test]
fn test_lost_device_surfaces_as_fatal() {
    let (device, gpu, surface) = rig(CompletionMode::Immediate, 2);
    let mut window = HeadlessWindow::new(640, 480);
    let mut swapchain = built_swapchain(&device, surface, &mut window);
    let mut pipeline = FramePipeline::new(device.clone(), &pipeline_config(2)).unwrap();

    gpu.lose_device();
    let err = pipeline.begin_frame(&mut swapchain).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceLost);
}

#[test]
fn test_ring_size_is_validated() {
    let (device, _gpu, _surface) = rig(CompletionMode::Immediate, 2);
    assert!(matches!(
        FramePipeline::new(device.clone(), &pipeline_config(0)),
        Err(RenderError::Config(_))
    ));
    assert!(FramePipeline::new(device, &pipeline_config(8)).is_ok());
}
