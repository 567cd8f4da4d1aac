use super::rig;
use crate::core::config::{DescriptorPoolConfig, PoolRatio};
use crate::render::api::{
    BufferHandle, DescriptorKind, ImageLayout, ImageViewHandle, SamplerHandle, ShaderStages,
    SharedDevice,
};
use crate::render::backends::headless::{CompletionMode, HeadlessGpu};
use crate::render::descriptors::{
    DescriptorAllocator, DescriptorLayoutBuilder, DescriptorSetLayout, DescriptorWriter,
};
use crate::render::error::{ErrorKind, RenderError};

/// Sub-pools of `initial` sets holding one uniform buffer per set
fn uniform_pools(initial: u32, max: u32) -> DescriptorPoolConfig {
    DescriptorPoolConfig::new(
        initial,
        vec![PoolRatio::new(DescriptorKind::UniformBuffer, 1.0)],
    )
    .with_max_sets_per_pool(max)
}

fn uniform_layout(device: &SharedDevice) -> DescriptorSetLayout {
    DescriptorLayoutBuilder::new()
        .add_uniform_buffer(0, ShaderStages::VERTEX | ShaderStages::FRAGMENT)
        .unwrap()
        .build(device)
        .unwrap()
}

fn allocator(initial: u32, max: u32) -> (SharedDevice, HeadlessGpu, DescriptorAllocator) {
    let (device, gpu, _surface) = rig(CompletionMode::Immediate, 2);
    let allocator = DescriptorAllocator::new(device.clone(), uniform_pools(initial, max)).unwrap();
    (device, gpu, allocator)
}

#[test]
fn test_exhausted_pool_is_never_offered_again() {
    let (device, gpu, mut allocator) = allocator(2, 64);
    let layout = uniform_layout(&device);

    let first = allocator.allocate(&layout).unwrap();
    let second = allocator.allocate(&layout).unwrap();
    assert_ne!(first, second);
    assert_eq!(gpu.stats().descriptor_pools_created, 1);

    // The first sub-pool is full; the third set comes from a fresh one.
    allocator.allocate(&layout).unwrap();
    let stats = allocator.stats();
    assert_eq!(stats.pool_count, 2);
    assert_eq!(stats.full_count, 1);
    assert_eq!(stats.ready_count, 1);
    assert_eq!(gpu.stats().descriptor_pools_created, 2);

    // The fresh sub-pool was created at double size and absorbs the rest.
    for _ in 0..3 {
        allocator.allocate(&layout).unwrap();
    }
    assert_eq!(allocator.stats().full_count, 1);
    assert_eq!(allocator.stats().sets_allocated, 6);
    assert_eq!(gpu.stats().descriptor_pools_created, 2);
}

#[test]
fn test_sub_pools_double_up_to_threshold() {
    let (device, _gpu, mut allocator) = allocator(2, 8);
    let layout = uniform_layout(&device);
    assert_eq!(allocator.next_pool_sets(), 4);

    for _ in 0..3 {
        allocator.allocate(&layout).unwrap();
    }
    assert_eq!(allocator.next_pool_sets(), 8);

    for _ in 0..4 {
        allocator.allocate(&layout).unwrap();
    }
    assert_eq!(allocator.next_pool_sets(), 8);
    assert_eq!(allocator.stats().pool_count, 3);
}

#[test]
fn test_full_pools_kept_at_threshold_until_cleared() {
    let (device, gpu, mut allocator) = allocator(2, 4);
    let layout = uniform_layout(&device);

    // 2 + 4 + 4 sets fill three sub-pools; the eleventh opens a fourth.
    let mut sets = Vec::new();
    let mut live = gpu.stats().live_objects;
    for _ in 0..11 {
        sets.push(allocator.allocate(&layout).unwrap());
        let now = gpu.stats().live_objects;
        assert!(now > live, "an exhausted sub-pool released its sets");
        live = now;
    }

    let stats = allocator.stats();
    assert_eq!(stats.pool_count, 4);
    assert_eq!(stats.full_count, 3);
    assert_eq!(stats.ready_count, 1);
    assert_eq!(stats.sets_allocated, 11);
    assert_eq!(allocator.next_pool_sets(), 4);
    assert_eq!(gpu.stats().descriptor_pools_created, 4);

    sets.sort_unstable_by_key(|set| set.as_raw());
    sets.dedup();
    assert_eq!(sets.len(), 11);

    allocator.clear_pools(0).unwrap();
    let stats = allocator.stats();
    assert_eq!(stats.full_count, 0);
    assert_eq!(stats.ready_count, 4);
    assert_eq!(stats.sets_allocated, 0);
}

#[test]
fn test_retry_bound_reports_exhaustion() {
    let (device, gpu, mut allocator) = allocator(2, 4);
    let oversized = DescriptorLayoutBuilder::new()
        .add_binding(0, DescriptorKind::UniformBuffer, ShaderStages::VERTEX)
        .unwrap()
        .add_binding(1, DescriptorKind::UniformBuffer, ShaderStages::VERTEX)
        .unwrap()
        .add_binding(2, DescriptorKind::UniformBuffer, ShaderStages::VERTEX)
        .unwrap()
        .add_binding(3, DescriptorKind::UniformBuffer, ShaderStages::VERTEX)
        .unwrap()
        .add_binding(4, DescriptorKind::UniformBuffer, ShaderStages::VERTEX)
        .unwrap()
        .build(&device)
        .unwrap();

    let err = allocator.allocate(&oversized).unwrap_err();
    assert!(matches!(err, RenderError::DescriptorPoolExhausted { attempts: 2 }));
    assert_eq!(err.kind(), ErrorKind::AllocationFailed);
    assert_eq!(gpu.stats().descriptor_pools_created, 2);
    assert_eq!(allocator.stats().full_count, 2);

    // A set that fits still allocates from a new sub-pool.
    let layout = uniform_layout(&device);
    allocator.allocate(&layout).unwrap();
}

#[test]
fn test_clear_reuses_pools_without_creating_more() {
    let (device, gpu, mut allocator) = allocator(2, 64);
    let layout = uniform_layout(&device);

    for _ in 0..5 {
        allocator.allocate(&layout).unwrap();
    }
    let created = gpu.stats().descriptor_pools_created;
    let pools = allocator.stats().pool_count;

    allocator.clear_pools(0).unwrap();
    let stats = allocator.stats();
    assert_eq!(stats.full_count, 0);
    assert_eq!(stats.ready_count, pools);
    assert_eq!(stats.sets_allocated, 0);

    for _ in 0..5 {
        allocator.allocate(&layout).unwrap();
    }
    assert_eq!(gpu.stats().descriptor_pools_created, created);
}

#[test]
fn test_clear_refused_while_gpu_may_read_sets() {
    let (device, _gpu, mut allocator) = allocator(4, 64);
    let layout = uniform_layout(&device);
    allocator.allocate(&layout).unwrap();
    allocator.mark_in_use(5);

    let err = allocator.clear_pools(4).unwrap_err();
    assert!(matches!(err, RenderError::PoolInUse { pending: 5, completed: 4 }));
    assert_eq!(allocator.stats().sets_allocated, 1);

    allocator.clear_pools(5).unwrap();
    assert_eq!(allocator.in_use_generation(), None);
    assert_eq!(allocator.stats().sets_allocated, 0);
}

#[test]
fn test_destroy_releases_every_pool() {
    let (device, gpu, mut allocator) = allocator(2, 64);
    let layout = uniform_layout(&device);
    let baseline = gpu.stats().live_objects;

    for _ in 0..3 {
        allocator.allocate(&layout).unwrap();
    }
    allocator.destroy();

    assert_eq!(allocator.stats().pool_count, 0);
    // One sub-pool was alive at the baseline.
    assert_eq!(gpu.stats().live_objects, baseline - 1);

    allocator.allocate(&layout).unwrap();
    assert_eq!(allocator.stats().pool_count, 1);
}

#[test]
fn test_invalid_pool_config_rejected() {
    let (device, _gpu, _surface) = rig(CompletionMode::Immediate, 2);
    let config = DescriptorPoolConfig::new(0, vec![PoolRatio::new(DescriptorKind::UniformBuffer, 1.0)]);
    assert!(matches!(
        DescriptorAllocator::new(device, config),
        Err(RenderError::Config(_))
    ));
}

#[test]
fn test_duplicate_binding_slot_rejected() {
    let (device, _gpu, _surface) = rig(CompletionMode::Immediate, 2);
    let mut builder = DescriptorLayoutBuilder::new();
    builder
        .add_uniform_buffer(0, ShaderStages::VERTEX)
        .unwrap()
        .add_combined_image_sampler(0, ShaderStages::FRAGMENT)
        .unwrap();

    let err = builder.build(&device).unwrap_err();
    assert!(matches!(err, RenderError::LayoutCreationFailed(_)));

    builder.clear();
    assert!(builder.bindings().is_empty());
    builder
        .add_uniform_buffer(0, ShaderStages::VERTEX)
        .unwrap()
        .add_combined_image_sampler(1, ShaderStages::FRAGMENT)
        .unwrap()
        .add_storage_buffer(2, ShaderStages::COMPUTE)
        .unwrap();

    let layout = builder.build(&device).unwrap();
    let slots: Vec<u32> = layout.bindings().iter().map(|b| b.slot).collect();
    assert_eq!(slots, vec![0, 1, 2]);
}

#[test]
fn test_writer_batch_replays_onto_many_sets() {
    let (device, gpu, mut allocator) = allocator(8, 64);
    let layout = uniform_layout(&device);
    let sets: Vec<_> = (0..3).map(|_| allocator.allocate(&layout).unwrap()).collect();

    let mut writer = DescriptorWriter::new();
    writer
        .write_buffer(0, DescriptorKind::UniformBuffer, BufferHandle::from_raw(7), 256, 0)
        .unwrap()
        .write_combined_image(
            1,
            ImageViewHandle::from_raw(9),
            SamplerHandle::from_raw(11),
            ImageLayout::ShaderReadOnly,
        )
        .unwrap()
        .write_image(2, DescriptorKind::StorageImage, ImageViewHandle::from_raw(13), ImageLayout::General)
        .unwrap()
        .write_sampler(3, SamplerHandle::from_raw(15))
        .unwrap();
    assert_eq!(writer.len(), 4);

    for set in &sets {
        writer.update_set(device.as_ref(), *set).unwrap();
    }

    let stats = gpu.stats();
    assert_eq!(stats.descriptor_updates, 3);
    assert_eq!(stats.descriptor_writes, 12);
    assert_eq!(writer.len(), 4);

    writer.clear_writes();
    assert!(writer.is_empty());
    writer.update_set(device.as_ref(), sets[0]).unwrap();
    assert_eq!(gpu.stats().descriptor_updates, 3);
}
