//! Headless backend
//!
//! An in-process stand-in for a GPU, a presentation engine and a window. Device
//! objects live in one slotmap table; queue submissions go to a FIFO that is
//! drained either immediately or on demand through [`HeadlessGpu`], so tests
//! can hold frames "on the GPU" and observe the pipeline blocking.
//!
//! The backend enforces the object-state rules a real driver's validation
//! layer would flag: resetting a command buffer the GPU still owns, submitting
//! against a signaled fence, waiting on a semaphore nothing signaled, or
//! allocating past a descriptor pool's budget.

use parking_lot::{Condvar, Mutex, MutexGuard};
use slotmap::{new_key_type, Key, KeyData, SlotMap};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::render::api::{
    AcquiredImage, AllocatedImage, CommandBufferHandle, CommandPoolHandle, DescriptorKind,
    DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, DescriptorWrite,
    DeviceMemoryHandle, Extent2D, FenceHandle, FramebufferHandle, GpuDevice, ImageAspect,
    ImageHandle, ImageViewHandle, LayoutBinding, PoolSize, PresentStatus, PresentationSurface,
    RenderPassHandle, SemaphoreHandle, SetAllocation, ShaderModuleHandle, SubmitInfo,
    SurfaceCapabilities, SwapchainImages, SwapchainRequest, TextureFormat, WindowSurface,
};
use crate::render::error::{RenderError, RenderResult};
use crate::render::shader::SPIRV_MAGIC;

new_key_type! {
    struct ObjectKey;
}

fn to_raw(key: ObjectKey) -> u64 {
    key.data().as_ffi()
}

fn from_raw(raw: u64) -> ObjectKey {
    KeyData::from_ffi(raw).into()
}

/// When submitted work completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Work completes as soon as it is submitted
    Immediate,
    /// Work completes only through [`HeadlessGpu`] or a device wait-idle
    Manual,
}

/// Headless device counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadlessStats {
    /// Queue submissions
    pub submits: u64,
    /// Submissions the simulated GPU finished
    pub completed: u64,
    /// Fence waits that had to block
    pub blocked_waits: u64,
    /// Fence waits that timed out
    pub fence_timeouts: u64,
    /// Successful image acquisitions
    pub acquires: u64,
    /// Accepted presentation requests
    pub presents: u64,
    /// Swapchain (re)creations
    pub swapchains_created: u64,
    /// Descriptor sub-pools created
    pub descriptor_pools_created: u64,
    /// Descriptor sets handed out
    pub descriptor_sets_allocated: u64,
    /// Individual descriptor writes applied
    pub descriptor_writes: u64,
    /// Batched descriptor update calls
    pub descriptor_updates: u64,
    /// Objects currently alive
    pub live_objects: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandBufferState {
    Initial,
    Recording,
    Executable,
    Pending,
}

#[derive(Debug)]
struct PoolState {
    capacity_sets: u32,
    remaining_sets: u32,
    capacity: Vec<PoolSize>,
    remaining: Vec<PoolSize>,
    sets: Vec<ObjectKey>,
}

#[derive(Debug)]
enum Object {
    Semaphore { signaled: bool },
    Fence { signaled: bool },
    CommandPool { buffers: Vec<ObjectKey> },
    CommandBuffer { state: CommandBufferState },
    Layout { bindings: Vec<LayoutBinding> },
    DescriptorPool(PoolState),
    DescriptorSet,
    Image,
    Memory,
    ImageView,
    RenderPass,
    Framebuffer,
    ShaderModule,
}

impl Object {
    const fn name(&self) -> &'static str {
        match self {
            Self::Semaphore { .. } => "semaphore",
            Self::Fence { .. } => "fence",
            Self::CommandPool { .. } => "command pool",
            Self::CommandBuffer { .. } => "command buffer",
            Self::Layout { .. } => "descriptor set layout",
            Self::DescriptorPool(_) => "descriptor pool",
            Self::DescriptorSet => "descriptor set",
            Self::Image => "image",
            Self::Memory => "device memory",
            Self::ImageView => "image view",
            Self::RenderPass => "render pass",
            Self::Framebuffer => "framebuffer",
            Self::ShaderModule => "shader module",
        }
    }
}

#[derive(Debug)]
struct Submission {
    command_buffer: ObjectKey,
    signal: Option<ObjectKey>,
    fence: Option<ObjectKey>,
}

#[derive(Debug)]
struct SurfaceState {
    min_image_count: u32,
    max_image_count: u32,
    current_extent: Option<Extent2D>,
    images: Vec<ObjectKey>,
    next_image: u32,
    out_of_date: bool,
    suboptimal: bool,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: None,
            images: Vec::new(),
            next_image: 0,
            out_of_date: false,
            suboptimal: false,
        }
    }
}

#[derive(Debug, Default)]
struct DeviceState {
    objects: SlotMap<ObjectKey, Object>,
    queue: VecDeque<Submission>,
    surface: SurfaceState,
    stats: HeadlessStats,
    waiting: usize,
    lost: bool,
}

fn unknown(what: &str, raw: u64) -> RenderError {
    RenderError::Validation(format!("unknown {what} handle {raw:#x}"))
}

fn mismatch(what: &str, found: &Object) -> RenderError {
    RenderError::Validation(format!("expected a {what}, found a {}", found.name()))
}

impl DeviceState {
    fn insert(&mut self, object: Object) -> u64 {
        to_raw(self.objects.insert(object))
    }

    fn get_mut(&mut self, raw: u64, what: &str) -> RenderResult<&mut Object> {
        self.objects.get_mut(from_raw(raw)).ok_or_else(|| unknown(what, raw))
    }

    fn exists(&self, raw: u64) -> bool {
        self.objects.contains_key(from_raw(raw))
    }

    fn destroy(&mut self, raw: u64, what: &str) -> Option<Object> {
        if raw == 0 {
            return None;
        }
        let removed = self.objects.remove(from_raw(raw));
        if removed.is_none() {
            log::warn!("Destroying unknown {what} handle {raw:#x}");
        }
        removed
    }

    fn semaphore_mut(&mut self, raw: u64) -> RenderResult<&mut bool> {
        match self.get_mut(raw, "semaphore")? {
            Object::Semaphore { signaled } => Ok(signaled),
            other => Err(mismatch("semaphore", other)),
        }
    }

    fn fence_mut(&mut self, raw: u64) -> RenderResult<&mut bool> {
        match self.get_mut(raw, "fence")? {
            Object::Fence { signaled } => Ok(signaled),
            other => Err(mismatch("fence", other)),
        }
    }

    fn command_buffer_mut(&mut self, raw: u64) -> RenderResult<&mut CommandBufferState> {
        match self.get_mut(raw, "command buffer")? {
            Object::CommandBuffer { state } => Ok(state),
            other => Err(mismatch("command buffer", other)),
        }
    }

    fn pool_mut(&mut self, raw: u64) -> RenderResult<&mut PoolState> {
        match self.get_mut(raw, "descriptor pool")? {
            Object::DescriptorPool(pool) => Ok(pool),
            other => Err(mismatch("descriptor pool", other)),
        }
    }

    fn check_alive(&self) -> RenderResult<()> {
        if self.lost {
            return Err(RenderError::device_lost("headless device marked lost"));
        }
        Ok(())
    }

    fn complete_oldest(&mut self) -> bool {
        let Some(submission) = self.queue.pop_front() else {
            return false;
        };

        if let Some(Object::CommandBuffer { state }) = self.objects.get_mut(submission.command_buffer) {
            *state = CommandBufferState::Executable;
        }
        if let Some(Object::Semaphore { signaled }) =
            submission.signal.and_then(|key| self.objects.get_mut(key))
        {
            *signaled = true;
        }
        if let Some(Object::Fence { signaled }) =
            submission.fence.and_then(|key| self.objects.get_mut(key))
        {
            *signaled = true;
        }

        self.stats.completed += 1;
        true
    }

    fn complete_all(&mut self) -> usize {
        let mut count = 0;
        while self.complete_oldest() {
            count += 1;
        }
        count
    }

    fn destroy_surface_images(&mut self) {
        for key in std::mem::take(&mut self.surface.images) {
            self.objects.remove(key);
        }
        self.surface.next_image = 0;
    }
}

struct Shared {
    name: String,
    mode: CompletionMode,
    state: Mutex<DeviceState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock()
    }
}

/// Simulated logical device
pub struct HeadlessDevice {
    shared: Arc<Shared>,
}

impl HeadlessDevice {
    /// Device whose submissions complete immediately
    pub fn new() -> Self {
        Self::with_mode(CompletionMode::Immediate)
    }

    /// Device with an explicit completion mode
    pub fn with_mode(mode: CompletionMode) -> Self {
        log::debug!("Created headless device ({mode:?} completion)");
        Self {
            shared: Arc::new(Shared {
                name: "Headless GPU".to_string(),
                mode,
                state: Mutex::new(DeviceState::default()),
                changed: Condvar::new(),
            }),
        }
    }

    /// Controller for the simulated GPU and presentation engine
    pub fn gpu(&self) -> HeadlessGpu {
        HeadlessGpu {
            shared: self.shared.clone(),
        }
    }

    /// Completion mode
    pub fn mode(&self) -> CompletionMode {
        self.shared.mode
    }

    fn destroy(&self, raw: u64, what: &str) {
        self.shared.lock().destroy(raw, what);
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for HeadlessDevice {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn create_semaphore(&self) -> RenderResult<SemaphoreHandle> {
        let mut state = self.shared.lock();
        Ok(SemaphoreHandle::from_raw(state.insert(Object::Semaphore { signaled: false })))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        self.destroy(semaphore.as_raw(), "semaphore");
    }

    fn create_fence(&self, signaled: bool) -> RenderResult<FenceHandle> {
        let mut state = self.shared.lock();
        Ok(FenceHandle::from_raw(state.insert(Object::Fence { signaled })))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        self.destroy(fence.as_raw(), "fence");
    }

    fn wait_for_fence(&self, fence: FenceHandle, timeout: Duration) -> RenderResult<()> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.lock();

        if *state.fence_mut(fence.as_raw())? {
            return Ok(());
        }

        state.waiting += 1;
        state.stats.blocked_waits += 1;
        self.shared.changed.notify_all();

        let result = loop {
            if let Err(err) = state.check_alive() {
                break Err(err);
            }
            match state.fence_mut(fence.as_raw()) {
                Ok(signaled) if *signaled => break Ok(()),
                Ok(_) => {}
                Err(err) => break Err(err),
            }

            let timed_out = match deadline {
                Some(deadline) => self.shared.changed.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.shared.changed.wait(&mut state);
                    false
                }
            };

            if timed_out && !matches!(state.fence_mut(fence.as_raw()), Ok(signaled) if *signaled) {
                state.stats.fence_timeouts += 1;
                break Err(RenderError::Timeout {
                    what: "fence",
                    waited: timeout,
                });
            }
        };

        state.waiting -= 1;
        result
    }

    fn fence_signaled(&self, fence: FenceHandle) -> RenderResult<bool> {
        let mut state = self.shared.lock();
        state.check_alive()?;
        Ok(*state.fence_mut(fence.as_raw())?)
    }

    fn reset_fence(&self, fence: FenceHandle) -> RenderResult<()> {
        let mut state = self.shared.lock();
        *state.fence_mut(fence.as_raw())? = false;
        Ok(())
    }

    fn create_command_pool(&self) -> RenderResult<CommandPoolHandle> {
        let mut state = self.shared.lock();
        Ok(CommandPoolHandle::from_raw(state.insert(Object::CommandPool { buffers: Vec::new() })))
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        let mut state = self.shared.lock();
        if let Some(Object::CommandPool { buffers }) = state.destroy(pool.as_raw(), "command pool") {
            for buffer in buffers {
                state.objects.remove(buffer);
            }
        }
    }

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> RenderResult<CommandBufferHandle> {
        let mut state = self.shared.lock();
        let key = state.objects.insert(Object::CommandBuffer {
            state: CommandBufferState::Initial,
        });

        match state.get_mut(pool.as_raw(), "command pool") {
            Ok(Object::CommandPool { buffers }) => {
                buffers.push(key);
                Ok(CommandBufferHandle::from_raw(to_raw(key)))
            }
            Ok(other) => {
                let err = mismatch("command pool", other);
                state.objects.remove(key);
                Err(err)
            }
            Err(err) => {
                state.objects.remove(key);
                Err(err)
            }
        }
    }

    fn reset_command_buffer(&self, buffer: CommandBufferHandle) -> RenderResult<()> {
        let mut state = self.shared.lock();
        let current = state.command_buffer_mut(buffer.as_raw())?;
        if *current == CommandBufferState::Pending {
            return Err(RenderError::Validation(
                "reset of a command buffer still executing on the GPU".to_string(),
            ));
        }
        *current = CommandBufferState::Initial;
        Ok(())
    }

    fn begin_command_buffer(&self, buffer: CommandBufferHandle) -> RenderResult<()> {
        let mut state = self.shared.lock();
        let current = state.command_buffer_mut(buffer.as_raw())?;
        match *current {
            CommandBufferState::Recording | CommandBufferState::Pending => {
                Err(RenderError::Validation(format!("begin on a {current:?} command buffer")))
            }
            _ => {
                *current = CommandBufferState::Recording;
                Ok(())
            }
        }
    }

    fn end_command_buffer(&self, buffer: CommandBufferHandle) -> RenderResult<()> {
        let mut state = self.shared.lock();
        let current = state.command_buffer_mut(buffer.as_raw())?;
        if *current != CommandBufferState::Recording {
            return Err(RenderError::Validation(format!("end on a {current:?} command buffer")));
        }
        *current = CommandBufferState::Executable;
        Ok(())
    }

    fn submit(&self, info: &SubmitInfo) -> RenderResult<()> {
        let mut state = self.shared.lock();
        state.check_alive()?;

        if *state.command_buffer_mut(info.command_buffer.as_raw())? != CommandBufferState::Executable {
            return Err(RenderError::Validation(
                "submitted command buffer is not executable".to_string(),
            ));
        }

        if let Some(wait) = info.wait_semaphore {
            let signaled = state.semaphore_mut(wait.as_raw())?;
            if !*signaled {
                return Err(RenderError::Validation(
                    "submission waits on a semaphore nothing has signaled".to_string(),
                ));
            }
            *signaled = false;
        }

        if let Some(fence) = info.fence {
            if *state.fence_mut(fence.as_raw())? {
                return Err(RenderError::Validation(
                    "submission fence is already signaled".to_string(),
                ));
            }
        }

        if let Some(signal) = info.signal_semaphore {
            state.semaphore_mut(signal.as_raw())?;
        }

        *state.command_buffer_mut(info.command_buffer.as_raw())? = CommandBufferState::Pending;
        state.queue.push_back(Submission {
            command_buffer: from_raw(info.command_buffer.as_raw()),
            signal: info.signal_semaphore.map(|s| from_raw(s.as_raw())),
            fence: info.fence.map(|f| from_raw(f.as_raw())),
        });
        state.stats.submits += 1;

        if self.shared.mode == CompletionMode::Immediate {
            state.complete_all();
        }

        self.shared.changed.notify_all();
        Ok(())
    }

    fn wait_idle(&self) -> RenderResult<()> {
        let mut state = self.shared.lock();
        state.check_alive()?;
        state.complete_all();
        self.shared.changed.notify_all();
        Ok(())
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBinding],
    ) -> RenderResult<DescriptorSetLayoutHandle> {
        for (index, binding) in bindings.iter().enumerate() {
            if binding.count == 0 {
                return Err(RenderError::LayoutCreationFailed(format!(
                    "binding slot {} has zero descriptors",
                    binding.slot
                )));
            }
            if bindings[..index].iter().any(|other| other.slot == binding.slot) {
                return Err(RenderError::LayoutCreationFailed(format!(
                    "duplicate binding slot {}",
                    binding.slot
                )));
            }
        }

        let mut state = self.shared.lock();
        let layout = state.insert(Object::Layout {
            bindings: bindings.to_vec(),
        });
        Ok(DescriptorSetLayoutHandle::from_raw(layout))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        self.destroy(layout.as_raw(), "descriptor set layout");
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[PoolSize],
    ) -> RenderResult<DescriptorPoolHandle> {
        if max_sets == 0 || sizes.is_empty() {
            return Err(RenderError::creation_failed(
                "descriptor pool",
                "pool needs at least one set and one descriptor kind",
            ));
        }

        let mut state = self.shared.lock();
        let pool = state.insert(Object::DescriptorPool(PoolState {
            capacity_sets: max_sets,
            remaining_sets: max_sets,
            capacity: sizes.to_vec(),
            remaining: sizes.to_vec(),
            sets: Vec::new(),
        }));
        state.stats.descriptor_pools_created += 1;
        Ok(DescriptorPoolHandle::from_raw(pool))
    }

    fn reset_descriptor_pool(&self, pool: DescriptorPoolHandle) -> RenderResult<()> {
        let mut state = self.shared.lock();
        let pool = state.pool_mut(pool.as_raw())?;
        let sets = std::mem::take(&mut pool.sets);
        pool.remaining_sets = pool.capacity_sets;
        pool.remaining.clone_from(&pool.capacity);

        for set in sets {
            state.objects.remove(set);
        }
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        let mut state = self.shared.lock();
        if let Some(Object::DescriptorPool(pool)) = state.destroy(pool.as_raw(), "descriptor pool") {
            for set in pool.sets {
                state.objects.remove(set);
            }
        }
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> RenderResult<SetAllocation> {
        let mut state = self.shared.lock();

        let mut needs: Vec<(DescriptorKind, u32)> = Vec::new();
        match state.get_mut(layout.as_raw(), "descriptor set layout")? {
            Object::Layout { bindings } => {
                for binding in bindings.iter() {
                    match needs.iter_mut().find(|(kind, _)| *kind == binding.kind) {
                        Some((_, count)) => *count += binding.count,
                        None => needs.push((binding.kind, binding.count)),
                    }
                }
            }
            other => return Err(mismatch("descriptor set layout", other)),
        }

        let pool_state = state.pool_mut(pool.as_raw())?;
        let fits = pool_state.remaining_sets > 0
            && needs.iter().all(|(kind, count)| {
                pool_state
                    .remaining
                    .iter()
                    .any(|size| size.kind == *kind && size.count >= *count)
            });
        if !fits {
            return Ok(SetAllocation::PoolExhausted);
        }

        pool_state.remaining_sets -= 1;
        for (kind, count) in &needs {
            if let Some(size) = pool_state.remaining.iter_mut().find(|size| size.kind == *kind) {
                size.count -= count;
            }
        }

        let set = state.objects.insert(Object::DescriptorSet);
        state.pool_mut(pool.as_raw())?.sets.push(set);
        state.stats.descriptor_sets_allocated += 1;
        Ok(SetAllocation::Allocated(DescriptorSetHandle::from_raw(to_raw(set))))
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        let mut state = self.shared.lock();
        for write in writes {
            if !state.exists(write.set.as_raw()) {
                log::warn!("Descriptor write to unknown set {:?}", write.set);
                continue;
            }
            state.stats.descriptor_writes += 1;
        }
        state.stats.descriptor_updates += 1;
    }

    fn create_image_view(
        &self,
        image: ImageHandle,
        _format: TextureFormat,
        _aspect: ImageAspect,
    ) -> RenderResult<ImageViewHandle> {
        let mut state = self.shared.lock();
        match state.get_mut(image.as_raw(), "image")? {
            Object::Image => {}
            other => return Err(mismatch("image", other)),
        }
        Ok(ImageViewHandle::from_raw(state.insert(Object::ImageView)))
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        self.destroy(view.as_raw(), "image view");
    }

    fn create_depth_image(
        &self,
        extent: Extent2D,
        format: TextureFormat,
    ) -> RenderResult<AllocatedImage> {
        if !format.is_depth() {
            return Err(RenderError::creation_failed(
                "depth image",
                format!("{format:?} is not a depth format"),
            ));
        }
        if extent.is_zero() {
            return Err(RenderError::creation_failed("depth image", "zero extent"));
        }

        let mut state = self.shared.lock();
        let image = state.insert(Object::Image);
        let memory = state.insert(Object::Memory);
        Ok(AllocatedImage {
            image: ImageHandle::from_raw(image),
            memory: DeviceMemoryHandle::from_raw(memory),
        })
    }

    fn destroy_depth_image(&self, image: AllocatedImage) {
        let mut state = self.shared.lock();
        state.destroy(image.image.as_raw(), "image");
        state.destroy(image.memory.as_raw(), "device memory");
    }

    fn create_render_pass(
        &self,
        color: TextureFormat,
        depth: Option<TextureFormat>,
    ) -> RenderResult<RenderPassHandle> {
        if color.is_depth() || depth.is_some_and(|format| !format.is_depth()) {
            return Err(RenderError::creation_failed(
                "render pass",
                "attachment formats do not match their roles",
            ));
        }

        let mut state = self.shared.lock();
        Ok(RenderPassHandle::from_raw(state.insert(Object::RenderPass)))
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        self.destroy(render_pass.as_raw(), "render pass");
    }

    fn create_framebuffer(
        &self,
        render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        extent: Extent2D,
    ) -> RenderResult<FramebufferHandle> {
        let mut state = self.shared.lock();
        if !state.exists(render_pass.as_raw()) {
            return Err(unknown("render pass", render_pass.as_raw()));
        }
        if let Some(missing) = attachments.iter().find(|view| !state.exists(view.as_raw())) {
            return Err(unknown("image view", missing.as_raw()));
        }
        if extent.is_zero() {
            return Err(RenderError::creation_failed("framebuffer", "zero extent"));
        }

        Ok(FramebufferHandle::from_raw(state.insert(Object::Framebuffer)))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        self.destroy(framebuffer.as_raw(), "framebuffer");
    }

    fn create_shader_module(&self, code: &[u32]) -> RenderResult<ShaderModuleHandle> {
        if code.first() != Some(&SPIRV_MAGIC) {
            return Err(RenderError::creation_failed("shader module", "invalid SPIR-V"));
        }

        let mut state = self.shared.lock();
        Ok(ShaderModuleHandle::from_raw(state.insert(Object::ShaderModule)))
    }

    fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        self.destroy(module.as_raw(), "shader module");
    }
}

/// Controller for the simulated GPU and presentation engine
///
/// Cloneable and `Send`, so a test can drive completion from another thread
/// while the render thread is blocked on a fence.
#[derive(Clone)]
pub struct HeadlessGpu {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for HeadlessGpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessGpu")
            .field("device", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl HeadlessGpu {
    /// Finish the oldest pending submission; returns whether there was one
    pub fn complete_oldest(&self) -> bool {
        let completed = self.shared.lock().complete_oldest();
        self.shared.changed.notify_all();
        completed
    }

    /// Finish every pending submission; returns how many there were
    pub fn complete_all(&self) -> usize {
        let completed = self.shared.lock().complete_all();
        self.shared.changed.notify_all();
        completed
    }

    /// Submissions not yet finished
    pub fn pending_submissions(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Block until some thread is waiting on a fence, or `timeout` elapses
    pub fn wait_until_blocked(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        while state.waiting == 0 {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return state.waiting > 0;
            }
        }
        true
    }

    /// Threads currently blocked on a fence
    pub fn blocked_waiters(&self) -> usize {
        self.shared.lock().waiting
    }

    /// Make every subsequent call report device loss
    pub fn lose_device(&self) {
        self.shared.lock().lost = true;
        self.shared.changed.notify_all();
    }

    /// Mark the surface out of date, as after a window resize
    pub fn invalidate_surface(&self) {
        self.shared.lock().surface.out_of_date = true;
    }

    /// Make the surface dictate `extent` and mark it out of date
    pub fn resize_surface(&self, extent: Extent2D) {
        let mut state = self.shared.lock();
        state.surface.current_extent = Some(extent);
        state.surface.out_of_date = true;
    }

    /// Report acquisitions and presents as suboptimal
    pub fn set_suboptimal(&self, suboptimal: bool) {
        self.shared.lock().surface.suboptimal = suboptimal;
    }

    /// Change the surface's minimum image count for the next swapchain
    pub fn set_min_image_count(&self, count: u32) {
        self.shared.lock().surface.min_image_count = count;
    }

    /// Images in the current swapchain
    pub fn swapchain_image_count(&self) -> usize {
        self.shared.lock().surface.images.len()
    }

    /// Counter snapshot
    pub fn stats(&self) -> HeadlessStats {
        let state = self.shared.lock();
        HeadlessStats {
            live_objects: state.objects.len(),
            ..state.stats
        }
    }
}

/// Simulated presentation engine bound to a [`HeadlessDevice`]
pub struct HeadlessSurface {
    shared: Arc<Shared>,
}

impl HeadlessSurface {
    /// Surface requiring at least `min_image_count` images, with no upper bound
    pub fn new(device: &HeadlessDevice, min_image_count: u32) -> Self {
        let shared = device.shared.clone();
        {
            let mut state = shared.lock();
            state.surface = SurfaceState {
                min_image_count,
                ..SurfaceState::default()
            };
        }
        Self { shared }
    }

    /// Cap the image count the surface accepts
    pub fn with_max_image_count(self, max_image_count: u32) -> Self {
        self.shared.lock().surface.max_image_count = max_image_count;
        self
    }

    /// Make the surface dictate its extent instead of following the window
    pub fn with_fixed_extent(self, extent: Extent2D) -> Self {
        self.shared.lock().surface.current_extent = Some(extent);
        self
    }
}

impl PresentationSurface for HeadlessSurface {
    fn capabilities(&self) -> RenderResult<SurfaceCapabilities> {
        let state = self.shared.lock();
        state.check_alive()?;
        Ok(SurfaceCapabilities {
            min_image_count: state.surface.min_image_count,
            max_image_count: state.surface.max_image_count,
            current_extent: state.surface.current_extent,
            min_extent: Extent2D::new(1, 1),
            max_extent: Extent2D::new(16384, 16384),
        })
    }

    fn create_swapchain(&mut self, request: &SwapchainRequest) -> RenderResult<SwapchainImages> {
        let mut state = self.shared.lock();
        state.check_alive()?;

        let surface = &state.surface;
        if request.image_count < surface.min_image_count
            || (surface.max_image_count > 0 && request.image_count > surface.max_image_count)
        {
            return Err(RenderError::creation_failed(
                "swapchain",
                format!("{} images outside the surface limits", request.image_count),
            ));
        }
        if request.extent.is_zero() {
            return Err(RenderError::creation_failed("swapchain", "zero extent"));
        }

        state.destroy_surface_images();
        let images: Vec<ObjectKey> = (0..request.image_count)
            .map(|_| state.objects.insert(Object::Image))
            .collect();
        state.surface.images.clone_from(&images);
        state.surface.out_of_date = false;
        state.stats.swapchains_created += 1;

        Ok(SwapchainImages {
            images: images.into_iter().map(|key| ImageHandle::from_raw(to_raw(key))).collect(),
            format: request.format,
            extent: request.extent,
        })
    }

    fn destroy_swapchain(&mut self) {
        self.shared.lock().destroy_surface_images();
    }

    fn acquire_next_image(
        &mut self,
        signal: SemaphoreHandle,
        _timeout: Duration,
    ) -> RenderResult<AcquiredImage> {
        let mut state = self.shared.lock();
        state.check_alive()?;

        if state.surface.out_of_date || state.surface.images.is_empty() {
            return Err(RenderError::SurfaceStale);
        }

        let signaled = state.semaphore_mut(signal.as_raw())?;
        if *signaled {
            return Err(RenderError::Validation(
                "acquire would signal an already signaled semaphore".to_string(),
            ));
        }
        *signaled = true;

        let count = u32::try_from(state.surface.images.len()).unwrap_or(u32::MAX);
        let index = state.surface.next_image;
        state.surface.next_image = (index + 1) % count;
        state.stats.acquires += 1;

        Ok(AcquiredImage {
            index,
            suboptimal: state.surface.suboptimal,
        })
    }

    fn present(&mut self, image_index: u32, _wait: SemaphoreHandle) -> RenderResult<PresentStatus> {
        let mut state = self.shared.lock();
        state.check_alive()?;

        if state.surface.out_of_date {
            return Err(RenderError::SurfaceStale);
        }
        if image_index as usize >= state.surface.images.len() {
            return Err(RenderError::Validation(format!(
                "present of image {image_index} outside the swapchain"
            )));
        }

        state.stats.presents += 1;
        Ok(if state.surface.suboptimal {
            PresentStatus::Suboptimal
        } else {
            PresentStatus::Optimal
        })
    }
}

/// Scripted window
///
/// `wait_events` applies the next queued extent, which is how tests model a
/// minimized window being restored. A window built with
/// [`tracking_surface`](Self::tracking_surface) also pushes every extent it
/// takes on to the surface, the way a compositor resizes the presentation
/// surface along with the window.
#[derive(Debug, Clone)]
pub struct HeadlessWindow {
    extent: Extent2D,
    pending: VecDeque<Extent2D>,
    wait_calls: u32,
    surface: Option<HeadlessGpu>,
}

impl HeadlessWindow {
    /// Window with the given drawable size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: Extent2D::new(width, height),
            pending: VecDeque::new(),
            wait_calls: 0,
            surface: None,
        }
    }

    /// Make the surface behind `gpu` follow this window's extent
    #[must_use]
    pub fn tracking_surface(mut self, gpu: &HeadlessGpu) -> Self {
        self.surface = Some(gpu.clone());
        self
    }

    /// Change the drawable size immediately
    pub fn set_extent(&mut self, width: u32, height: u32) {
        self.apply(Extent2D::new(width, height));
    }

    fn apply(&mut self, extent: Extent2D) {
        self.extent = extent;
        if let Some(gpu) = &self.surface {
            gpu.resize_surface(extent);
        }
    }

    /// Drawable size to switch to on the next `wait_events`
    pub fn queue_extent(&mut self, width: u32, height: u32) {
        self.pending.push_back(Extent2D::new(width, height));
    }

    /// Number of `wait_events` calls so far
    pub const fn wait_calls(&self) -> u32 {
        self.wait_calls
    }
}

impl WindowSurface for HeadlessWindow {
    fn framebuffer_extent(&self) -> Extent2D {
        self.extent
    }

    fn wait_events(&mut self) {
        self.wait_calls += 1;
        if let Some(next) = self.pending.pop_front() {
            self.apply(next);
        }
    }
}
