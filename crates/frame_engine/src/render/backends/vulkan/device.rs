//! [`GpuDevice`] over an ash logical device

use ash::vk;
use std::sync::Arc;
use std::time::Duration;

use super::context::{LogicalDevice, VulkanInstance};
use super::convert::{self, vk_err, vk_error, vk_handle};
use crate::render::api::{
    AllocatedImage, CommandBufferHandle, CommandPoolHandle, DescriptorPayload,
    DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, DescriptorWrite,
    DeviceMemoryHandle, Extent2D, FenceHandle, FramebufferHandle, GpuDevice, ImageAspect,
    ImageHandle, ImageViewHandle, LayoutBinding, PoolSize, RenderPassHandle, SemaphoreHandle,
    SetAllocation, ShaderModuleHandle, SubmitInfo, TextureFormat,
};
use crate::render::error::{RenderError, RenderResult};

fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

/// Vulkan logical device as seen by the render core
pub struct VulkanDevice {
    // Field order is drop order: the logical device goes before the instance.
    logical: Arc<LogicalDevice>,
    instance: Arc<VulkanInstance>,
    name: String,
}

impl VulkanDevice {
    pub(super) fn new(logical: Arc<LogicalDevice>, instance: Arc<VulkanInstance>) -> Self {
        let name = logical.physical.name();
        Self {
            logical,
            instance,
            name,
        }
    }

    /// Raw ash device
    pub fn raw(&self) -> &ash::Device {
        &self.logical.device
    }

    /// Shared logical device
    pub fn logical(&self) -> &Arc<LogicalDevice> {
        &self.logical
    }

    /// Shared instance
    pub fn instance(&self) -> &Arc<VulkanInstance> {
        &self.instance
    }

    /// Record a render pass that only clears its attachments
    ///
    /// The command buffer must be recording; this is the whole frame body of
    /// a clear-screen renderer.
    pub fn record_clear_pass(
        &self,
        command_buffer: CommandBufferHandle,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent2D,
        color: [f32; 4],
        clear_depth: bool,
    ) {
        let mut clear_values = vec![vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        }];
        if clear_depth {
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        }

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(vk_handle(render_pass.as_raw()))
            .framebuffer(vk_handle(framebuffer.as_raw()))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: convert::extent(extent),
            })
            .clear_values(&clear_values);

        let cb: vk::CommandBuffer = vk_handle(command_buffer.as_raw());
        unsafe {
            self.raw()
                .cmd_begin_render_pass(cb, &begin_info, vk::SubpassContents::INLINE);
            self.raw().cmd_end_render_pass(cb);
        }
    }
}

impl GpuDevice for VulkanDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_semaphore(&self) -> RenderResult<SemaphoreHandle> {
        let info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { self.raw().create_semaphore(&info, None) }
            .map_err(vk_err("semaphore"))?;
        Ok(SemaphoreHandle::from_raw(convert::raw(semaphore)))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe {
            self.raw()
                .destroy_semaphore(vk_handle(semaphore.as_raw()), None);
        }
    }

    fn create_fence(&self, signaled: bool) -> RenderResult<FenceHandle> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { self.raw().create_fence(&info, None) }.map_err(vk_err("fence"))?;
        Ok(FenceHandle::from_raw(convert::raw(fence)))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe {
            self.raw().destroy_fence(vk_handle(fence.as_raw()), None);
        }
    }

    fn wait_for_fence(&self, fence: FenceHandle, timeout: Duration) -> RenderResult<()> {
        let fences = [vk_handle::<vk::Fence>(fence.as_raw())];
        match unsafe { self.raw().wait_for_fences(&fences, true, timeout_nanos(timeout)) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RenderError::Timeout {
                what: "fence",
                waited: timeout,
            }),
            Err(err) => Err(vk_error("fence wait", err)),
        }
    }

    fn fence_signaled(&self, fence: FenceHandle) -> RenderResult<bool> {
        unsafe { self.raw().get_fence_status(vk_handle(fence.as_raw())) }
            .map_err(vk_err("fence status"))
    }

    fn reset_fence(&self, fence: FenceHandle) -> RenderResult<()> {
        let fences = [vk_handle::<vk::Fence>(fence.as_raw())];
        unsafe { self.raw().reset_fences(&fences) }.map_err(vk_err("fence reset"))
    }

    fn create_command_pool(&self) -> RenderResult<CommandPoolHandle> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.logical.physical.graphics_family);
        let pool = unsafe { self.raw().create_command_pool(&info, None) }
            .map_err(vk_err("command pool"))?;
        Ok(CommandPoolHandle::from_raw(convert::raw(pool)))
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        unsafe {
            self.raw().destroy_command_pool(vk_handle(pool.as_raw()), None);
        }
    }

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> RenderResult<CommandBufferHandle> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(vk_handle(pool.as_raw()))
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.raw().allocate_command_buffers(&info) }
            .map_err(vk_err("command buffer"))?;

        buffers
            .into_iter()
            .next()
            .map(|cb| CommandBufferHandle::from_raw(convert::raw(cb)))
            .ok_or_else(|| RenderError::creation_failed("command buffer", "driver returned none"))
    }

    fn reset_command_buffer(&self, buffer: CommandBufferHandle) -> RenderResult<()> {
        unsafe {
            self.raw().reset_command_buffer(
                vk_handle(buffer.as_raw()),
                vk::CommandBufferResetFlags::empty(),
            )
        }
        .map_err(vk_err("command buffer reset"))
    }

    fn begin_command_buffer(&self, buffer: CommandBufferHandle) -> RenderResult<()> {
        let info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.raw().begin_command_buffer(vk_handle(buffer.as_raw()), &info) }
            .map_err(vk_err("command buffer begin"))
    }

    fn end_command_buffer(&self, buffer: CommandBufferHandle) -> RenderResult<()> {
        unsafe { self.raw().end_command_buffer(vk_handle(buffer.as_raw())) }
            .map_err(vk_err("command buffer end"))
    }

    fn submit(&self, info: &SubmitInfo) -> RenderResult<()> {
        let command_buffers = [vk_handle::<vk::CommandBuffer>(info.command_buffer.as_raw())];
        let wait: Vec<vk::Semaphore> = info
            .wait_semaphore
            .iter()
            .map(|s| vk_handle(s.as_raw()))
            .collect();
        let wait_stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; wait.len()];
        let signal: Vec<vk::Semaphore> = info
            .signal_semaphore
            .iter()
            .map(|s| vk_handle(s.as_raw()))
            .collect();
        let fence = info
            .fence
            .map_or(vk::Fence::null(), |f| vk_handle(f.as_raw()));

        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal)
            .build();

        self.logical
            .with_queues(|graphics, _| unsafe { self.raw().queue_submit(graphics, &[submit], fence) })
            .map_err(vk_err("queue submit"))
    }

    fn wait_idle(&self) -> RenderResult<()> {
        self.logical
            .with_queues(|_, _| unsafe { self.raw().device_wait_idle() })
            .map_err(vk_err("device wait idle"))
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[LayoutBinding],
    ) -> RenderResult<DescriptorSetLayoutHandle> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding.slot)
                    .descriptor_type(convert::descriptor_type(binding.kind))
                    .descriptor_count(binding.count)
                    .stage_flags(convert::shader_stages(binding.stages))
                    .build()
            })
            .collect();

        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&vk_bindings);
        let layout = unsafe { self.raw().create_descriptor_set_layout(&info, None) }
            .map_err(|e| RenderError::LayoutCreationFailed(format!("{e:?}")))?;
        Ok(DescriptorSetLayoutHandle::from_raw(convert::raw(layout)))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        unsafe {
            self.raw()
                .destroy_descriptor_set_layout(vk_handle(layout.as_raw()), None);
        }
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[PoolSize],
    ) -> RenderResult<DescriptorPoolHandle> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = sizes
            .iter()
            .map(|size| vk::DescriptorPoolSize {
                ty: convert::descriptor_type(size.kind),
                descriptor_count: size.count,
            })
            .collect();

        let info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { self.raw().create_descriptor_pool(&info, None) }
            .map_err(vk_err("descriptor pool"))?;
        Ok(DescriptorPoolHandle::from_raw(convert::raw(pool)))
    }

    fn reset_descriptor_pool(&self, pool: DescriptorPoolHandle) -> RenderResult<()> {
        unsafe {
            self.raw().reset_descriptor_pool(
                vk_handle(pool.as_raw()),
                vk::DescriptorPoolResetFlags::empty(),
            )
        }
        .map_err(vk_err("descriptor pool reset"))
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        unsafe {
            self.raw()
                .destroy_descriptor_pool(vk_handle(pool.as_raw()), None);
        }
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> RenderResult<SetAllocation> {
        let layouts = [vk_handle::<vk::DescriptorSetLayout>(layout.as_raw())];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(vk_handle(pool.as_raw()))
            .set_layouts(&layouts);

        match unsafe { self.raw().allocate_descriptor_sets(&info) } {
            Ok(sets) => sets
                .into_iter()
                .next()
                .map(|set| SetAllocation::Allocated(DescriptorSetHandle::from_raw(convert::raw(set))))
                .ok_or_else(|| RenderError::creation_failed("descriptor set", "driver returned none")),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                Ok(SetAllocation::PoolExhausted)
            }
            Err(err) => Err(vk_error("descriptor set", err)),
        }
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        let mut image_infos = Vec::new();
        let mut buffer_infos = Vec::new();
        let mut targets = Vec::with_capacity(writes.len());

        for write in writes {
            match write.payload {
                DescriptorPayload::Image {
                    view,
                    sampler,
                    layout,
                } => {
                    image_infos.push(vk::DescriptorImageInfo {
                        sampler: sampler.map_or(vk::Sampler::null(), |s| vk_handle(s.as_raw())),
                        image_view: vk_handle(view.as_raw()),
                        image_layout: convert::image_layout(layout),
                    });
                    targets.push((write, true, image_infos.len() - 1));
                }
                DescriptorPayload::Sampler(sampler) => {
                    image_infos.push(vk::DescriptorImageInfo {
                        sampler: vk_handle(sampler.as_raw()),
                        image_view: vk::ImageView::null(),
                        image_layout: vk::ImageLayout::UNDEFINED,
                    });
                    targets.push((write, true, image_infos.len() - 1));
                }
                DescriptorPayload::Buffer {
                    buffer,
                    offset,
                    range,
                } => {
                    buffer_infos.push(vk::DescriptorBufferInfo {
                        buffer: vk_handle(buffer.as_raw()),
                        offset,
                        range,
                    });
                    targets.push((write, false, buffer_infos.len() - 1));
                }
            }
        }

        let vk_writes: Vec<vk::WriteDescriptorSet> = targets
            .iter()
            .map(|&(write, is_image, index)| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_set(vk_handle(write.set.as_raw()))
                    .dst_binding(write.slot)
                    .dst_array_element(0)
                    .descriptor_type(convert::descriptor_type(write.kind));
                if is_image {
                    builder
                        .image_info(std::slice::from_ref(&image_infos[index]))
                        .build()
                } else {
                    builder
                        .buffer_info(std::slice::from_ref(&buffer_infos[index]))
                        .build()
                }
            })
            .collect();

        unsafe {
            self.raw().update_descriptor_sets(&vk_writes, &[]);
        }
    }

    fn create_image_view(
        &self,
        image: ImageHandle,
        format: TextureFormat,
        aspect: ImageAspect,
    ) -> RenderResult<ImageViewHandle> {
        let info = vk::ImageViewCreateInfo::builder()
            .image(vk_handle(image.as_raw()))
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(convert::format(format))
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: convert::aspect(aspect),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { self.raw().create_image_view(&info, None) }
            .map_err(vk_err("image view"))?;
        Ok(ImageViewHandle::from_raw(convert::raw(view)))
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        unsafe {
            self.raw().destroy_image_view(vk_handle(view.as_raw()), None);
        }
    }

    fn create_depth_image(
        &self,
        extent: Extent2D,
        format: TextureFormat,
    ) -> RenderResult<AllocatedImage> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(convert::format(format))
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let device = self.raw();
        let image = unsafe { device.create_image(&info, None) }.map_err(vk_err("depth image"))?;
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let Some(memory_type) = self.logical.physical.find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ) else {
            unsafe { device.destroy_image(image, None) };
            return Err(RenderError::AllocationFailed {
                what: "depth image memory (no suitable memory type)".to_string(),
            });
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                return Err(vk_error("depth image memory", err));
            }
        };

        if let Err(err) = unsafe { device.bind_image_memory(image, memory, 0) } {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            return Err(vk_error("depth image binding", err));
        }

        Ok(AllocatedImage {
            image: ImageHandle::from_raw(convert::raw(image)),
            memory: DeviceMemoryHandle::from_raw(convert::raw(memory)),
        })
    }

    fn destroy_depth_image(&self, image: AllocatedImage) {
        unsafe {
            self.raw().destroy_image(vk_handle(image.image.as_raw()), None);
            self.raw().free_memory(vk_handle(image.memory.as_raw()), None);
        }
    }

    fn create_render_pass(
        &self,
        color: TextureFormat,
        depth: Option<TextureFormat>,
    ) -> RenderResult<RenderPassHandle> {
        let mut attachments = vec![vk::AttachmentDescription::builder()
            .format(convert::format(color))
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build()];

        if let Some(depth) = depth {
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(convert::format(depth))
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .build(),
            );
        }

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if depth.is_some() {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }
        let subpasses = [subpass.build()];

        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependencies = [vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build()];

        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { self.raw().create_render_pass(&info, None) }
            .map_err(vk_err("render pass"))?;
        Ok(RenderPassHandle::from_raw(convert::raw(render_pass)))
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        unsafe {
            self.raw()
                .destroy_render_pass(vk_handle(render_pass.as_raw()), None);
        }
    }

    fn create_framebuffer(
        &self,
        render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        extent: Extent2D,
    ) -> RenderResult<FramebufferHandle> {
        let views: Vec<vk::ImageView> = attachments.iter().map(|v| vk_handle(v.as_raw())).collect();
        let info = vk::FramebufferCreateInfo::builder()
            .render_pass(vk_handle(render_pass.as_raw()))
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { self.raw().create_framebuffer(&info, None) }
            .map_err(vk_err("framebuffer"))?;
        Ok(FramebufferHandle::from_raw(convert::raw(framebuffer)))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        unsafe {
            self.raw()
                .destroy_framebuffer(vk_handle(framebuffer.as_raw()), None);
        }
    }

    fn create_shader_module(&self, code: &[u32]) -> RenderResult<ShaderModuleHandle> {
        let info = vk::ShaderModuleCreateInfo::builder().code(code);
        let module = unsafe { self.raw().create_shader_module(&info, None) }
            .map_err(vk_err("shader module"))?;
        Ok(ShaderModuleHandle::from_raw(convert::raw(module)))
    }

    fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        unsafe {
            self.raw()
                .destroy_shader_module(vk_handle(module.as_raw()), None);
        }
    }
}
