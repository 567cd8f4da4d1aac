//! Conversions between the collaborator vocabulary and ash types

use ash::vk::{self, Handle};

use crate::render::api::{
    DescriptorKind, Extent2D, ImageAspect, ImageLayout, PresentMode, ShaderStages, TextureFormat,
};
use crate::render::error::RenderError;

/// Map a failed `vk::Result` to a render error for `resource`
pub fn vk_error(resource: &'static str, result: vk::Result) -> RenderError {
    match result {
        vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::ERROR_SURFACE_LOST_KHR => {
            RenderError::SurfaceStale
        }
        vk::Result::ERROR_DEVICE_LOST => RenderError::device_lost(format!("{resource}: {result:?}")),
        vk::Result::TIMEOUT | vk::Result::NOT_READY => RenderError::Timeout {
            what: resource,
            waited: std::time::Duration::ZERO,
        },
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            RenderError::AllocationFailed {
                what: resource.to_string(),
            }
        }
        other => RenderError::creation_failed(resource, format!("{other:?}")),
    }
}

/// Closure form of [`vk_error`] for `map_err`
pub fn vk_err(resource: &'static str) -> impl Fn(vk::Result) -> RenderError {
    move |result| vk_error(resource, result)
}

pub fn format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::D32Float => vk::Format::D32_SFLOAT,
        TextureFormat::D24UnormS8 => vk::Format::D24_UNORM_S8_UINT,
    }
}

/// Inverse of [`format`] for the formats the engine knows about
pub fn texture_format(format: vk::Format) -> Option<TextureFormat> {
    match format {
        vk::Format::B8G8R8A8_SRGB => Some(TextureFormat::Bgra8Srgb),
        vk::Format::B8G8R8A8_UNORM => Some(TextureFormat::Bgra8Unorm),
        vk::Format::R8G8B8A8_SRGB => Some(TextureFormat::Rgba8Srgb),
        vk::Format::R8G8B8A8_UNORM => Some(TextureFormat::Rgba8Unorm),
        vk::Format::D32_SFLOAT => Some(TextureFormat::D32Float),
        vk::Format::D24_UNORM_S8_UINT => Some(TextureFormat::D24UnormS8),
        _ => None,
    }
}

pub fn descriptor_type(kind: DescriptorKind) -> vk::DescriptorType {
    match kind {
        DescriptorKind::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        DescriptorKind::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorKind::UniformBufferDynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        DescriptorKind::StorageBufferDynamic => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        DescriptorKind::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
    }
}

pub fn shader_stages(stages: ShaderStages) -> vk::ShaderStageFlags {
    vk::ShaderStageFlags::from_raw(stages.bits())
}

pub fn image_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn aspect(aspect: ImageAspect) -> vk::ImageAspectFlags {
    match aspect {
        ImageAspect::Color => vk::ImageAspectFlags::COLOR,
        ImageAspect::Depth => vk::ImageAspectFlags::DEPTH,
    }
}

pub fn present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

pub const fn extent(extent: Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

pub const fn from_vk_extent(extent: vk::Extent2D) -> Extent2D {
    Extent2D::new(extent.width, extent.height)
}

/// Raw value of a Vulkan handle, for the engine's opaque handle types
pub fn raw<H: Handle>(handle: H) -> u64 {
    handle.as_raw()
}

/// Vulkan handle from an engine handle's raw value
pub fn vk_handle<H: Handle>(raw: u64) -> H {
    H::from_raw(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_bits_match_vulkan() {
        assert_eq!(shader_stages(ShaderStages::VERTEX), vk::ShaderStageFlags::VERTEX);
        assert_eq!(shader_stages(ShaderStages::FRAGMENT), vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(shader_stages(ShaderStages::COMPUTE), vk::ShaderStageFlags::COMPUTE);
        assert_eq!(
            shader_stages(ShaderStages::ALL_GRAPHICS),
            vk::ShaderStageFlags::ALL_GRAPHICS
        );
    }

    #[test]
    fn test_format_mapping_is_reversible() {
        for format_kind in [
            TextureFormat::Bgra8Srgb,
            TextureFormat::Bgra8Unorm,
            TextureFormat::Rgba8Srgb,
            TextureFormat::Rgba8Unorm,
            TextureFormat::D32Float,
            TextureFormat::D24UnormS8,
        ] {
            assert_eq!(texture_format(format(format_kind)), Some(format_kind));
        }
        assert_eq!(texture_format(vk::Format::R16G16B16A16_SFLOAT), None);
    }

    #[test]
    fn test_result_mapping() {
        assert!(matches!(
            vk_error("acquire", vk::Result::ERROR_OUT_OF_DATE_KHR),
            RenderError::SurfaceStale
        ));
        assert!(matches!(
            vk_error("submit", vk::Result::ERROR_DEVICE_LOST),
            RenderError::DeviceLost { .. }
        ));
        assert!(matches!(
            vk_error("image", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            RenderError::AllocationFailed { .. }
        ));
        assert!(matches!(
            vk_error("render pass", vk::Result::ERROR_INITIALIZATION_FAILED),
            RenderError::ResourceCreationFailed { resource: "render pass", .. }
        ));
    }
}
