//! # Engine Configuration
//!
//! Every tunable of the frame engine is passed explicitly to constructors
//! through these structures; nothing is read from globals. The tree is
//! serde-serialisable and can be loaded from `.toml` or `.ron` via [`Config`].
//!
//! ## Configuration Categories
//!
//! - **Pipeline**: frames in flight, fence timeout, frame-local descriptor pools
//! - **Swapchain**: surface format, present mode, depth targets, image count slack
//! - **Descriptors**: shared descriptor allocator sizing and retry bound
//! - **Vulkan**: instance metadata, validation layers, extension lists

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::render::api::{DescriptorKind, PresentMode, TextureFormat};

// Re-export from the config module for compatibility
pub use crate::config::{Config, ConfigError};

/// Number of fresh sub-pools an allocation may try after the first one
/// reports exhaustion.
pub const DEFAULT_ALLOCATION_RETRIES: u32 = 1;

/// Default sub-pool size threshold; newly created sub-pools stop growing here.
pub const DEFAULT_MAX_SETS_PER_POOL: u32 = 4092;

/// Upper bound on frames in flight accepted by [`PipelineConfig::validate`].
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Relative share of one descriptor kind in a sub-pool
///
/// A sub-pool sized for `n` sets reserves `ceil(ratio * n)` descriptors of
/// `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolRatio {
    /// Descriptor kind
    pub kind: DescriptorKind,
    /// Descriptors of this kind per set
    pub ratio: f32,
}

impl PoolRatio {
    /// Create a new ratio entry
    pub const fn new(kind: DescriptorKind, ratio: f32) -> Self {
        Self { kind, ratio }
    }

    /// Descriptor count this ratio reserves in a sub-pool of `sets` sets
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn descriptors_for(&self, sets: u32) -> u32 {
        (self.ratio * sets as f32).ceil().max(1.0) as u32
    }
}

/// # Descriptor Pool Configuration
///
/// Sizing policy for a [`DescriptorAllocator`](crate::render::descriptors::DescriptorAllocator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorPoolConfig {
    /// Set count of the first sub-pool
    pub initial_sets: u32,
    /// Size threshold; each new sub-pool doubles until it reaches this
    pub max_sets_per_pool: u32,
    /// Fresh sub-pools to try after the first exhausted one
    pub max_allocation_retries: u32,
    /// Descriptor kind mix per set
    pub ratios: Vec<PoolRatio>,
}

impl DescriptorPoolConfig {
    /// Create a pool configuration for the given initial size and kind mix
    pub fn new(initial_sets: u32, ratios: Vec<PoolRatio>) -> Self {
        Self {
            initial_sets,
            max_sets_per_pool: DEFAULT_MAX_SETS_PER_POOL,
            max_allocation_retries: DEFAULT_ALLOCATION_RETRIES,
            ratios,
        }
    }

    /// Set the sub-pool size threshold
    pub fn with_max_sets_per_pool(mut self, max_sets: u32) -> Self {
        self.max_sets_per_pool = max_sets;
        self
    }

    /// Set the allocation retry bound
    pub fn with_max_allocation_retries(mut self, retries: u32) -> Self {
        self.max_allocation_retries = retries;
        self
    }

    /// Add a descriptor kind to the mix
    pub fn with_ratio(mut self, kind: DescriptorKind, ratio: f32) -> Self {
        self.ratios.push(PoolRatio::new(kind, ratio));
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_sets == 0 {
            return Err("Descriptor pool initial set count must be at least 1".to_string());
        }

        if self.max_sets_per_pool < self.initial_sets {
            return Err(format!(
                "Descriptor pool threshold {} is below the initial size {}",
                self.max_sets_per_pool, self.initial_sets
            ));
        }

        if self.ratios.is_empty() {
            return Err("Descriptor pool needs at least one kind ratio".to_string());
        }

        if let Some(bad) = self.ratios.iter().find(|r| !(r.ratio > 0.0 && r.ratio.is_finite())) {
            return Err(format!("Descriptor ratio for {:?} must be positive", bad.kind));
        }

        Ok(())
    }
}

impl Default for DescriptorPoolConfig {
    fn default() -> Self {
        Self::new(
            64,
            vec![
                PoolRatio::new(DescriptorKind::UniformBuffer, 2.0),
                PoolRatio::new(DescriptorKind::CombinedImageSampler, 2.0),
                PoolRatio::new(DescriptorKind::StorageBuffer, 1.0),
                PoolRatio::new(DescriptorKind::StorageImage, 1.0),
            ],
        )
    }
}

/// # Frame Pipeline Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ring size N; independent of the presentable image count
    pub frames_in_flight: usize,
    /// Bound on the frame fence wait before it counts as device loss
    pub fence_timeout_ms: u64,
    /// Bound on presentable image acquisition
    pub acquire_timeout_ms: u64,
    /// Sizing for each frame's frame-local descriptor allocator
    pub frame_descriptors: DescriptorPoolConfig,
}

impl PipelineConfig {
    /// Create a pipeline configuration with `frames_in_flight` ring slots
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            frames_in_flight,
            fence_timeout_ms: 1000,
            acquire_timeout_ms: 1000,
            frame_descriptors: DescriptorPoolConfig::new(
                16,
                vec![
                    PoolRatio::new(DescriptorKind::UniformBuffer, 1.0),
                    PoolRatio::new(DescriptorKind::CombinedImageSampler, 1.0),
                ],
            )
            .with_max_sets_per_pool(256),
        }
    }

    /// Set maximum frames in flight
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the fence wait timeout
    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout_ms = duration_to_ms(timeout);
        self
    }

    /// Set the image acquisition timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = duration_to_ms(timeout);
        self
    }

    /// Set the frame-local descriptor pool sizing
    pub fn with_frame_descriptors(mut self, descriptors: DescriptorPoolConfig) -> Self {
        self.frame_descriptors = descriptors;
        self
    }

    /// Fence wait timeout as a [`Duration`]
    pub const fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    /// Acquire timeout as a [`Duration`]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.frames_in_flight == 0 {
            return Err("Max frames in flight must be at least 1".to_string());
        }

        if self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(format!(
                "Max frames in flight should not exceed {MAX_FRAMES_IN_FLIGHT}"
            ));
        }

        if self.fence_timeout_ms == 0 {
            return Err("Fence timeout must be non-zero".to_string());
        }

        self.frame_descriptors.validate()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(2)
    }
}

/// # Swapchain Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapchainConfig {
    /// Images requested beyond the surface minimum
    pub extra_images: u32,
    /// Preferred color format
    pub color_format: TextureFormat,
    /// Depth target format; `None` disables depth targets
    pub depth_format: Option<TextureFormat>,
    /// Preferred present mode; FIFO is used when it is unavailable
    pub present_mode: PresentMode,
}

impl SwapchainConfig {
    /// Create a swapchain configuration with the default formats
    pub const fn new() -> Self {
        Self {
            extra_images: 1,
            color_format: TextureFormat::Bgra8Srgb,
            depth_format: Some(TextureFormat::D32Float),
            present_mode: PresentMode::Mailbox,
        }
    }

    /// Set the color format
    pub const fn with_color_format(mut self, format: TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    /// Set or disable the depth format
    pub const fn with_depth_format(mut self, format: Option<TextureFormat>) -> Self {
        self.depth_format = format;
        self
    }

    /// Set the preferred present mode
    pub const fn with_present_mode(mut self, mode: PresentMode) -> Self {
        self.present_mode = mode;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.color_format.is_depth() {
            return Err(format!("{:?} is not a color format", self.color_format));
        }

        if let Some(depth) = self.depth_format {
            if !depth.is_depth() {
                return Err(format!("{depth:?} is not a depth format"));
            }
        }

        Ok(())
    }
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Vulkan Backend Configuration
///
/// Application metadata and instance/device options for the ash backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulkanBackendConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Whether to enable Vulkan validation layers
    pub enable_validation: Option<bool>,
    /// Extra instance extensions beyond what the window requires
    pub instance_extensions: Vec<String>,
    /// Extra device extensions beyond the swapchain extension
    pub device_extensions: Vec<String>,
}

impl VulkanBackendConfig {
    /// Create a new backend configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            enable_validation: None, // Auto-detect based on build type
            instance_extensions: Vec::new(),
            device_extensions: Vec::new(),
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Request an additional instance extension
    pub fn with_instance_extension(mut self, name: impl Into<String>) -> Self {
        self.instance_extensions.push(name.into());
        self
    }

    /// Request an additional device extension
    pub fn with_device_extension(mut self, name: impl Into<String>) -> Self {
        self.device_extensions.push(name.into());
        self
    }

    /// Whether validation layers should be enabled
    ///
    /// Defaults to on in debug builds and off in release builds.
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }

        if let Some(name) = self
            .instance_extensions
            .iter()
            .chain(&self.device_extensions)
            .find(|name| name.is_empty() || name.contains('\0'))
        {
            return Err(format!("Invalid extension name {name:?}"));
        }

        Ok(())
    }
}

impl Default for VulkanBackendConfig {
    fn default() -> Self {
        Self::new("Frame Engine Application")
    }
}

/// # Complete Engine Configuration
///
/// Top-level configuration applications pass to the session and backends.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Frame pipeline configuration
    pub pipeline: PipelineConfig,
    /// Swapchain configuration
    pub swapchain: SwapchainConfig,
    /// Shared descriptor allocator configuration
    pub descriptors: DescriptorPoolConfig,
    /// Vulkan backend configuration
    pub vulkan: VulkanBackendConfig,
}

impl EngineConfig {
    /// Create a new configuration with defaults and the given application name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            vulkan: VulkanBackendConfig::new(app_name),
            ..Self::default()
        }
    }

    /// Set pipeline configuration
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Set swapchain configuration
    pub fn with_swapchain(mut self, swapchain: SwapchainConfig) -> Self {
        self.swapchain = swapchain;
        self
    }

    /// Set shared descriptor pool configuration
    pub fn with_descriptors(mut self, descriptors: DescriptorPoolConfig) -> Self {
        self.descriptors = descriptors;
        self
    }

    /// Set Vulkan backend configuration
    pub fn with_vulkan(mut self, vulkan: VulkanBackendConfig) -> Self {
        self.vulkan = vulkan;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), String> {
        self.pipeline.validate()?;
        self.swapchain.validate()?;
        self.descriptors.validate()?;
        self.vulkan.validate()?;
        Ok(())
    }

    /// Validate, wrapping failures as [`ConfigError::Invalid`]
    pub fn checked(&self) -> Result<&Self, ConfigError> {
        self.validate().map_err(ConfigError::Invalid)?;
        Ok(self)
    }
}

impl Config for EngineConfig {}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.frames_in_flight, 2);
        assert_eq!(config.pipeline.fence_timeout(), Duration::from_secs(1));
        assert_eq!(config.descriptors.max_allocation_retries, DEFAULT_ALLOCATION_RETRIES);
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        assert!(PipelineConfig::new(0).validate().is_err());
        assert!(PipelineConfig::new(MAX_FRAMES_IN_FLIGHT + 1).validate().is_err());
        assert!(PipelineConfig::new(3).validate().is_ok());
    }

    #[test]
    fn test_depth_format_must_be_depth() {
        let config = SwapchainConfig::new().with_depth_format(Some(TextureFormat::Rgba8Unorm));
        assert!(config.validate().is_err());

        let config = SwapchainConfig::new().with_color_format(TextureFormat::D32Float);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pool_ratio_rounds_up() {
        let ratio = PoolRatio::new(DescriptorKind::UniformBuffer, 0.5);
        assert_eq!(ratio.descriptors_for(3), 2);
        assert_eq!(ratio.descriptors_for(0), 1);
    }

    #[test]
    fn test_threshold_below_initial_rejected() {
        let config = DescriptorPoolConfig::default().with_max_sets_per_pool(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");

        let config = EngineConfig::new("toml test")
            .with_pipeline(PipelineConfig::new(3).with_fence_timeout(Duration::from_millis(250)));
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.ron");

        let config = EngineConfig::default()
            .with_swapchain(SwapchainConfig::new().with_depth_format(None));
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.swapchain.depth_format, None);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let result = EngineConfig::default().save_to_file(&path);
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
