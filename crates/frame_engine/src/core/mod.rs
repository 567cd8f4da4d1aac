//! # Core Engine Module
//!
//! Shared configuration for every subsystem. The frame pipeline, descriptor
//! allocator, swapchain lifecycle and Vulkan backend all take their settings
//! from here through constructor arguments rather than global constants.

pub mod config;

// Re-export commonly used config types
pub use config::{
    DescriptorPoolConfig,
    EngineConfig,
    PipelineConfig,
    PoolRatio,
    SwapchainConfig,
    VulkanBackendConfig,
    Config,
    ConfigError,
};
