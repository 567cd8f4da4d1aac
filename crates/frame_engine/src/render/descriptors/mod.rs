//! Descriptor set layouts, allocation and updates
//!
//! - [`DescriptorLayoutBuilder`] declares a binding schema and realizes it as an
//!   immutable [`DescriptorSetLayout`]
//! - [`DescriptorAllocator`] draws sets from recyclable sub-pools
//! - [`DescriptorWriter`] batches resource bindings onto a set

pub mod allocator;
pub mod layout;
pub mod writer;

pub use allocator::{AllocatorStats, DescriptorAllocator};
pub use layout::{DescriptorLayoutBuilder, DescriptorSetLayout};
pub use writer::DescriptorWriter;
