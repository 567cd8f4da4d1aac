//! Frame pacing
//!
//! A fixed ring of [`FrameContext`] slots driven through
//! acquire, record, submit and present by [`FramePipeline`].

pub mod context;
pub mod pipeline;

pub use context::{FrameContext, SlotState};
pub use pipeline::{FramePipeline, FrameStats, FrameToken};
