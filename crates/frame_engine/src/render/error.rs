//! Render error types
//!
//! Every fallible operation in the render core returns [`RenderResult`]. Errors
//! fall into the taxonomy reported by [`RenderError::kind`]: only
//! [`ErrorKind::SurfaceStale`] is recoverable, and it is recovered locally by
//! rebuilding the swapchain. Everything else is fatal for the session.

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::foundation::collections::BufferError;

/// Coarse classification of a [`RenderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Host or device memory exhaustion
    AllocationFailed,
    /// The device rejected a create call
    ResourceCreationFailed,
    /// The presentation target no longer matches the window
    SurfaceStale,
    /// The device stopped responding or a completion wait timed out
    DeviceLost,
    /// An index passed into a growable buffer was out of range
    OutOfRangeAccess,
    /// The API was driven in an order it does not allow
    Usage,
}

/// Render system errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// Host or device memory could not be allocated
    #[error("Allocation failed: {what}")]
    AllocationFailed {
        /// What was being allocated
        what: String,
    },

    /// The device rejected a resource creation call
    #[error("Failed to create {resource}: {reason}")]
    ResourceCreationFailed {
        /// Kind of resource
        resource: &'static str,
        /// Backend-provided reason
        reason: String,
    },

    /// Descriptor set layout was rejected (duplicate slot, unsupported kind)
    #[error("Descriptor set layout creation failed: {0}")]
    LayoutCreationFailed(String),

    /// A descriptor sub-pool could not be created
    #[error("Descriptor pool creation failed: {0}")]
    PoolCreationFailed(String),

    /// Every attempt allowed by the retry bound hit an exhausted sub-pool
    #[error("Descriptor pools exhausted after {attempts} attempts")]
    DescriptorPoolExhausted {
        /// Number of sub-pools tried
        attempts: u32,
    },

    /// Surface is out of date or suboptimal and must be rebuilt
    #[error("Presentation surface is stale")]
    SurfaceStale,

    /// Device lost, or a completion wait exceeded its timeout
    #[error("Device lost: {reason}")]
    DeviceLost {
        /// What was being waited on, or the backend's report
        reason: String,
    },

    /// A completion wait timed out; treated as device loss
    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout {
        /// What was being waited on
        what: &'static str,
        /// The timeout that expired
        waited: Duration,
    },

    /// Invalid index into a growable buffer
    #[error("Out of range access: {0}")]
    OutOfRange(BufferError),

    /// A frame slot was driven out of order
    #[error("Frame slot {slot} is {actual}, expected {expected}")]
    InvalidFrameState {
        /// Ring slot index
        slot: usize,
        /// State the operation requires
        expected: &'static str,
        /// State the slot is actually in
        actual: &'static str,
    },

    /// `clear_pools` was called while sets may still be referenced by the GPU
    #[error("Descriptor pools still referenced by frame {pending}, completed up to {completed}")]
    PoolInUse {
        /// Newest frame generation that referenced the pools
        pending: u64,
        /// Newest frame generation known to be complete
        completed: u64,
    },

    /// The backend rejected a call made in an invalid object state
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration was rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for render operations
pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    /// Shorthand for [`RenderError::ResourceCreationFailed`]
    pub fn creation_failed(resource: &'static str, reason: impl Into<String>) -> Self {
        Self::ResourceCreationFailed {
            resource,
            reason: reason.into(),
        }
    }

    /// Shorthand for [`RenderError::DeviceLost`]
    pub fn device_lost(reason: impl Into<String>) -> Self {
        Self::DeviceLost {
            reason: reason.into(),
        }
    }

    /// Map this error onto the error taxonomy
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AllocationFailed { .. } | Self::DescriptorPoolExhausted { .. } => {
                ErrorKind::AllocationFailed
            }
            Self::ResourceCreationFailed { .. }
            | Self::LayoutCreationFailed(_)
            | Self::PoolCreationFailed(_) => ErrorKind::ResourceCreationFailed,
            Self::SurfaceStale => ErrorKind::SurfaceStale,
            Self::DeviceLost { .. } | Self::Timeout { .. } => ErrorKind::DeviceLost,
            Self::OutOfRange(BufferError::OutOfRange { .. }) => ErrorKind::OutOfRangeAccess,
            Self::OutOfRange(BufferError::AllocationFailed { .. }) => ErrorKind::AllocationFailed,
            Self::InvalidFrameState { .. }
            | Self::PoolInUse { .. }
            | Self::Validation(_)
            | Self::Config(_) => ErrorKind::Usage,
        }
    }

    /// Whether the session can continue after this error
    pub const fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::SurfaceStale)
    }
}

impl From<BufferError> for RenderError {
    fn from(error: BufferError) -> Self {
        match error {
            BufferError::AllocationFailed { requested } => Self::AllocationFailed {
                what: format!("growable buffer of {requested} elements"),
            },
            other @ BufferError::OutOfRange { .. } => Self::OutOfRange(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_stale_surface_is_recoverable() {
        assert!(RenderError::SurfaceStale.is_recoverable());
        assert!(!RenderError::device_lost("gone").is_recoverable());
        assert!(!RenderError::Timeout { what: "fence", waited: Duration::from_secs(1) }.is_recoverable());
        assert!(!RenderError::LayoutCreationFailed("dup".into()).is_recoverable());
    }

    #[test]
    fn test_timeout_is_device_lost() {
        let error = RenderError::Timeout { what: "frame fence", waited: Duration::from_millis(5) };
        assert_eq!(error.kind(), ErrorKind::DeviceLost);
    }

    #[test]
    fn test_buffer_errors_convert_by_kind() {
        let error: RenderError = BufferError::OutOfRange { index: 3, count: 1 }.into();
        assert_eq!(error.kind(), ErrorKind::OutOfRangeAccess);

        let error: RenderError = BufferError::AllocationFailed { requested: 64 }.into();
        assert_eq!(error.kind(), ErrorKind::AllocationFailed);
    }
}
