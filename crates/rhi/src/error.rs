//! RHI-specific error types.
//!
//! Every variant here is fatal for the engine. Stale-swapchain conditions are
//! reported through [`crate::swapchain::AcquireOutcome`] and
//! [`crate::swapchain::PresentOutcome`] instead.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// No adapter passed every suitability check
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No memory type matched the filter and property flags
    #[error("No memory type in filter {type_filter:#b} supports {required:?}")]
    NoSuitableMemoryType {
        type_filter: u32,
        required: vk::MemoryPropertyFlags,
    },

    /// None of the candidate formats support the requested features
    #[error("No supported format among {0:?}")]
    NoSupportedFormat(Vec<vk::Format>),

    /// Image layout transition not handled by the engine
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// Shader module error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A caller passed an argument the wrapper cannot honour
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
