//! Frame scheduling and GPU resource lifecycle.
//!
//! This crate turns the RHI building blocks into a running engine:
//! - [`FrameScheduler`] drives the acquire/record/submit/present ring
//! - [`RenderTargets`] owns everything rebuilt when the swapchain goes stale
//! - [`Engine`] creates, owns and tears down all GPU objects

mod error;

pub mod engine;
pub mod frame;
pub mod scheduler;
pub mod targets;
pub mod ubo;

pub use engine::{Engine, EngineAssets};
pub use error::{EngineError, EngineResult};
pub use scheduler::{FrameBackend, FrameOutcome, FrameScheduler};
pub use targets::RenderTargets;
pub use ubo::UniformBufferObject;

pub use ember_rhi::vk;

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
