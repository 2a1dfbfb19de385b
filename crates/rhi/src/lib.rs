//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Thin owning wrappers over `ash`. Every GPU object is a Rust value whose
//! `Drop` releases it, and everything holds an `Arc<Device>`, so the device
//! outlives all of them. It handles:
//! - Instance, adapter selection and logical device creation
//! - Memory type selection, buffers, images, textures and samplers
//! - Command pools and one-shot uploads
//! - Swapchain, render pass, framebuffers and synchronization objects
//! - Descriptor sets, shader modules and the graphics pipeline

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
