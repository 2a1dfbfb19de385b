//! Platform layer for the ember engine.
//!
//! - Window creation via winit
//! - Vulkan surface creation and the instance extensions it needs
//! - [`ExtentSource`], the framebuffer size seen by swapchain recreation

mod window;

pub use window::{
    EXTENT_POLL_INTERVAL, ExtentSource, Surface, Window, is_zero_extent, required_extensions,
};

// Re-export winit types that users might need
pub use winit::event::{Event, WindowEvent};
pub use winit::event_loop::EventLoop;
