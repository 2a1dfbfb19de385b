//! Scene state feeding the per-frame uniforms.
//!
//! - [`Camera`]: look-at view and Vulkan perspective projection
//! - [`Spin`]: time-driven model rotation

pub mod animation;
pub mod camera;

pub use animation::Spin;
pub use camera::Camera;
