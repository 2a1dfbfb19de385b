//! Asset loading for the ember engine.
//!
//! This crate turns files on disk into the plain data the renderer uploads:
//! - OBJ mesh loading with exact-equality vertex deduplication
//! - PNG/JPEG decoding to RGBA8
//! - Built-in cube and checkerboard used when no assets are configured

mod error;
pub mod mesh;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use mesh::{MeshData, dedup_vertices, load_obj};
pub use texture::{TextureData, load_rgba};
