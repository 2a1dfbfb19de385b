//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Failed to parse an OBJ file.
    #[error("Failed to load OBJ file '{path}': {source}")]
    ObjLoad {
        /// Path to the file that failed to load.
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    /// OBJ file contains no meshes.
    #[error("OBJ file '{0}' contains no meshes")]
    NoMeshes(PathBuf),

    /// A mesh has no texture coordinates, so it cannot be textured.
    #[error("Mesh '{0}' has no texture coordinates")]
    MissingTexCoords(String),

    /// Pixel data does not match the stated dimensions.
    #[error("Texture data is {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    InvalidTextureSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
