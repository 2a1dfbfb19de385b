//! Error types shared by the engine crates.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for setup work that happens outside the GPU layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors surfaced outside the RHI crate
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or surface errors
    #[error("Window error: {0}")]
    Window(String),

    /// Asset loading errors
    #[error("Resource error: {0}")]
    Resource(String),

    /// Shader bytecode errors
    #[error("Shader error: {0}")]
    Shader(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file could not be parsed
    #[error("Config error in '{path}': {message}")]
    Config { path: PathBuf, message: String },

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the engine's core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
