//! Core utilities for the ember engine.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - TOML configuration

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
