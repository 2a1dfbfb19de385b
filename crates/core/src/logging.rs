//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,ember=debug,ember_rhi=debug,ember_renderer=debug";

/// Install the global `tracing` subscriber.
///
/// Honours `RUST_LOG` when present and falls back to [`DEFAULT_FILTER`].
/// Calling this twice is harmless; the second install is ignored.
///
/// # Example
/// ```
/// ember_core::init_logging();
/// tracing::info!("engine starting");
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
