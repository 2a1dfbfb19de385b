//! Fatal engine errors.
//!
//! Everything here ends the render loop. A stale swapchain is not an error;
//! it is reported through [`FrameOutcome`](crate::FrameOutcome).

use thiserror::Error;

use ember_resources::ResourceError;
use ember_rhi::RhiError;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A GPU object could not be created. `object` names which one.
    #[error("Failed to create {object}: {source}")]
    Creation {
        object: &'static str,
        #[source]
        source: RhiError,
    },

    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Core(#[from] ember_core::Error),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Tags an RHI failure with the object being created.
pub(crate) trait CreationContext<T> {
    fn creating(self, object: &'static str) -> EngineResult<T>;
}

impl<T> CreationContext<T> for Result<T, RhiError> {
    fn creating(self, object: &'static str) -> EngineResult<T> {
        self.map_err(|source| EngineError::Creation { object, source })
    }
}
