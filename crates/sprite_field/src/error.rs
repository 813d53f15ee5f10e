//! Error types shared by the pipeline stages.

use std::collections::TryReserveError;
use thiserror::Error;

/// Failures that abort the current frame. The pipeline state stays valid and
/// the next frame retries from scratch.
#[derive(Debug, Error)]
pub enum FieldError {
    /// A capacity arena could not grow to hold the frame's samples.
    #[error("failed to grow {what} buffer to {requested} elements")]
    Alloc {
        what: &'static str,
        requested: usize,
        #[source]
        source: TryReserveError,
    },

    /// The sample count does not fit the 32-bit index space of the batch.
    #[error("{samples} samples exceed the index range of a single batch")]
    TooManySamples { samples: usize },

    #[error("viewport must be non-empty, got {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },

    #[error("failed to build worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = FieldError> = std::result::Result<T, E>;

/// Why a draw surface refused a batched submission. Not a pipeline failure:
/// the caller answers it by switching to per-sprite blits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("surface does not support batched geometry")]
    Unsupported,

    #[error("surface rejected the batch: {0}")]
    Rejected(String),
}
