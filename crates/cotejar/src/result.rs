//! Result and error types for Cotejar.

use thiserror::Error;

/// Result type for Cotejar operations
pub type CotejarResult<T> = Result<T, CotejarError>;

/// Errors that can occur while evaluating a visual regression
#[derive(Debug, Error)]
pub enum CotejarError {
    /// Baseline and candidate cannot be aligned to comparable dimensions
    #[error(
        "dimension mismatch: baseline {baseline_width}x{baseline_height}, \
         candidate {candidate_width}x{candidate_height} (aspect ratio beyond tolerance)"
    )]
    Normalization {
        /// Baseline width in pixels
        baseline_width: u32,
        /// Baseline height in pixels
        baseline_height: u32,
        /// Candidate width in pixels
        candidate_width: u32,
        /// Candidate height in pixels
        candidate_height: u32,
    },

    /// Artifact read/write failed in the screenshot store
    #[error("storage error: {message}")]
    Storage {
        /// Error message
        message: String,
    },

    /// Stored or supplied bytes do not decode as an image
    #[error("corrupt artifact ({context}): {message}")]
    CorruptArtifact {
        /// Which artifact failed to decode (e.g. "baseline", "candidate")
        context: String,
        /// Decoder error message
        message: String,
    },

    /// Durable baseline index could not be loaded or persisted
    #[error("baseline index error: {message}")]
    BaselineIndex {
        /// Error message
        message: String,
    },

    /// Image processing error (encoding, resampling)
    #[error("image processing failed: {message}")]
    ImageProcessing {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CotejarError {
    /// True when the error is a normalization hard stop (`dimension-mismatch`)
    #[must_use]
    pub const fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::Normalization { .. })
    }
}
