//! Error types for dermacam_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur in dermacam_core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid tensor shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// Pixel values outside the range of the declared scale.
    #[error("Pixel value {value} outside the {scale} range")]
    OutOfRange {
        /// Offending value.
        value: f32,
        /// Declared scale.
        scale: crate::PixelScale,
    },

    /// Class index outside the fixed label set.
    #[error("Class index {0} outside the label set")]
    UnknownClass(usize),

    /// Probability vector of the wrong length or with invalid entries.
    #[error("Invalid probabilities: {0}")]
    InvalidProbabilities(String),

    /// The classifier forward pass failed.
    #[error("Prediction failed: {0}")]
    Prediction(String),

    /// The configured target layer does not exist.
    #[error("Target layer '{0}' not found")]
    TargetLayer(String),

    /// The gradient did not reach the captured activation.
    #[error("Gradient error: {0}")]
    Gradient(String),
}
