//! Error types for dermacam_explain.

use dermacam_core::CoreError;
use thiserror::Error;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors that stop an explanation from being produced.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// The classifier does not expose the requested layer.
    #[error("Target layer unavailable: {0}")]
    TargetLayer(String),

    /// The class score does not depend on the captured activation.
    #[error("Gradient did not reach the target layer: {0}")]
    DisconnectedGradient(String),

    /// Activation and gradient disagree in shape.
    #[error("Activation shape {activations:?} does not match gradient shape {gradients:?}")]
    ShapeMismatch {
        /// Activation dims.
        activations: Vec<usize>,
        /// Gradient dims.
        gradients: Vec<usize>,
    },

    /// The classifier's forward pass failed.
    #[error("Classifier error: {0}")]
    Classifier(CoreError),

    /// Heatmap or overlay rendering failed.
    #[error("Render error: {0}")]
    Render(String),
}

impl From<CoreError> for ExplainError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TargetLayer(layer) => Self::TargetLayer(layer),
            CoreError::Gradient(msg) => Self::DisconnectedGradient(msg),
            other => Self::Classifier(other),
        }
    }
}

impl From<image::ImageError> for ExplainError {
    fn from(err: image::ImageError) -> Self {
        Self::Render(err.to_string())
    }
}
