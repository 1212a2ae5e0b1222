//! Error types for dermacam_models.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building a classifier.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The configured target layer is not one of the network's stages.
    #[error("Unknown target layer '{name}', available: {available:?}")]
    UnknownLayer {
        /// Requested layer name.
        name: String,
        /// Names the network exposes.
        available: Vec<String>,
    },

    /// The configuration describes a network that cannot be built.
    #[error("Invalid model config: {0}")]
    InvalidConfig(String),
}

/// Errors raised by [`crate::load_or_build`].
#[derive(Error, Debug)]
pub enum LoadError {
    /// A weights file exists but could not be read into the network.
    #[error("Corrupt weights file {path}: {reason}")]
    Corrupt {
        /// Path of the offending file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The network could not be built from its configuration.
    #[error(transparent)]
    Model(#[from] ModelError),
}
