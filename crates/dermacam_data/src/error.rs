//! Error types for dermacam_data.

use thiserror::Error;

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur while turning uploaded bytes into a tensor.
#[derive(Error, Debug)]
pub enum DataError {
    /// The bytes could not be parsed as an image.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The decoded image has a colour mode that cannot be converted to RGB.
    #[error("Unsupported colour mode: {0}")]
    UnsupportedMode(String),

    /// Resizing or array conversion failed.
    #[error("Preprocess error: {0}")]
    Preprocess(String),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] dermacam_core::CoreError),
}

impl From<image::ImageError> for DataError {
    fn from(err: image::ImageError) -> Self {
        Self::Decode(err.to_string())
    }
}
