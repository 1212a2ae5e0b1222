//! # dermacam_data
//!
//! Image ingestion for dermacam: decodes uploaded bytes and normalizes
//! them into the fixed `(224, 224, 3)` RGB tensor the classifier accepts.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dermacam_data::{NormalizerConfig, normalize};
//!
//! let tensor = normalize(&std::fs::read("lesion.jpg")?)?;
//! assert_eq!(tensor.shape(), dermacam_core::ImageShape::MODEL_INPUT);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub mod normalize;

pub use error::{DataError, Result};
pub use normalize::{normalize, ImageNormalizer, NormalizerConfig, ResizeFilter};
