//! # dermacam_core
//!
//! Core types and traits for dermacam skin-lesion classification.
//!
//! This crate provides:
//! - [`ImageTensor`] and [`ImageShape`] for normalized RGB images
//! - [`PixelScale`], the value-range contract between normalizer and model
//! - [`LesionClass`], the fixed nine-label diagnostic set
//! - [`ClassProbabilities`] and ranked [`Prediction`]s
//! - [`LesionClassifier`], the contract the Grad-CAM explainer consumes
//! - [`Seed`] for deterministic weight initialisation
//!
//! ## Shape Convention
//!
//! Images follow `(H, W, C)` with RGB channel order. Models consume
//! single-image batches in Burn's `(N, C, H, W)` layout, produced by
//! [`ImageTensor::to_batch`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod labels;
mod model_trait;
mod prediction;
mod seed;
mod shape;
mod tensor;

pub use error::{CoreError, Result};
pub use labels::{LesionClass, NUM_CLASSES};
pub use model_trait::{LayerCapture, LesionClassifier};
pub use prediction::{ClassProbabilities, Prediction};
pub use seed::Seed;
pub use shape::{ImageShape, IMAGE_CHANNELS, IMAGE_SIZE};
pub use tensor::{ImageTensor, PixelScale};

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    #[cfg(feature = "backend-ndarray")]
    pub use burn_autodiff::Autodiff;

    /// Backend the classifier differentiates on.
    #[cfg(feature = "backend-ndarray")]
    pub type GradBackend = Autodiff<NdArray>;
}
