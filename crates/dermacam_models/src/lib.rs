//! # dermacam_models
//!
//! The lesion classifier for dermacam.
//!
//! - [`DermNet`] - a compact convolutional network with named stages
//!   (`block1` .. `blockN`) and a dense head over nine lesion classes
//! - [`DermNetClassifier`] - DermNet behind the
//!   [`LesionClassifier`](dermacam_core::LesionClassifier) contract, with
//!   gradient capture at a configurable stage
//! - [`load_or_build`] - weights from disk, or seeded fresh weights when
//!   no file is present
//! - [`checkpoint`] - save/load helpers and metadata sidecars

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
mod classifier;
pub mod cnn;
mod error;

pub use checkpoint::{
    build_seeded, init_weights, load_or_build, load_record, save_model, CheckpointError,
    CheckpointMetadata, ModelCheckpoint,
};
pub use classifier::{DermNetClassifier, WeightsSource};
pub use cnn::*;
pub use error::{LoadError, ModelError};
