//! # dermacam_explain
//!
//! Explainability for the lesion classifier.
//!
//! - [`GradCam`] - gradient-weighted class activation maps for the
//!   top-predicted class
//! - [`SaliencyMap`] - a heatmap over the model input in `[0, 1]`
//! - [`OverlayRenderer`] - jet false-colour overlay, PNG and base64 output

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attribution;
mod error;
pub mod gradcam;
pub mod overlay;

pub use attribution::{grad_cam, SaliencyMap};
pub use error::{ExplainError, Result};
pub use gradcam::{Explanation, GradCam, GradCamConfig};
pub use overlay::{encode_png, jet, OverlayConfig, OverlayLayout, OverlayRenderer};
