//! # dermacam
//!
//! Skin-lesion classification with visual explanations.
//!
//! dermacam turns an uploaded dermoscopic image into a ranked diagnosis
//! over nine lesion types and a Grad-CAM heatmap showing which regions
//! drove the top prediction:
//!
//! - **Data**: decode any common raster format and normalize to a
//!   `(224, 224, 3)` RGB tensor
//! - **Models**: the DermNet classifier, checkpoint loading and seeded
//!   weight initialisation
//! - **Explainability**: Grad-CAM saliency maps and jet overlays
//! - **Serving**: an axum HTTP service exposing `POST /predict`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dermacam::prelude::*;
//!
//! let device = Default::default();
//! let classifier = load_or_build::<GradBackend>(None, &DermNetConfig::default(), &device)?;
//!
//! let image = normalize(&std::fs::read("lesion.jpg")?)?;
//! let top3 = classifier.predict(&image)?.top_k(3);
//! let explanation = GradCam::default().explain::<NdArray>(&classifier, &image)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default, on `dermacam_core`): CPU backend using ndarray

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use dermacam_core as core;
pub use dermacam_data as data;
pub use dermacam_explain as explain;
pub use dermacam_models as models;
pub use dermacam_serve as serve;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use dermacam::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use dermacam_core::backend::{GradBackend, NdArray};
    pub use dermacam_core::{
        ClassProbabilities, ImageShape, ImageTensor, LayerCapture, LesionClass, LesionClassifier,
        PixelScale, Prediction, Seed, IMAGE_SIZE, NUM_CLASSES,
    };

    // Data
    pub use dermacam_data::{normalize, ImageNormalizer, NormalizerConfig, ResizeFilter};

    // Models
    pub use dermacam_models::{
        load_or_build, DermNet, DermNetClassifier, DermNetConfig, WeightsSource,
    };

    // Explain
    pub use dermacam_explain::{
        Explanation, GradCam, GradCamConfig, OverlayConfig, OverlayLayout, OverlayRenderer,
        SaliencyMap,
    };

    // Serve
    pub use dermacam_serve::{DiagnosisService, ServeConfig};
}
