//! The predict+explain pipeline behind the HTTP handlers.

use std::time::Instant;

use dermacam_core::backend::{GradBackend, NdArray};
use dermacam_core::{ClassProbabilities, LesionClassifier, Prediction};
use dermacam_data::ImageNormalizer;
use dermacam_explain::{GradCam, OverlayRenderer, SaliencyMap};
use dermacam_models::DermNetClassifier;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{ServeConfig, TOP_K};
use crate::error::{PipelineError, ServeError};

/// Classifier object the service runs, on the inference backend.
pub type BoxedClassifier = Box<dyn LesionClassifier<NdArray>>;

/// Result of analysing one image.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    /// Top classes, most probable first.
    pub predictions: Vec<Prediction>,
    /// Full probability vector.
    pub probabilities: ClassProbabilities,
    /// Heatmap for the top class.
    pub saliency: SaliencyMap,
    /// Base64 PNG overlay.
    pub visualization: String,
}

/// Normalizer, classifier and explainer wired together.
///
/// The classifier is not `Sync`; calls are serialized through a mutex held
/// for one prediction and its explanation.
pub struct DiagnosisService {
    normalizer: ImageNormalizer,
    classifier: Mutex<BoxedClassifier>,
    explainer: GradCam,
    renderer: OverlayRenderer,
    target_layer: String,
    weights: &'static str,
}

impl std::fmt::Debug for DiagnosisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosisService")
            .field("normalizer", &self.normalizer)
            .field("target_layer", &self.target_layer)
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

impl DiagnosisService {
    /// Wire a classifier into the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::ScaleMismatch`] if the normalizer's pixel scale
    /// differs from the classifier's input scale.
    pub fn new(
        classifier: BoxedClassifier,
        config: &ServeConfig,
        weights: &'static str,
    ) -> Result<Self, ServeError> {
        let normalizer = config.normalizer.init();
        if normalizer.scale() != classifier.input_scale() {
            return Err(ServeError::ScaleMismatch {
                normalizer: normalizer.scale(),
                classifier: classifier.input_scale(),
            });
        }

        let target_layer = classifier.target_layer().to_string();
        info!(
            layer = %target_layer,
            scale = %normalizer.scale(),
            weights,
            "Diagnosis service ready"
        );

        Ok(Self {
            normalizer,
            classifier: Mutex::new(classifier),
            explainer: config.gradcam.init(),
            renderer: config.overlay.init(),
            target_layer,
            weights,
        })
    }

    /// Wire a DermNet classifier into the pipeline.
    pub fn from_dermnet(
        classifier: DermNetClassifier<GradBackend>,
        config: &ServeConfig,
    ) -> Result<Self, ServeError> {
        let weights = classifier.weights_source().as_str();
        Self::new(Box::new(classifier), config, weights)
    }

    /// Layer the heatmaps are computed at.
    pub fn target_layer(&self) -> &str {
        &self.target_layer
    }

    /// `"loaded"` or `"fresh"`.
    pub fn weights(&self) -> &'static str {
        self.weights
    }

    /// Decode, classify and explain one uploaded image.
    ///
    /// The ranking and the heatmap come from the same forward pass.
    pub fn analyze(&self, bytes: &[u8]) -> Result<Diagnosis, PipelineError> {
        let start = Instant::now();
        let image = self.normalizer.normalize(bytes)?;

        let explanation = {
            let classifier = self.classifier.lock();
            self.explainer.explain::<NdArray>(&**classifier, &image)?
        };

        let probabilities = explanation.probabilities;
        let predictions = probabilities.top_k(TOP_K);
        let visualization = self
            .renderer
            .render_base64(&image, &explanation.saliency)?;

        if let Some(top) = predictions.first() {
            info!(
                class = %top.class,
                probability = top.probability,
                degenerate = explanation.saliency.is_degenerate(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Analyzed image"
            );
        }
        debug!(bytes = bytes.len(), png_b64 = visualization.len(), "Rendered overlay");

        Ok(Diagnosis {
            predictions,
            probabilities,
            saliency: explanation.saliency,
            visualization,
        })
    }
}
