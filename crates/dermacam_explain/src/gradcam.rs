//! The Grad-CAM explainer.

use burn::prelude::*;
use dermacam_core::{
    ClassProbabilities, ImageTensor, LayerCapture, LesionClass, LesionClassifier, IMAGE_SIZE,
};
use serde::{Deserialize, Serialize};

use crate::attribution::{grad_cam, saliency_from_cam, SaliencyMap};
use crate::error::{ExplainError, Result};

/// Configuration for [`GradCam`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradCamConfig {
    /// Side length of the output heatmap.
    pub output_size: usize,
    /// Maps whose maximum is at or below this are treated as empty.
    pub epsilon: f32,
}

impl Default for GradCamConfig {
    fn default() -> Self {
        Self {
            output_size: IMAGE_SIZE,
            epsilon: f32::EPSILON,
        }
    }
}

impl GradCamConfig {
    /// Set the heatmap size.
    #[must_use]
    pub fn with_output_size(mut self, output_size: usize) -> Self {
        self.output_size = output_size;
        self
    }

    /// Build the explainer.
    pub fn init(&self) -> GradCam {
        GradCam::new(self.clone())
    }
}

/// A heatmap together with the forward pass it explains.
#[derive(Debug, Clone)]
pub struct Explanation {
    /// The heatmap.
    pub saliency: SaliencyMap,
    /// Output of the forward pass the heatmap was computed from.
    pub probabilities: ClassProbabilities,
    /// Layer the heatmap was computed at.
    pub layer: String,
}

impl Explanation {
    /// The explained (top-predicted) class.
    #[must_use]
    pub const fn class(&self) -> LesionClass {
        self.saliency.class()
    }
}

/// Gradient-weighted class activation mapping for the top-predicted class.
#[derive(Debug, Clone, Default)]
pub struct GradCam {
    config: GradCamConfig,
}

impl GradCam {
    /// Create a new explainer.
    pub fn new(config: GradCamConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &GradCamConfig {
        &self.config
    }

    /// Explain the classifier's top prediction for `image`.
    ///
    /// # Errors
    ///
    /// Fails if the classifier cannot capture its target layer, the class
    /// score has no gradient at that layer, or activation and gradient
    /// shapes disagree.
    pub fn explain<B: Backend>(
        &self,
        classifier: &dyn LesionClassifier<B>,
        image: &ImageTensor,
    ) -> Result<Explanation> {
        let capture = classifier.forward_with_gradient(image)?;
        if capture.layer != classifier.target_layer() {
            return Err(ExplainError::TargetLayer(format!(
                "captured '{}' but classifier targets '{}'",
                capture.layer,
                classifier.target_layer()
            )));
        }
        self.explain_capture(capture)
    }

    /// Turn an activation/gradient capture into an explanation.
    pub fn explain_capture<B: Backend>(&self, capture: LayerCapture<B>) -> Result<Explanation> {
        let LayerCapture {
            layer,
            activations,
            gradients,
            class,
            probabilities,
        } = capture;

        let cam = grad_cam(activations, gradients)?;
        let saliency = saliency_from_cam(cam, class, self.config.output_size, self.config.epsilon)?;

        tracing::debug!(
            layer = %layer,
            class = %class,
            degenerate = saliency.is_degenerate(),
            "Computed Grad-CAM"
        );

        Ok(Explanation {
            saliency,
            probabilities,
            layer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use dermacam_core::{CoreError, ImageShape, PixelScale, NUM_CLASSES};
    use dermacam_models::{DermNetClassifier, DermNetConfig};

    type TestBackend = NdArray;

    /// Classifier that returns a fixed capture.
    struct StubClassifier {
        activations: Vec<f32>,
        gradients: Vec<f32>,
        dims: [usize; 4],
        layer: &'static str,
        reported_layer: &'static str,
    }

    impl StubClassifier {
        fn new(activations: Vec<f32>, gradients: Vec<f32>, dims: [usize; 4]) -> Self {
            Self {
                activations,
                gradients,
                dims,
                layer: "block4",
                reported_layer: "block4",
            }
        }

        fn probabilities() -> ClassProbabilities {
            let mut values = [0.05; NUM_CLASSES];
            values[LesionClass::Melanoma.index()] = 0.6;
            ClassProbabilities::new(&values).unwrap()
        }
    }

    impl LesionClassifier<TestBackend> for StubClassifier {
        fn input_scale(&self) -> PixelScale {
            PixelScale::Unit
        }

        fn target_layer(&self) -> &str {
            self.layer
        }

        fn predict(&self, _image: &ImageTensor) -> dermacam_core::Result<ClassProbabilities> {
            Ok(Self::probabilities())
        }

        fn forward_with_gradient(
            &self,
            _image: &ImageTensor,
        ) -> dermacam_core::Result<LayerCapture<TestBackend>> {
            let device = Default::default();
            let a = Tensor::<TestBackend, 1>::from_floats(self.activations.as_slice(), &device)
                .reshape(self.dims);
            let g = Tensor::<TestBackend, 1>::from_floats(self.gradients.as_slice(), &device)
                .reshape(self.dims);
            let probabilities = Self::probabilities();
            LayerCapture::new(self.reported_layer, a, g, probabilities.argmax(), probabilities)
        }
    }

    /// Classifier whose gradient never reaches the layer.
    struct DisconnectedClassifier;

    impl LesionClassifier<TestBackend> for DisconnectedClassifier {
        fn input_scale(&self) -> PixelScale {
            PixelScale::Unit
        }

        fn target_layer(&self) -> &str {
            "block4"
        }

        fn predict(&self, _image: &ImageTensor) -> dermacam_core::Result<ClassProbabilities> {
            Ok(StubClassifier::probabilities())
        }

        fn forward_with_gradient(
            &self,
            _image: &ImageTensor,
        ) -> dermacam_core::Result<LayerCapture<TestBackend>> {
            Err(CoreError::Gradient("no gradient reached layer 'block4'".to_string()))
        }
    }

    fn gray() -> ImageTensor {
        ImageTensor::filled(ImageShape::MODEL_INPUT, 0.5, PixelScale::Unit).unwrap()
    }

    #[test]
    fn test_zero_gradient_is_degenerate() {
        let stub = StubClassifier::new(vec![1.0; 2 * 7 * 7], vec![0.0; 2 * 7 * 7], [1, 2, 7, 7]);
        let explanation = GradCam::default().explain::<TestBackend>(&stub, &gray()).unwrap();

        let map = &explanation.saliency;
        assert!(map.is_degenerate());
        assert_eq!(map.dims(), (IMAGE_SIZE, IMAGE_SIZE));
        assert!(map.values().iter().all(|v| *v == 0.0));
        assert_eq!(explanation.class(), LesionClass::Melanoma);
    }

    #[test]
    fn test_negative_evidence_is_degenerate() {
        let stub = StubClassifier::new(vec![1.0; 4 * 4], vec![-1.0; 4 * 4], [1, 1, 4, 4]);
        let explanation = GradCam::default().explain::<TestBackend>(&stub, &gray()).unwrap();
        assert!(explanation.saliency.is_degenerate());
    }

    #[test]
    fn test_nan_gradient_never_leaks() {
        let stub = StubClassifier::new(vec![1.0; 4 * 4], vec![f32::NAN; 4 * 4], [1, 1, 4, 4]);
        let explanation = GradCam::default().explain::<TestBackend>(&stub, &gray()).unwrap();
        assert!(explanation.saliency.values().iter().all(|v| v.is_finite()));
        assert!(explanation.saliency.is_degenerate());
    }

    #[test]
    fn test_hot_spot_is_located() {
        let mut activations = vec![0.0; 7 * 7];
        activations[7 + 5] = 4.0; // row 1, col 5
        let stub = StubClassifier::new(activations, vec![1.0; 7 * 7], [1, 1, 7, 7]);

        let explanation = GradCam::default().explain::<TestBackend>(&stub, &gray()).unwrap();
        let map = &explanation.saliency;
        assert!(!map.is_degenerate());
        assert_eq!(map.max(), 1.0);
        assert_eq!(map.source_resolution(), (7, 7));

        let (row, col) = map.peak();
        assert!(row < IMAGE_SIZE / 2);
        assert!(col > IMAGE_SIZE / 2);
    }

    #[test]
    fn test_layer_mismatch_is_error() {
        let mut stub = StubClassifier::new(vec![1.0; 4], vec![1.0; 4], [1, 1, 2, 2]);
        stub.reported_layer = "block2";
        let result = GradCam::default().explain::<TestBackend>(&stub, &gray());
        assert!(matches!(result, Err(ExplainError::TargetLayer(_))));
    }

    #[test]
    fn test_disconnected_gradient_is_error() {
        let result = GradCam::default().explain::<TestBackend>(&DisconnectedClassifier, &gray());
        assert!(matches!(result, Err(ExplainError::DisconnectedGradient(_))));
    }

    #[test]
    fn test_dermnet_explanation_invariants() {
        let device = Default::default();
        let config = DermNetConfig::default()
            .with_filters(vec![4, 8])
            .with_hidden(vec![16])
            .with_target_layer("block2");
        let classifier =
            DermNetClassifier::<Autodiff<NdArray>>::from_config(&config, &device).unwrap();

        let image = gray();
        let explanation = GradCam::default().explain::<TestBackend>(&classifier, &image).unwrap();
        let map = &explanation.saliency;

        assert_eq!(map.dims(), (IMAGE_SIZE, IMAGE_SIZE));
        assert!(map.values().iter().all(|v| (0.0..=1.0).contains(v)));
        if map.is_degenerate() {
            assert!(map.values().iter().all(|v| *v == 0.0));
        } else {
            assert_eq!(map.max(), 1.0);
        }
        assert_eq!(explanation.class(), classifier.predict(&image).unwrap().argmax());
        assert_eq!(explanation.layer, "block2");
    }

    #[test]
    fn test_config_serialization() {
        let config = GradCamConfig::default().with_output_size(112);
        let json = serde_json::to_string(&config).unwrap();
        let restored: GradCamConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }
}
