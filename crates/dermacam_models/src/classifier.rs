//! DermNet behind the [`LesionClassifier`] contract.

use std::path::PathBuf;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use dermacam_core::{
    ClassProbabilities, CoreError, ImageShape, ImageTensor, LayerCapture, LesionClassifier,
    PixelScale,
};

use crate::checkpoint::build_seeded;
use crate::cnn::{DermNet, DermNetConfig};
use crate::error::{ModelError, Result};

/// Where a classifier's weights came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsSource {
    /// Read from this weights file.
    Loaded(PathBuf),
    /// Freshly initialised from the configured seed.
    Fresh,
}

impl WeightsSource {
    /// Short label: `"loaded"` or `"fresh"`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded(_) => "loaded",
            Self::Fresh => "fresh",
        }
    }
}

/// DermNet classifier with a resolved Grad-CAM target stage.
///
/// Holds the network twice: an inference copy on the inner backend that
/// runs prediction and the stages up to the target, and the autodiff copy
/// that runs the remaining stages so the class score can be differentiated
/// with respect to the target activation.
#[derive(Debug)]
pub struct DermNetClassifier<B: AutodiffBackend> {
    model: DermNet<B>,
    inference: DermNet<B::InnerBackend>,
    layer: String,
    stage: usize,
    input_scale: PixelScale,
    weights: WeightsSource,
    device: B::Device,
}

impl<B: AutodiffBackend> DermNetClassifier<B> {
    /// Wrap a model, resolving `config.target_layer` against its stages.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] if the configuration fails
    /// [`DermNetConfig::validate`], or [`ModelError::UnknownLayer`] if the
    /// target layer is not a stage of the network.
    pub fn new(
        model: DermNet<B>,
        config: &DermNetConfig,
        device: &B::Device,
        weights: WeightsSource,
    ) -> Result<Self> {
        config.validate()?;
        if model.n_stages() != config.n_filters.len() {
            return Err(ModelError::InvalidConfig(format!(
                "network has {} stages, config describes {}",
                model.n_stages(),
                config.n_filters.len()
            )));
        }
        let stage =
            config
                .resolve_layer(&config.target_layer)
                .ok_or_else(|| ModelError::UnknownLayer {
                    name: config.target_layer.clone(),
                    available: config.layer_names(),
                })?;

        let inference = model.valid();
        tracing::debug!(
            layer = %config.target_layer,
            stage,
            params = model.num_params(),
            weights = weights.as_str(),
            "Built DermNet classifier"
        );

        Ok(Self {
            model,
            inference,
            layer: config.target_layer.clone(),
            stage,
            input_scale: config.input_scale,
            weights,
            device: device.clone(),
        })
    }

    /// Build a classifier with weights drawn from `config.seed`.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] if the configuration is invalid.
    pub fn from_config(config: &DermNetConfig, device: &B::Device) -> Result<Self> {
        let model = build_seeded::<B>(config, device)?;
        Self::new(model, config, device, WeightsSource::Fresh)
    }

    /// Where the weights came from.
    #[must_use]
    pub const fn weights_source(&self) -> &WeightsSource {
        &self.weights
    }

    fn prepare(&self, image: &ImageTensor) -> dermacam_core::Result<Tensor<B::InnerBackend, 4>> {
        image.ensure_shape(ImageShape::MODEL_INPUT)?;
        if image.scale() != self.input_scale {
            return Err(CoreError::Prediction(format!(
                "classifier expects {} input, got {}",
                self.input_scale,
                image.scale()
            )));
        }
        let x = image.to_batch::<B::InnerBackend>(&self.device);
        Ok(x.div_scalar(self.input_scale.max_value()))
    }
}

fn to_probabilities<B: Backend>(probs: Tensor<B, 2>) -> dermacam_core::Result<ClassProbabilities> {
    let values = probs
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoreError::Prediction(format!("{:?}", e)))?;
    ClassProbabilities::new(&values)
}

impl<B: AutodiffBackend> LesionClassifier<B::InnerBackend> for DermNetClassifier<B> {
    fn input_scale(&self) -> PixelScale {
        self.input_scale
    }

    fn target_layer(&self) -> &str {
        &self.layer
    }

    fn predict(&self, image: &ImageTensor) -> dermacam_core::Result<ClassProbabilities> {
        let x = self.prepare(image)?;
        to_probabilities(self.inference.forward_probs(x))
    }

    fn forward_with_gradient(
        &self,
        image: &ImageTensor,
    ) -> dermacam_core::Result<LayerCapture<B::InnerBackend>> {
        let x = self.prepare(image)?;
        let activations = self.inference.forward_features(x, self.stage);

        let tracked = Tensor::<B, 4>::from_inner(activations.clone()).require_grad();
        let probs = softmax(self.model.forward_from(tracked.clone(), self.stage), 1);

        let probabilities = to_probabilities(probs.clone().inner())?;
        let class = probabilities.argmax();
        let index = class.index();

        let score = probs.slice([0..1, index..index + 1]).sum();
        let grads = score.backward();
        let gradients = tracked.grad(&grads).ok_or_else(|| {
            CoreError::Gradient(format!("no gradient reached layer '{}'", self.layer))
        })?;

        LayerCapture::new(self.layer.clone(), activations, gradients, class, probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use dermacam_core::IMAGE_SIZE;

    type TestBackend = Autodiff<NdArray>;

    fn small_config() -> DermNetConfig {
        DermNetConfig::default()
            .with_filters(vec![2, 4])
            .with_hidden(vec![8])
            .with_target_layer("block2")
    }

    fn gray(value: f32, scale: PixelScale) -> ImageTensor {
        ImageTensor::filled(ImageShape::MODEL_INPUT, value, scale).unwrap()
    }

    #[test]
    fn test_predict_is_distribution() {
        let device = Default::default();
        let classifier = DermNetClassifier::<TestBackend>::from_config(&small_config(), &device).unwrap();

        let probs = classifier.predict(&gray(0.5, PixelScale::Unit)).unwrap();
        let sum: f32 = probs.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-3);
        assert!(probs.as_slice().iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_gradient_capture_matches_prediction() {
        let device = Default::default();
        let classifier = DermNetClassifier::<TestBackend>::from_config(&small_config(), &device).unwrap();
        let image = gray(0.5, PixelScale::Unit);

        let capture = classifier.forward_with_gradient(&image).unwrap();
        let predicted = classifier.predict(&image).unwrap();

        assert_eq!(capture.layer, "block2");
        assert_eq!(capture.channels(), 4);
        assert_eq!(capture.resolution(), (IMAGE_SIZE / 4, IMAGE_SIZE / 4));
        assert_eq!(capture.class, predicted.argmax());

        let grads: Vec<f32> = capture.gradients.into_data().to_vec().unwrap();
        assert!(grads.iter().all(|g| g.is_finite()));
    }

    #[test]
    fn test_earlier_target_layer() {
        let device = Default::default();
        let config = small_config().with_target_layer("block1");
        let classifier = DermNetClassifier::<TestBackend>::from_config(&config, &device).unwrap();

        let capture = classifier
            .forward_with_gradient(&gray(0.2, PixelScale::Unit))
            .unwrap();
        assert_eq!(capture.channels(), 2);
        assert_eq!(capture.resolution(), (IMAGE_SIZE / 2, IMAGE_SIZE / 2));
    }

    #[test]
    fn test_unknown_layer_rejected() {
        let device = Default::default();
        let config = small_config().with_target_layer("top_conv");
        let result = DermNetClassifier::<TestBackend>::from_config(&config, &device);

        match result {
            Err(ModelError::UnknownLayer { name, available }) => {
                assert_eq!(name, "top_conv");
                assert_eq!(available, vec!["block1", "block2"]);
            }
            other => panic!("expected UnknownLayer, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_empty_network_rejected() {
        let device = Default::default();
        let config = small_config().with_filters(vec![]);
        let result = DermNetClassifier::<TestBackend>::from_config(&config, &device);
        assert!(matches!(result, Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn test_even_kernel_rejected_before_build() {
        let device = Default::default();
        let config = small_config().with_kernel_size(4);
        let result = DermNetClassifier::<TestBackend>::from_config(&config, &device);
        assert!(matches!(result, Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn test_too_deep_network_rejected() {
        let device = Default::default();
        let config = DermNetConfig::default()
            .with_filters(vec![2; 8])
            .with_hidden(vec![4])
            .with_target_layer("block8");
        let result = DermNetClassifier::<TestBackend>::from_config(&config, &device);
        assert!(matches!(result, Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn test_deepest_network_predicts() {
        let device = Default::default();
        let config = DermNetConfig::default()
            .with_filters(vec![2; 7])
            .with_hidden(vec![4])
            .with_target_layer("block7");
        let classifier = DermNetClassifier::<TestBackend>::from_config(&config, &device).unwrap();

        let capture = classifier
            .forward_with_gradient(&gray(0.5, PixelScale::Unit))
            .unwrap();
        assert_eq!(capture.resolution(), (1, 1));
    }

    #[test]
    fn test_scale_mismatch_rejected() {
        let device = Default::default();
        let classifier = DermNetClassifier::<TestBackend>::from_config(&small_config(), &device).unwrap();
        let result = classifier.predict(&gray(128.0, PixelScale::Raw));
        assert!(matches!(result, Err(CoreError::Prediction(_))));
    }

    #[test]
    fn test_wrong_size_rejected() {
        let device = Default::default();
        let classifier = DermNetClassifier::<TestBackend>::from_config(&small_config(), &device).unwrap();
        let image = ImageTensor::filled(ImageShape::new(32, 32, 3), 0.5, PixelScale::Unit).unwrap();
        assert!(matches!(
            classifier.predict(&image),
            Err(CoreError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_raw_scale_classifier_rescales() {
        let device = Default::default();
        let unit = DermNetClassifier::<TestBackend>::from_config(&small_config(), &device).unwrap();
        let mut raw_config = small_config();
        raw_config.input_scale = PixelScale::Raw;
        let raw = DermNetClassifier::<TestBackend>::from_config(&raw_config, &device).unwrap();

        let a = unit.predict(&gray(0.5, PixelScale::Unit)).unwrap();
        let b = raw.predict(&gray(127.5, PixelScale::Raw)).unwrap();
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_weights_source_label() {
        assert_eq!(WeightsSource::Fresh.as_str(), "fresh");
        assert_eq!(WeightsSource::Loaded(PathBuf::from("w.mpk")).as_str(), "loaded");
    }
}
