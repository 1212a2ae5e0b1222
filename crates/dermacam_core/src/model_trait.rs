//! The classifier contract consumed by the explanation pipeline.

use burn::prelude::*;

use crate::error::{CoreError, Result};
use crate::labels::LesionClass;
use crate::prediction::ClassProbabilities;
use crate::tensor::{ImageTensor, PixelScale};

/// Activation and gradient of one layer for one forward/backward pass.
///
/// Both tensors have shape `(1, C', H', W')`.
#[derive(Debug, Clone)]
pub struct LayerCapture<B: Backend> {
    /// Name of the captured layer.
    pub layer: String,
    /// Output of the layer during the forward pass.
    pub activations: Tensor<B, 4>,
    /// Derivative of the predicted class score w.r.t. `activations`.
    pub gradients: Tensor<B, 4>,
    /// Class whose score was differentiated.
    pub class: LesionClass,
    /// Full output of the forward pass.
    pub probabilities: ClassProbabilities,
}

impl<B: Backend> LayerCapture<B> {
    /// Create a capture, checking that activation and gradient agree.
    ///
    /// # Errors
    ///
    /// Returns an error if the two tensors have different shapes or the
    /// batch dimension is not 1.
    pub fn new(
        layer: impl Into<String>,
        activations: Tensor<B, 4>,
        gradients: Tensor<B, 4>,
        class: LesionClass,
        probabilities: ClassProbabilities,
    ) -> Result<Self> {
        let a = activations.dims();
        let g = gradients.dims();
        if a != g {
            return Err(CoreError::Gradient(format!(
                "gradient shape {:?} does not match activation shape {:?}",
                g, a
            )));
        }
        if a[0] != 1 {
            return Err(CoreError::InvalidShape {
                expected: "batch of 1".to_string(),
                got: format!("{:?}", a),
            });
        }
        Ok(Self {
            layer: layer.into(),
            activations,
            gradients,
            class,
            probabilities,
        })
    }

    /// Spatial resolution `(H', W')` of the captured layer.
    #[must_use]
    pub fn resolution(&self) -> (usize, usize) {
        let [_, _, h, w] = self.activations.dims();
        (h, w)
    }

    /// Number of channels `C'` of the captured layer.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.activations.dims()[1]
    }
}

/// Trait for lesion classifiers that can be explained with Grad-CAM.
///
/// Implementations are immutable once built. `B` is the backend the
/// captured tensors live on; models differentiate on an autodiff backend
/// and hand back tensors on its inner backend.
pub trait LesionClassifier<B: Backend>: Send {
    /// Pixel scale the classifier expects its input in.
    fn input_scale(&self) -> PixelScale;

    /// Name of the layer captured by [`Self::forward_with_gradient`].
    fn target_layer(&self) -> &str;

    /// Forward pass returning the probability of every class.
    fn predict(&self, image: &ImageTensor) -> Result<ClassProbabilities>;

    /// Forward pass that also differentiates the top class score with
    /// respect to the target layer's activation.
    fn forward_with_gradient(&self, image: &ImageTensor) -> Result<LayerCapture<B>>;
}
