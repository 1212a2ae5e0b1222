//! DermNet: a compact convolutional classifier for dermoscopic images.
//!
//! The network is a stack of named convolutional stages followed by global
//! average pooling and a dense head:
//!
//! ```text
//! input (1, 3, 224, 224) in [0, 1]
//!   -> ImageNet standardization
//!   -> block1 .. blockN   conv3x3 -> ReLU -> maxpool 2x2
//!   -> global average pool
//!   -> dense -> ReLU (per hidden layer)
//!   -> dense (n_classes logits)
//! ```
//!
//! Stages are addressable by name so the explainer can split the forward
//! pass at any of them. The network has no batch normalization or dropout,
//! so it computes the same function on autodiff and inference backends.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    Linear, LinearConfig, PaddingConfig2d, Relu,
};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use dermacam_core::{PixelScale, Seed, IMAGE_CHANNELS, IMAGE_SIZE, NUM_CLASSES};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Per-channel mean of the RGB statistics the network standardizes with.
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation paired with [`CHANNEL_MEAN`].
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Configuration for DermNet model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DermNetConfig {
    /// Number of output filters of each convolutional stage.
    pub n_filters: Vec<usize>,
    /// Convolution kernel size.
    pub kernel_size: usize,
    /// Widths of the hidden dense layers.
    pub hidden: Vec<usize>,
    /// Stage whose activation is explained; must name one of the stages.
    pub target_layer: String,
    /// Pixel scale the model is fed with.
    pub input_scale: PixelScale,
    /// Seed for freshly initialised weights.
    pub seed: Seed,
}

impl Default for DermNetConfig {
    fn default() -> Self {
        Self {
            n_filters: vec![8, 16, 32, 64],
            kernel_size: 3,
            hidden: vec![512, 256],
            target_layer: "block4".to_string(),
            input_scale: PixelScale::Unit,
            seed: Seed::default(),
        }
    }
}

impl DermNetConfig {
    /// Set the convolutional stage widths.
    #[must_use]
    pub fn with_filters(mut self, n_filters: Vec<usize>) -> Self {
        self.n_filters = n_filters;
        self
    }

    /// Set the convolution kernel size.
    #[must_use]
    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    /// Set the hidden dense widths.
    #[must_use]
    pub fn with_hidden(mut self, hidden: Vec<usize>) -> Self {
        self.hidden = hidden;
        self
    }

    /// Set the explained stage.
    #[must_use]
    pub fn with_target_layer(mut self, layer: impl Into<String>) -> Self {
        self.target_layer = layer.into();
        self
    }

    /// Set the seed for fresh weights.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Names of the convolutional stages, input to output.
    #[must_use]
    pub fn layer_names(&self) -> Vec<String> {
        (1..=self.n_filters.len()).map(stage_name).collect()
    }

    /// Position of a stage by name.
    #[must_use]
    pub fn resolve_layer(&self, name: &str) -> Option<usize> {
        self.layer_names().iter().position(|n| n == name)
    }

    /// Check that the configuration describes a network that can be built
    /// and run on a model-sized image.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] for an even or zero kernel, a
    /// zero layer width, no stages, or more stages than the input can be
    /// halved, and [`ModelError::UnknownLayer`] if `target_layer` names no stage.
    pub fn validate(&self) -> Result<()> {
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(ModelError::InvalidConfig(format!(
                "kernel size must be odd, got {}",
                self.kernel_size
            )));
        }
        if self.n_filters.is_empty() {
            return Err(ModelError::InvalidConfig(
                "network needs at least one convolutional stage".to_string(),
            ));
        }
        if self.n_filters.contains(&0) || self.hidden.contains(&0) {
            return Err(ModelError::InvalidConfig(format!(
                "layer widths must be positive, got filters {:?} hidden {:?}",
                self.n_filters, self.hidden
            )));
        }
        let final_side = u32::try_from(self.n_filters.len())
            .ok()
            .and_then(|stages| IMAGE_SIZE.checked_shr(stages))
            .unwrap_or(0);
        if final_side == 0 {
            return Err(ModelError::InvalidConfig(format!(
                "{} stages pool a {}px input below one pixel",
                self.n_filters.len(),
                IMAGE_SIZE
            )));
        }
        if self.resolve_layer(&self.target_layer).is_none() {
            return Err(ModelError::UnknownLayer {
                name: self.target_layer.clone(),
                available: self.layer_names(),
            });
        }
        Ok(())
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> DermNet<B> {
        DermNet::new(self.clone(), device)
    }
}

fn stage_name(i: usize) -> String {
    format!("block{}", i)
}

/// Convolution, ReLU and 2×2 max pooling.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional stage.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self { conv, pool }
    }

    /// Forward pass.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(x);
        let out = Relu::new().forward(out);
        self.pool.forward(out)
    }
}

/// DermNet model for lesion classification.
#[derive(Module, Debug)]
pub struct DermNet<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    gap: AdaptiveAvgPool2d,
    hidden: Vec<Linear<B>>,
    fc: Linear<B>,
}

impl<B: Backend> DermNet<B> {
    /// Create a new DermNet model.
    pub fn new(config: DermNetConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(config.n_filters.len());
        let mut in_channels = IMAGE_CHANNELS;
        for &out_channels in &config.n_filters {
            blocks.push(ConvBlock::new(
                in_channels,
                out_channels,
                config.kernel_size,
                device,
            ));
            in_channels = out_channels;
        }

        let gap = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        let mut hidden = Vec::with_capacity(config.hidden.len());
        let mut width = in_channels;
        for &out in &config.hidden {
            hidden.push(LinearConfig::new(width, out).init(device));
            width = out;
        }
        let fc = LinearConfig::new(width, NUM_CLASSES).init(device);

        Self {
            blocks,
            gap,
            hidden,
            fc,
        }
    }

    /// Number of convolutional stages.
    pub fn n_stages(&self) -> usize {
        self.blocks.len()
    }

    /// Standardize a `[0, 1]` batch with the channel statistics.
    pub fn standardize(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let device = x.device();
        let mean = Tensor::<B, 1>::from_floats(CHANNEL_MEAN.as_slice(), &device).reshape([1, 3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(CHANNEL_STD.as_slice(), &device).reshape([1, 3, 1, 1]);
        (x - mean) / std
    }

    /// Run standardization and stages `0..=stage`, returning that stage's output.
    ///
    /// # Arguments
    ///
    /// * `x` - Input batch of shape (batch, 3, height, width) in `[0, 1]`
    /// * `stage` - Index of the last stage to run
    pub fn forward_features(&self, x: Tensor<B, 4>, stage: usize) -> Tensor<B, 4> {
        let mut out = self.standardize(x);
        for block in self.blocks.iter().take(stage + 1) {
            out = block.forward(out);
        }
        out
    }

    /// Continue the forward pass from the output of `stage`, returning logits.
    pub fn forward_from(&self, features: Tensor<B, 4>, stage: usize) -> Tensor<B, 2> {
        let mut out = features;
        for block in self.blocks.iter().skip(stage + 1) {
            out = block.forward(out);
        }

        let out = self.gap.forward(out);
        let [batch, channels, _, _] = out.dims();
        let mut out = out.reshape([batch, channels]);

        let relu = Relu::new();
        for layer in &self.hidden {
            out = relu.forward(layer.forward(out));
        }
        self.fc.forward(out)
    }

    /// Forward pass returning logits of shape (batch, n_classes).
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let last = self.blocks.len().saturating_sub(1);
        let features = self.forward_features(x, last);
        self.forward_from(features, last)
    }

    /// Forward pass returning probabilities.
    pub fn forward_probs(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> DermNetConfig {
        DermNetConfig::default()
            .with_filters(vec![2, 4])
            .with_hidden(vec![8])
            .with_target_layer("block2")
    }

    #[test]
    fn test_dermnet_config_default() {
        let config = DermNetConfig::default();
        assert_eq!(config.n_filters.len(), 4);
        assert_eq!(config.target_layer, "block4");
        assert_eq!(config.resolve_layer("block4"), Some(3));
        assert_eq!(config.resolve_layer("block1"), Some(0));
        assert_eq!(config.resolve_layer("conv_head"), None);
    }

    #[test]
    fn test_layer_names() {
        assert_eq!(small_config().layer_names(), vec!["block1", "block2"]);
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device) * 0.5;

        let features = model.forward_features(x.clone(), 1);
        assert_eq!(features.dims(), [1, 4, 8, 8]);

        let early = model.forward_features(x.clone(), 0);
        assert_eq!(early.dims(), [1, 2, 16, 16]);

        let logits = model.forward(x);
        assert_eq!(logits.dims(), [1, NUM_CLASSES]);
    }

    #[test]
    fn test_split_forward_matches_full_forward() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device) * 0.3;

        let full: Vec<f32> = model.forward(x.clone()).into_data().to_vec().unwrap();
        let split: Vec<f32> = model
            .forward_from(model.forward_features(x, 0), 0)
            .into_data()
            .to_vec()
            .unwrap();

        for (a, b) in full.iter().zip(split.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_forward_probs_sum_to_one() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);

        let probs: Vec<f32> = model.forward_probs(x).into_data().to_vec().unwrap();
        let sum: f32 = probs.iter().sum();
        assert_eq!(probs.len(), NUM_CLASSES);
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_validate_default() {
        assert!(DermNetConfig::default().validate().is_ok());
        assert!(small_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_even_and_zero_kernel() {
        for kernel in [0, 2, 4] {
            let config = small_config().with_kernel_size(kernel);
            assert!(matches!(config.validate(), Err(ModelError::InvalidConfig(_))));
        }
        assert!(small_config().with_kernel_size(5).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_too_many_stages() {
        let deepest = DermNetConfig::default()
            .with_filters(vec![2; 7])
            .with_target_layer("block7");
        assert!(deepest.validate().is_ok());

        let too_deep = DermNetConfig::default()
            .with_filters(vec![2; 8])
            .with_target_layer("block8");
        assert!(matches!(too_deep.validate(), Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_width_and_unknown_layer() {
        let zero = small_config().with_filters(vec![2, 0]);
        assert!(matches!(zero.validate(), Err(ModelError::InvalidConfig(_))));

        let unknown = small_config().with_target_layer("block3");
        assert!(matches!(unknown.validate(), Err(ModelError::UnknownLayer { .. })));
    }

    #[test]
    fn test_config_serialization() {
        let config = small_config();
        let json = serde_json::to_string(&config).unwrap();
        let restored: DermNetConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }
}
