//! Image tensor types.

use burn::prelude::*;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::shape::ImageShape;

/// Value range of the pixels stored in an [`ImageTensor`].
///
/// The normalizer and the classifier must agree on this; see
/// [`crate::LesionClassifier::input_scale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelScale {
    /// Pixels divided by 255, in `[0, 1]`.
    #[default]
    Unit,
    /// Raw 8-bit pixel values, in `[0, 255]`.
    Raw,
}

impl PixelScale {
    /// Largest value a pixel may take under this scale.
    #[must_use]
    pub const fn max_value(&self) -> f32 {
        match self {
            Self::Unit => 1.0,
            Self::Raw => 255.0,
        }
    }

    /// Factor that maps an 8-bit pixel onto this scale.
    #[must_use]
    pub const fn from_u8_factor(&self) -> f32 {
        match self {
            Self::Unit => 1.0 / 255.0,
            Self::Raw => 1.0,
        }
    }
}

impl std::fmt::Display for PixelScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit => write!(f, "[0, 1]"),
            Self::Raw => write!(f, "[0, 255]"),
        }
    }
}

/// An RGB image as a floating point `(H, W, C)` array.
///
/// Values are validated against the declared [`PixelScale`] on
/// construction, so every `ImageTensor` in circulation satisfies its
/// range contract.
///
/// # Example
///
/// ```rust
/// use dermacam_core::{ImageShape, ImageTensor, PixelScale};
///
/// let image = ImageTensor::filled(ImageShape::MODEL_INPUT, 0.5, PixelScale::Unit).unwrap();
/// assert_eq!(image.shape(), ImageShape::MODEL_INPUT);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Array3<f32>,
    scale: PixelScale,
}

impl ImageTensor {
    /// Create a new ImageTensor from an `(H, W, C)` array.
    ///
    /// # Errors
    ///
    /// Returns an error if the array is not three-channel or holds a value
    /// that is not finite or lies outside the scale's range.
    pub fn new(data: Array3<f32>, scale: PixelScale) -> Result<Self> {
        let shape = ImageShape::from_dims(data.shape())?;
        if shape.channels() != crate::IMAGE_CHANNELS {
            return Err(CoreError::InvalidShape {
                expected: format!("{} channels", crate::IMAGE_CHANNELS),
                got: shape.to_string(),
            });
        }

        let max = scale.max_value();
        if let Some(&value) = data
            .iter()
            .find(|v| !v.is_finite() || **v < 0.0 || **v > max)
        {
            return Err(CoreError::OutOfRange { value, scale });
        }

        Ok(Self { data, scale })
    }

    /// Create an ImageTensor where every element has the same value.
    pub fn filled(shape: ImageShape, value: f32, scale: PixelScale) -> Result<Self> {
        Self::new(Array3::from_elem(shape.as_array(), value), scale)
    }

    /// Get the shape metadata.
    #[must_use]
    pub fn shape(&self) -> ImageShape {
        let dims = self.data.shape();
        ImageShape::new(dims[0], dims[1], dims[2])
    }

    /// Get the pixel scale.
    #[must_use]
    pub const fn scale(&self) -> PixelScale {
        self.scale
    }

    /// Get a reference to the underlying array.
    #[must_use]
    pub const fn as_array(&self) -> &Array3<f32> {
        &self.data
    }

    /// Consume self and return the underlying array.
    #[must_use]
    pub fn into_inner(self) -> Array3<f32> {
        self.data
    }

    /// Smallest and largest element.
    #[must_use]
    pub fn value_range(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Check that the tensor has the expected shape.
    pub fn ensure_shape(&self, expected: ImageShape) -> Result<()> {
        let got = self.shape();
        if got != expected {
            return Err(CoreError::InvalidShape {
                expected: expected.to_string(),
                got: got.to_string(),
            });
        }
        Ok(())
    }

    /// Convert to a single-image batch of shape `(1, C, H, W)`.
    pub fn to_batch<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        let shape = self.shape();
        let flat: Vec<f32> = self.data.iter().copied().collect();
        Tensor::<B, 1>::from_floats(flat.as_slice(), device)
            .reshape([1, shape.height(), shape.width(), shape.channels()])
            .permute([0, 3, 1, 2])
    }

    /// Row-major interleaved RGB bytes, rescaled from the pixel scale.
    #[must_use]
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        let factor = 255.0 / self.scale.max_value();
        self.data
            .iter()
            .map(|v| (v * factor).round().clamp(0.0, 255.0) as u8)
            .collect()
    }
}
