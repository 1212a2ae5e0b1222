//! Image shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Side length, in pixels, of the square image the classifier accepts.
pub const IMAGE_SIZE: usize = 224;

/// Number of colour channels (RGB).
pub const IMAGE_CHANNELS: usize = 3;

/// Shape metadata for image tensors.
///
/// Follows the convention `(H, W, C)`:
/// - `H`: Height in pixels
/// - `W`: Width in pixels
/// - `C`: Channels, in RGB order
///
/// # Example
///
/// ```rust
/// use dermacam_core::ImageShape;
///
/// let shape = ImageShape::new(224, 224, 3);
/// assert_eq!(shape, ImageShape::MODEL_INPUT);
/// assert_eq!(shape.as_nchw(), [1, 3, 224, 224]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    height: usize,
    width: usize,
    channels: usize,
}

impl ImageShape {
    /// The fixed shape the classifier is trained on.
    pub const MODEL_INPUT: Self = Self::new(IMAGE_SIZE, IMAGE_SIZE, IMAGE_CHANNELS);

    /// Create a new shape.
    #[must_use]
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Create an ImageShape from a slice of dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice doesn't contain exactly 3 elements.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match dims {
            [h, w, c] => Ok(Self::new(*h, *w, *c)),
            _ => Err(CoreError::InvalidShape {
                expected: "(H, W, C)".to_string(),
                got: format!("{:?}", dims),
            }),
        }
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Convert to an array.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    /// Dimensions of the equivalent single-image NCHW batch.
    #[must_use]
    pub const fn as_nchw(&self) -> [usize; 4] {
        [1, self.channels, self.height, self.width]
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(H={}, W={}, C={})", self.height, self.width, self.channels)
    }
}
