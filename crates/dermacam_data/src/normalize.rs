//! Decoding and normalization of uploaded images.
//!
//! Any raster format the `image` crate can decode is accepted. The result
//! is always a `(224, 224, 3)` RGB [`ImageTensor`]:
//! - non-RGB colour modes are converted first, dropping alpha and palettes
//! - the image is stretched to 224×224 with no cropping or letterboxing
//! - pixels are scaled according to [`NormalizerConfig::scale`]

use dermacam_core::{ImageShape, ImageTensor, PixelScale, IMAGE_CHANNELS, IMAGE_SIZE};
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

/// Interpolation used when resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    /// Nearest neighbour.
    Nearest,
    /// Bilinear.
    #[default]
    Triangle,
    /// Cubic (Catmull-Rom).
    CatmullRom,
    /// Gaussian.
    Gaussian,
    /// Lanczos with window 3.
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Configuration for [`ImageNormalizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Side length of the square output.
    pub size: usize,
    /// Output pixel scale.
    pub scale: PixelScale,
    /// Resize interpolation.
    pub filter: ResizeFilter,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            size: IMAGE_SIZE,
            scale: PixelScale::Unit,
            filter: ResizeFilter::Triangle,
        }
    }
}

impl NormalizerConfig {
    /// Set the output pixel scale.
    #[must_use]
    pub fn with_scale(mut self, scale: PixelScale) -> Self {
        self.scale = scale;
        self
    }

    /// Set the resize interpolation.
    #[must_use]
    pub fn with_filter(mut self, filter: ResizeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Initialize the normalizer.
    #[must_use]
    pub fn init(&self) -> ImageNormalizer {
        ImageNormalizer::new(self.clone())
    }
}

/// Turns encoded image bytes into classifier-ready tensors.
#[derive(Debug, Clone, Default)]
pub struct ImageNormalizer {
    config: NormalizerConfig,
}

impl ImageNormalizer {
    /// Create a normalizer from config.
    #[must_use]
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// The pixel scale of produced tensors.
    #[must_use]
    pub fn scale(&self) -> PixelScale {
        self.config.scale
    }

    /// Shape of produced tensors.
    #[must_use]
    pub fn output_shape(&self) -> ImageShape {
        ImageShape::new(self.config.size, self.config.size, IMAGE_CHANNELS)
    }

    /// Decode, convert to RGB, resize and scale an encoded image.
    ///
    /// # Errors
    ///
    /// - [`DataError::Decode`] if the bytes are empty or not an image
    /// - [`DataError::UnsupportedMode`] if the colour mode cannot become RGB
    /// - [`DataError::Preprocess`] if the image is degenerate
    pub fn normalize(&self, bytes: &[u8]) -> Result<ImageTensor> {
        if bytes.is_empty() {
            return Err(DataError::Decode("empty input".to_string()));
        }

        let decoded = image::load_from_memory(bytes)?;
        tracing::debug!(
            width = decoded.width(),
            height = decoded.height(),
            color = ?decoded.color(),
            "decoded image"
        );
        self.normalize_image(&decoded)
    }

    /// Normalize an already decoded image.
    pub fn normalize_image(&self, decoded: &DynamicImage) -> Result<ImageTensor> {
        ensure_rgb_convertible(decoded.color())?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(DataError::Preprocess(format!(
                "image has zero size {}x{}",
                decoded.width(),
                decoded.height()
            )));
        }

        let size = u32::try_from(self.config.size)
            .map_err(|_| DataError::Preprocess(format!("size {} too large", self.config.size)))?;
        let rgb = imageops::resize(&decoded.to_rgb8(), size, size, self.config.filter.into());

        let factor = self.config.scale.from_u8_factor();
        let values: Vec<f32> = rgb.as_raw().iter().map(|&p| p as f32 * factor).collect();
        let shape = self.output_shape();
        let array = Array3::from_shape_vec(shape.as_array(), values)
            .map_err(|e| DataError::Preprocess(e.to_string()))?;

        Ok(ImageTensor::new(array, self.config.scale)?)
    }
}

/// Normalize with the default configuration: 224×224, `[0, 1]`, bilinear.
pub fn normalize(bytes: &[u8]) -> Result<ImageTensor> {
    ImageNormalizer::default().normalize(bytes)
}

fn ensure_rgb_convertible(color: ColorType) -> Result<()> {
    match color {
        ColorType::L8
        | ColorType::La8
        | ColorType::Rgb8
        | ColorType::Rgba8
        | ColorType::L16
        | ColorType::La16
        | ColorType::Rgb16
        | ColorType::Rgba16
        | ColorType::Rgb32F
        | ColorType::Rgba32F => Ok(()),
        other => Err(DataError::UnsupportedMode(format!("{:?}", other))),
    }
}
