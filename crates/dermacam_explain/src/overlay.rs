//! Heatmap rendering: jet false colour blended over the input image.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use dermacam_core::ImageTensor;
use image::{imageops, ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::attribution::SaliencyMap;
use crate::error::{ExplainError, Result};

/// How the original image and the overlay are arranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayLayout {
    /// Original on the left, overlay on the right.
    #[default]
    SideBySide,
    /// Overlay only.
    Blend,
}

/// Configuration for [`OverlayRenderer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Opacity of the heatmap over the image, in `[0, 1]`.
    pub alpha: f32,
    /// Output arrangement.
    pub layout: OverlayLayout,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            layout: OverlayLayout::SideBySide,
        }
    }
}

impl OverlayConfig {
    /// Set the heatmap opacity.
    #[must_use]
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the layout.
    #[must_use]
    pub fn with_layout(mut self, layout: OverlayLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Build the renderer.
    pub fn init(&self) -> OverlayRenderer {
        OverlayRenderer::new(self.clone())
    }
}

/// Jet colormap: dark blue at 0, through cyan, yellow, to dark red at 1.
pub fn jet(value: f32) -> Rgb<u8> {
    let x = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
    let channel = |offset: f32| -> u8 {
        let v = (1.5 - (4.0 * x - offset).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Renders saliency maps as PNG overlays.
#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    config: OverlayConfig,
}

impl OverlayRenderer {
    /// Create a new renderer.
    pub fn new(config: OverlayConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// False-colour image of the map alone.
    pub fn heatmap(&self, map: &SaliencyMap) -> RgbImage {
        let (rows, cols) = map.dims();
        let values = map.values();
        RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
            jet(values[[y as usize, x as usize]])
        })
    }

    /// Blend the map over `image` and arrange it per the layout.
    pub fn render(&self, image: &ImageTensor, map: &SaliencyMap) -> Result<RgbImage> {
        let shape = image.shape();
        if map.dims() != (shape.height(), shape.width()) {
            return Err(ExplainError::Render(format!(
                "heatmap is {:?} but image is {}",
                map.dims(),
                shape
            )));
        }

        let (w, h) = (shape.width() as u32, shape.height() as u32);
        let base = RgbImage::from_raw(w, h, image.to_rgb_bytes())
            .ok_or_else(|| ExplainError::Render("image buffer size mismatch".to_string()))?;

        let alpha = self.config.alpha.clamp(0.0, 1.0);
        let heat = self.heatmap(map);
        let mut blended = base.clone();
        for (x, y, pixel) in blended.enumerate_pixels_mut() {
            let Rgb(over) = *heat.get_pixel(x, y);
            for (c, value) in pixel.0.iter_mut().enumerate() {
                *value = (alpha * over[c] as f32 + (1.0 - alpha) * *value as f32).round() as u8;
            }
        }

        Ok(match self.config.layout {
            OverlayLayout::Blend => blended,
            OverlayLayout::SideBySide => {
                let mut canvas = RgbImage::new(w * 2, h);
                imageops::replace(&mut canvas, &base, 0, 0);
                imageops::replace(&mut canvas, &blended, i64::from(w), 0);
                canvas
            }
        })
    }

    /// Render and PNG-encode.
    pub fn render_png(&self, image: &ImageTensor, map: &SaliencyMap) -> Result<Vec<u8>> {
        encode_png(&self.render(image, map)?)
    }

    /// Render, PNG-encode and base64-encode (standard alphabet, no prefix).
    pub fn render_base64(&self, image: &ImageTensor, map: &SaliencyMap) -> Result<String> {
        Ok(BASE64.encode(self.render_png(image, map)?))
    }
}

/// Encode an RGB image as PNG.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}
