//! Grad-CAM attribution maps.

use burn::prelude::*;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use dermacam_core::LesionClass;
use ndarray::Array2;

use crate::error::{ExplainError, Result};

/// Heatmap over the model input, one value per input pixel.
///
/// Values lie in `[0, 1]`. The maximum is exactly 1.0 unless the map is
/// degenerate, in which case every value is 0.
#[derive(Debug, Clone, PartialEq)]
pub struct SaliencyMap {
    values: Array2<f32>,
    class: LesionClass,
    degenerate: bool,
    source_resolution: (usize, usize),
}

impl SaliencyMap {
    /// An all-zero map, used when there is no positive evidence.
    pub fn degenerate(size: usize, class: LesionClass, source_resolution: (usize, usize)) -> Self {
        Self {
            values: Array2::zeros((size, size)),
            class,
            degenerate: true,
            source_resolution,
        }
    }

    /// Heatmap values, `(rows, cols)`.
    #[must_use]
    pub const fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// The explained class.
    #[must_use]
    pub const fn class(&self) -> LesionClass {
        self.class
    }

    /// Whether the map carries no evidence.
    #[must_use]
    pub const fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Resolution `(H', W')` of the layer the map was computed at.
    #[must_use]
    pub const fn source_resolution(&self) -> (usize, usize) {
        self.source_resolution
    }

    /// `(rows, cols)` of the map.
    #[must_use]
    pub fn dims(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Largest value.
    #[must_use]
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// Mean value.
    #[must_use]
    pub fn mean(&self) -> f32 {
        self.values.mean().unwrap_or(0.0)
    }

    /// Position `(row, col)` of the first maximum.
    #[must_use]
    pub fn peak(&self) -> (usize, usize) {
        let cols = self.values.ncols().max(1);
        let mut best = (0, f32::NEG_INFINITY);
        for (i, &v) in self.values.iter().enumerate() {
            if v > best.1 {
                best = (i, v);
            }
        }
        (best.0 / cols, best.0 % cols)
    }

    /// Row-major nested vectors, the JSON shape of the heatmap.
    #[must_use]
    pub fn to_nested(&self) -> Vec<Vec<f32>> {
        self.values.rows().into_iter().map(|row| row.to_vec()).collect()
    }

    /// Consume self and return the values.
    #[must_use]
    pub fn into_inner(self) -> Array2<f32> {
        self.values
    }
}

/// Compute the raw Grad-CAM map at the captured layer's resolution.
///
/// # Arguments
///
/// * `activations` - Target layer output (1, channels, H', W')
/// * `gradients` - Class score gradient w.r.t. `activations`, same shape
///
/// # Returns
///
/// ReLU of the gradient-weighted channel sum, shape (H', W').
pub fn grad_cam<B: Backend>(
    activations: Tensor<B, 4>,
    gradients: Tensor<B, 4>,
) -> Result<Tensor<B, 2>> {
    let a = activations.dims();
    let g = gradients.dims();
    if a != g || a[0] != 1 {
        return Err(ExplainError::ShapeMismatch {
            activations: a.to_vec(),
            gradients: g.to_vec(),
        });
    }

    // Global average pool the gradients: (1, C, H, W) -> (1, C, 1, 1)
    let weights = gradients.mean_dim(3).mean_dim(2);

    // Weighted sum across channels: (1, C, H, W) -> (1, 1, H, W)
    let cam = (activations * weights).sum_dim(1);

    Ok(cam.clamp_min(0.0).reshape([a[2], a[3]]))
}

/// Scale a non-negative map so its maximum is 1.
///
/// Returns `None` when the maximum is not finite or not above `epsilon`,
/// or any value is not finite.
pub fn normalize_by_max(values: &Array2<f32>, epsilon: f32) -> Option<Array2<f32>> {
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let max = values.iter().copied().fold(0.0, f32::max);
    if max <= epsilon {
        return None;
    }
    Some(values.mapv(|v| (v / max).clamp(0.0, 1.0)))
}

/// Bilinearly resize a map to `size` × `size`.
pub fn upsample<B: Backend>(values: &Array2<f32>, size: usize, device: &B::Device) -> Result<Array2<f32>> {
    let (h, w) = values.dim();
    let flat: Vec<f32> = values.iter().copied().collect();
    let x = Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([1, 1, h, w]);
    let up = interpolate(
        x,
        [size, size],
        InterpolateOptions::new(InterpolateMode::Bilinear),
    );
    to_array2(up.reshape([size, size]))
}

/// Copy a 2D tensor into an ndarray array.
pub fn to_array2<B: Backend>(tensor: Tensor<B, 2>) -> Result<Array2<f32>> {
    let [rows, cols] = tensor.dims();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ExplainError::Render(format!("{:?}", e)))?;
    Array2::from_shape_vec((rows, cols), values).map_err(|e| ExplainError::Render(e.to_string()))
}

/// Build the final saliency map from a raw Grad-CAM map.
///
/// The map is divided by its maximum, upsampled, then renormalized by the
/// upsampled maximum so the result peaks at exactly 1.0.
pub fn saliency_from_cam<B: Backend>(
    cam: Tensor<B, 2>,
    class: LesionClass,
    size: usize,
    epsilon: f32,
) -> Result<SaliencyMap> {
    let device = cam.device();
    let raw = to_array2(cam)?;
    let source_resolution = raw.dim();

    let Some(normalized) = normalize_by_max(&raw, epsilon) else {
        return Ok(SaliencyMap::degenerate(size, class, source_resolution));
    };

    let upsampled = upsample::<B>(&normalized, size, &device)?;
    let Some(values) = normalize_by_max(&upsampled, epsilon) else {
        return Ok(SaliencyMap::degenerate(size, class, source_resolution));
    };

    Ok(SaliencyMap {
        values,
        class,
        degenerate: false,
        source_resolution,
    })
}
