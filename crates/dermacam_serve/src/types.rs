//! Request/response bodies.

use dermacam_core::Prediction;
use serde::{Deserialize, Serialize};

use crate::service::Diagnosis;

/// Body of a successful `POST /predict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Top-3 classes, most probable first.
    pub predictions: Vec<Prediction>,
    /// Heatmap and rendered overlay for the top class.
    pub explanations: Explanations,
}

/// Explanation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanations {
    /// 224×224 heatmap, row-major, values in `[0, 1]`.
    pub grad_cam: Vec<Vec<f32>>,
    /// Base64 PNG overlay.
    pub visualization: String,
}

impl From<Diagnosis> for PredictResponse {
    fn from(diagnosis: Diagnosis) -> Self {
        Self {
            predictions: diagnosis.predictions,
            explanations: Explanations {
                grad_cam: diagnosis.saliency.to_nested(),
                visualization: diagnosis.visualization,
            },
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while serving.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Layer the heatmaps are computed at.
    pub target_layer: String,
    /// `"loaded"` or `"fresh"`.
    pub weights: String,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short description.
    pub error: String,
    /// Cause chain, present only when details are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
