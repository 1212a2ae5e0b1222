//! Class probability vectors and ranked predictions.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::labels::{LesionClass, NUM_CLASSES};

/// Tolerance on the sum of a softmax vector.
const SUM_TOLERANCE: f32 = 1e-3;

/// One ranked entry of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class.
    pub class: LesionClass,
    /// Softmax probability of the class.
    pub probability: f32,
}

/// Softmax output over the full label set, in class order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities {
    values: [f32; NUM_CLASSES],
}

impl ClassProbabilities {
    /// Validate a raw probability vector.
    ///
    /// # Errors
    ///
    /// Returns an error unless there are exactly [`NUM_CLASSES`] finite
    /// entries in `[0, 1]` that sum to 1 within tolerance.
    pub fn new(values: &[f32]) -> Result<Self> {
        let values: [f32; NUM_CLASSES] = values.try_into().map_err(|_| {
            CoreError::InvalidProbabilities(format!(
                "expected {} entries, got {}",
                NUM_CLASSES,
                values.len()
            ))
        })?;

        if let Some(v) = values
            .iter()
            .find(|v| !v.is_finite() || **v < 0.0 || **v > 1.0)
        {
            return Err(CoreError::InvalidProbabilities(format!(
                "entry {} outside [0, 1]",
                v
            )));
        }

        let sum: f32 = values.iter().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(CoreError::InvalidProbabilities(format!(
                "entries sum to {}",
                sum
            )));
        }

        Ok(Self { values })
    }

    /// Probabilities in class order.
    #[must_use]
    pub const fn as_slice(&self) -> &[f32; NUM_CLASSES] {
        &self.values
    }

    /// Probability of a single class.
    #[must_use]
    pub const fn get(&self, class: LesionClass) -> f32 {
        self.values[class.index()]
    }

    /// Class with the highest probability; the lowest index wins ties.
    #[must_use]
    pub fn argmax(&self) -> LesionClass {
        let mut best = 0;
        for (i, &v) in self.values.iter().enumerate().skip(1) {
            if v > self.values[best] {
                best = i;
            }
        }
        LesionClass::ALL[best]
    }

    /// The `k` most probable classes, highest first.
    ///
    /// Equal probabilities keep class order.
    #[must_use]
    pub fn top_k(&self, k: usize) -> Vec<Prediction> {
        let mut ranked: Vec<Prediction> = LesionClass::ALL
            .iter()
            .map(|&class| Prediction {
                class,
                probability: self.get(class),
            })
            .collect();
        // `sort_by` is stable, so ties stay in class order.
        ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        ranked.truncate(k);
        ranked
    }
}
