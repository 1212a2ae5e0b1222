//! The fixed diagnostic label set.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Number of diagnostic classes the classifier distinguishes.
pub const NUM_CLASSES: usize = 9;

/// Diagnostic category of a dermoscopic lesion image.
///
/// Variant order is the order of the classifier's output vector and is
/// used to break probability ties; it must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LesionClass {
    /// Actinic keratosis.
    #[serde(rename = "actinic keratosis")]
    ActinicKeratosis,
    /// Basal cell carcinoma.
    #[serde(rename = "basal cell carcinoma")]
    BasalCellCarcinoma,
    /// Dermatofibroma.
    #[serde(rename = "dermatofibroma")]
    Dermatofibroma,
    /// Melanoma.
    #[serde(rename = "melanoma")]
    Melanoma,
    /// Nevus.
    #[serde(rename = "nevus")]
    Nevus,
    /// Pigmented benign keratosis.
    #[serde(rename = "pigmented benign keratosis")]
    PigmentedBenignKeratosis,
    /// Seborrheic keratosis.
    #[serde(rename = "seborrheic keratosis")]
    SeborrheicKeratosis,
    /// Squamous cell carcinoma.
    #[serde(rename = "squamous cell carcinoma")]
    SquamousCellCarcinoma,
    /// Vascular lesion.
    #[serde(rename = "vascular lesion")]
    VascularLesion,
}

impl LesionClass {
    /// All classes in output order.
    pub const ALL: [Self; NUM_CLASSES] = [
        Self::ActinicKeratosis,
        Self::BasalCellCarcinoma,
        Self::Dermatofibroma,
        Self::Melanoma,
        Self::Nevus,
        Self::PigmentedBenignKeratosis,
        Self::SeborrheicKeratosis,
        Self::SquamousCellCarcinoma,
        Self::VascularLesion,
    ];

    /// Look up a class by output index.
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(CoreError::UnknownClass(index))
    }

    /// Position in the output vector.
    #[must_use]
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Human-readable label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ActinicKeratosis => "actinic keratosis",
            Self::BasalCellCarcinoma => "basal cell carcinoma",
            Self::Dermatofibroma => "dermatofibroma",
            Self::Melanoma => "melanoma",
            Self::Nevus => "nevus",
            Self::PigmentedBenignKeratosis => "pigmented benign keratosis",
            Self::SeborrheicKeratosis => "seborrheic keratosis",
            Self::SquamousCellCarcinoma => "squamous cell carcinoma",
            Self::VascularLesion => "vascular lesion",
        }
    }
}

impl std::fmt::Display for LesionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
