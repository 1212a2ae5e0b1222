//! Seed for freshly initialised classifier weights.

use serde::{Deserialize, Serialize};

/// Seed handed to the backend before fresh weights are drawn.
///
/// Two processes started with the same seed and configuration serve
/// identical outputs.
///
/// # Example
///
/// ```rust
/// use dermacam_core::Seed;
///
/// let seed: Seed = 7.into();
/// assert_eq!(seed.value(), 7);
/// assert_eq!(Seed::default().value(), 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(u64);

impl Seed {
    /// Wrap a raw seed value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw value passed to the backend.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl Default for Seed {
    fn default() -> Self {
        Self::new(42)
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}
