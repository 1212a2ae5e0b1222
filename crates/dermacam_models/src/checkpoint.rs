//! Model checkpointing and weight loading.
//!
//! Weights are stored with Burn's named MessagePack recorder (`*.mpk`,
//! full precision). A JSON sidecar with [`CheckpointMetadata`] records the
//! architecture and configuration the weights were produced with.
//!
//! # Example
//!
//! ```rust,ignore
//! use dermacam_models::{load_or_build, DermNetConfig};
//!
//! let config = DermNetConfig::default();
//! let classifier = load_or_build::<GradBackend>(Some("weights.mpk".as_ref()), &config, &device)?;
//! ```

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use dermacam_core::LesionClass;
use parking_lot::Mutex;

use crate::classifier::{DermNetClassifier, WeightsSource};
use crate::cnn::{DermNet, DermNetConfig};
use crate::error::{LoadError, ModelError};

/// Architecture name written to checkpoint metadata.
pub const ARCH_NAME: &str = "DermNet";

/// Extension the recorder appends to weight files.
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Backend seeding is global; building a seeded model holds this lock.
static SEED_LOCK: Mutex<()> = Mutex::new(());

/// Save a model to a checkpoint file.
///
/// # Arguments
///
/// * `model` - The model to save
/// * `path` - Output path; the extension is replaced by `.mpk`
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let record = model.clone().into_record();
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(record, weights_path(path))
        .map_err(|e| CheckpointError::Save(e.to_string()))?;
    Ok(())
}

/// Load a model record from a checkpoint file.
///
/// # Arguments
///
/// * `path` - Path to checkpoint
/// * `device` - Device to load the record onto
pub fn load_record<B, M>(path: impl AsRef<Path>, device: &B::Device) -> Result<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .load(weights_path(path), device)
        .map_err(|e| CheckpointError::Load(e.to_string()))
}

/// The file the recorder actually reads or writes for `path`.
#[must_use]
pub fn weights_path(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref().with_extension(WEIGHTS_EXTENSION)
}

/// The metadata sidecar stored next to the weights at `path`.
#[must_use]
pub fn metadata_path(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref().with_extension("json")
}

/// Model checkpoint metadata.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CheckpointMetadata {
    /// Model architecture name.
    pub arch: String,
    /// Model configuration.
    pub config: DermNetConfig,
    /// Output labels in logit order.
    pub labels: Vec<String>,
    /// Additional metadata.
    pub extra: std::collections::BTreeMap<String, String>,
}

impl CheckpointMetadata {
    /// Create metadata for a DermNet configuration.
    pub fn new(config: &DermNetConfig) -> Self {
        Self {
            arch: ARCH_NAME.to_string(),
            config: config.clone(),
            labels: LesionClass::ALL.iter().map(|c| c.as_str().to_string()).collect(),
            extra: std::collections::BTreeMap::new(),
        }
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Check that weights described by this metadata fit `config`.
    pub fn check_compatible(&self, config: &DermNetConfig) -> Result<()> {
        if self.arch != ARCH_NAME {
            return Err(CheckpointError::InvalidFormat(format!(
                "architecture '{}' is not {}",
                self.arch, ARCH_NAME
            )));
        }
        let expected: Vec<&str> = LesionClass::ALL.iter().map(|c| c.as_str()).collect();
        if self.labels != expected {
            return Err(CheckpointError::InvalidFormat(
                "label order differs from the lesion label set".to_string(),
            ));
        }
        if self.config.n_filters != config.n_filters
            || self.config.hidden != config.hidden
            || self.config.kernel_size != config.kernel_size
        {
            return Err(CheckpointError::InvalidFormat(format!(
                "weights were saved for filters {:?} hidden {:?}, config has filters {:?} hidden {:?}",
                self.config.n_filters, self.config.hidden, config.n_filters, config.hidden
            )));
        }
        Ok(())
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::Save(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| CheckpointError::Save(e.to_string()))?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json =
            std::fs::read_to_string(path).map_err(|e| CheckpointError::Load(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| CheckpointError::Load(e.to_string()))
    }
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// Checkpoint does not fit the configured network.
    #[error("Invalid checkpoint format: {0}")]
    InvalidFormat(String),

    /// The network could not be built from its configuration.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Extension trait for models to add checkpoint methods.
pub trait ModelCheckpoint<B: Backend>: Module<B> {
    /// Save the model to a checkpoint file.
    fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        save_model::<B, Self>(self, path)
    }

    /// Load model from a checkpoint into an existing model.
    fn load_checkpoint(&self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self>
    where
        Self: Sized,
    {
        let record = load_record::<B, Self>(path, device)?;
        Ok(self.clone().load_record(record))
    }
}

// Implement for all modules
impl<B: Backend, M: Module<B>> ModelCheckpoint<B> for M {}

/// Build a DermNet with weights drawn from `config.seed`.
///
/// The configuration is validated first. Parameters are initialised lazily,
/// so a warm-up pass runs while the seed lock is held to draw every weight
/// in a fixed order.
///
/// # Errors
///
/// Returns a [`ModelError`] if `config` fails [`DermNetConfig::validate`].
pub fn build_seeded<B: Backend>(
    config: &DermNetConfig,
    device: &B::Device,
) -> std::result::Result<DermNet<B>, ModelError> {
    config.validate()?;
    let _guard = SEED_LOCK.lock();
    B::seed(config.seed.value());
    let model = config.init::<B>(device);
    let side = 1usize << model.n_stages();
    let _ = model.forward(Tensor::<B, 4>::zeros([1, 3, side, side], device));
    Ok(model)
}

/// Write fresh seeded weights and their metadata sidecar to `path`.
///
/// Returns the path of the weights file.
pub fn init_weights<B: Backend>(
    config: &DermNetConfig,
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<PathBuf> {
    let model = build_seeded::<B>(config, device)?;
    model.save_checkpoint(&path)?;
    CheckpointMetadata::new(config)
        .with_extra("seed", config.seed.value().to_string())
        .save(metadata_path(&path))?;
    Ok(weights_path(path))
}

/// Load the classifier from `path` or build it with seeded weights.
///
/// A missing file (or no path) is not an error: the network starts from
/// the configured seed and a warning is logged. A file that exists but
/// cannot be read into the network is [`LoadError::Corrupt`].
pub fn load_or_build<B: AutodiffBackend>(
    path: Option<&Path>,
    config: &DermNetConfig,
    device: &B::Device,
) -> std::result::Result<DermNetClassifier<B>, LoadError> {
    let fresh = build_seeded::<B>(config, device)?;

    let Some(path) = path else {
        tracing::warn!(
            seed = config.seed.value(),
            "No weights path configured, using freshly initialised weights"
        );
        return Ok(DermNetClassifier::new(fresh, config, device, WeightsSource::Fresh)?);
    };

    let file = weights_path(path);
    if !file.exists() {
        tracing::warn!(
            path = %file.display(),
            seed = config.seed.value(),
            "Weights file not found, using freshly initialised weights"
        );
        return Ok(DermNetClassifier::new(fresh, config, device, WeightsSource::Fresh)?);
    }

    let corrupt = |reason: String| LoadError::Corrupt {
        path: file.clone(),
        reason,
    };

    let sidecar = metadata_path(path);
    if sidecar.exists() {
        CheckpointMetadata::load(&sidecar)
            .and_then(|meta| meta.check_compatible(config))
            .map_err(|e| corrupt(e.to_string()))?;
    }

    let expected_params = fresh.num_params();
    let loaded = fresh
        .load_checkpoint(path, device)
        .map_err(|e| corrupt(e.to_string()))?;
    if loaded.num_params() != expected_params {
        return Err(corrupt(format!(
            "holds {} parameters, network has {}",
            loaded.num_params(),
            expected_params
        )));
    }

    tracing::info!(path = %file.display(), "Loaded classifier weights");
    Ok(DermNetClassifier::new(
        loaded,
        config,
        device,
        WeightsSource::Loaded(file),
    )?)
}
