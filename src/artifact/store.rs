//! Artifact directory layout and persistence
//!
//! ```text
//! <dir>/jaundice_model.mpk              trained parameters (ModelRecorder)
//! <dir>/model_config.json               ClassifierConfig
//! <dir>/model_metrics.json              MetricsRecord
//! <dir>/checkpoints/best_checkpoint.mpk best epoch written during training
//! ```

use std::path::{Path, PathBuf};

use burn::{module::Module, tensor::backend::Backend};
use tracing::info;

use super::metrics_record::MetricsRecord;
use crate::model::{ClassifierConfig, JaundiceClassifier, ModelRecorder};
use crate::utils::error::{JaundiceError, Result};

pub const MODEL_FILE: &str = "jaundice_model.mpk";
pub const CONFIG_FILE: &str = "model_config.json";
pub const METRICS_FILE: &str = "model_metrics.json";
pub const CHECKPOINT_DIR: &str = "checkpoints";
pub const CHECKPOINT_FILE: &str = "best_checkpoint.mpk";

/// Handle on an artifact directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(METRICS_FILE)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_DIR).join(CHECKPOINT_FILE)
    }

    /// True if both the weights and the architecture are present
    pub fn has_model(&self) -> bool {
        self.model_path().is_file() && self.config_path().is_file()
    }

    /// Write the weights and the architecture they were built from
    pub fn save_model<B: Backend>(&self, model: &JaundiceClassifier<B>, config: &ClassifierConfig) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        config.save_json(&self.config_path())?;

        let path = self.model_path();
        model
            .clone()
            .save_file(path.clone(), &ModelRecorder::new())
            .map_err(|e| JaundiceError::Model(format!("Failed to save model to {:?}: {:?}", path, e)))?;

        info!("Model saved to {:?}", path);
        Ok(())
    }

    /// Rebuild the classifier from the stored architecture and load its weights
    ///
    /// A missing or unreadable artifact is `ModelUnavailable`.
    pub fn load_model<B: Backend>(&self, device: &B::Device) -> Result<(JaundiceClassifier<B>, ClassifierConfig)> {
        if !self.has_model() {
            return Err(JaundiceError::ModelUnavailable(format!(
                "no trained model in {:?}; run training first",
                self.dir
            )));
        }

        let config = self
            .load_config()
            .map_err(|e| JaundiceError::ModelUnavailable(format!("invalid model config: {}", e)))?;
        let model = JaundiceClassifier::load(&config, &self.model_path(), device)
            .map_err(|e| JaundiceError::ModelUnavailable(e.to_string()))?;

        info!("Model loaded from {:?}", self.model_path());
        Ok((model, config))
    }

    /// Architecture of the stored model, without loading the weights
    pub fn load_config(&self) -> Result<ClassifierConfig> {
        ClassifierConfig::load_json(&self.config_path())
    }

    pub fn save_metrics(&self, record: &MetricsRecord) -> Result<()> {
        record.save(&self.metrics_path())?;
        info!("Metrics saved to {:?}", self.metrics_path());
        Ok(())
    }

    /// The stored metrics record, or `None` if training never completed
    pub fn load_metrics(&self) -> Result<Option<MetricsRecord>> {
        let path = self.metrics_path();
        if !path.is_file() {
            return Ok(None);
        }
        MetricsRecord::load(&path).map(Some)
    }
}
