//! Configuration Module
//!
//! Training and serving settings. `TrainingConfig` defaults reproduce the
//! reference training run; files may be TOML or JSON (chosen by extension)
//! and may omit any field.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::AugmentationConfig;
use crate::model::ClassifierConfig;
use crate::utils::error::{JaundiceError, Result};

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Dataset root holding `train/`, `validate/` and `test/`
    pub data_dir: PathBuf,

    /// Artifact directory (model, config, metrics, checkpoints)
    pub output_dir: PathBuf,

    /// Square model input size; overrides `model.input_size`
    pub image_size: usize,

    pub batch_size: usize,

    /// Seed for shuffling and augmentation
    pub seed: u64,

    /// Epoch budget of the head-only phase
    pub epochs_phase1: usize,

    /// Epoch budget of the fine-tuning phase
    pub epochs_phase2: usize,

    /// Learning rate of the head-only phase
    pub base_lr: f64,

    /// Learning rate of the fine-tuning phase
    pub fine_tune_lr: f64,

    /// Adam weight decay (0 disables it)
    pub weight_decay: f64,

    /// Epochs without val_loss improvement before a phase stops
    pub early_stopping_patience: usize,

    /// Epochs without val_loss improvement before the LR is reduced
    pub plateau_patience: usize,

    pub plateau_factor: f64,

    pub min_lr: f64,

    /// Minimum val_loss decrease that counts as improvement for the plateau scheduler
    pub min_delta: f64,

    /// Backbone stages kept frozen while fine-tuning
    pub frozen_prefix: usize,

    /// Optional pretrained model whose backbone seeds the run
    pub backbone_path: Option<PathBuf>,

    /// Version string written to the metrics record
    pub model_version: String,

    pub augmentation: AugmentationConfig,

    #[serde(default = "ClassifierConfig::new")]
    pub model: ClassifierConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("models"),
            image_size: crate::IMAGE_SIZE,
            batch_size: 32,
            seed: 42,
            epochs_phase1: 30,
            epochs_phase2: 30,
            base_lr: 1e-4,
            fine_tune_lr: 1e-5,
            weight_decay: 0.0,
            early_stopping_patience: 8,
            plateau_patience: 4,
            plateau_factor: 0.3,
            min_lr: 1e-7,
            min_delta: 1e-4,
            frozen_prefix: 2,
            backbone_path: None,
            model_version: "1.0".to_string(),
            augmentation: AugmentationConfig::default(),
            model: ClassifierConfig::new(),
        }
    }
}

impl TrainingConfig {
    /// Architecture with the configured input size applied
    pub fn classifier_config(&self) -> ClassifierConfig {
        self.model.clone().with_input_size(self.image_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(JaundiceError::Config("batch_size must be greater than 0".to_string()));
        }

        for (name, lr) in [("base_lr", self.base_lr), ("fine_tune_lr", self.fine_tune_lr)] {
            if !(lr.is_finite() && lr > 0.0) {
                return Err(JaundiceError::Config(format!("{} must be positive, got {}", name, lr)));
            }
        }

        if !(self.plateau_factor > 0.0 && self.plateau_factor < 1.0) {
            return Err(JaundiceError::Config(format!(
                "plateau_factor must be in (0, 1), got {}",
                self.plateau_factor
            )));
        }

        if self.min_lr < 0.0 || self.min_delta < 0.0 || self.weight_decay < 0.0 {
            return Err(JaundiceError::Config(
                "min_lr, min_delta and weight_decay must not be negative".to_string(),
            ));
        }

        if self.early_stopping_patience == 0 || self.plateau_patience == 0 {
            return Err(JaundiceError::Config("patience values must be at least 1".to_string()));
        }

        let classifier = self.classifier_config();
        classifier.validate()?;
        if self.frozen_prefix > classifier.depth() {
            return Err(JaundiceError::Config(format!(
                "frozen_prefix {} exceeds backbone depth {}",
                self.frozen_prefix,
                classifier.depth()
            )));
        }

        Ok(())
    }

    /// Load from a `.toml` or `.json` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = match extension(path).as_deref() {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| JaundiceError::Config(format!("Invalid TOML in {:?}: {}", path, e)))?,
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| JaundiceError::Config(format!("Invalid JSON in {:?}: {}", path, e)))?,
            _ => {
                return Err(JaundiceError::Config(format!(
                    "Unsupported config format {:?} (expected .toml or .json)",
                    path
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Save as `.toml` or `.json` depending on the extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match extension(path).as_deref() {
            Some("toml") => toml::to_string_pretty(self)
                .map_err(|e| JaundiceError::Serialization(e.to_string()))?,
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => {
                return Err(JaundiceError::Config(format!(
                    "Unsupported config format {:?} (expected .toml or .json)",
                    path
                )))
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// HTTP serving configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    /// Artifact directory produced by training
    pub model_dir: PathBuf,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            model_dir: PathBuf::from("models"),
        }
    }
}

impl ServeConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = TrainingConfig::default();
        assert_eq!(config.image_size, 224);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.seed, 42);
        assert_eq!((config.epochs_phase1, config.epochs_phase2), (30, 30));
        assert_eq!(config.base_lr, 1e-4);
        assert_eq!(config.fine_tune_lr, 1e-5);
        assert_eq!(config.early_stopping_patience, 8);
        assert_eq!(config.plateau_patience, 4);
        assert_eq!(config.plateau_factor, 0.3);
        assert_eq!(config.min_lr, 1e-7);
        assert_eq!(config.frozen_prefix, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.toml");
        std::fs::write(&path, "batch_size = 16\nepochs_phase1 = 5\n\n[augmentation]\nrotation_degrees = 10.0\n").unwrap();

        let config = TrainingConfig::load(&path).unwrap();
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.epochs_phase1, 5);
        assert_eq!(config.epochs_phase2, 30);
        assert_eq!(config.augmentation.rotation_degrees, 10.0);
        assert_eq!(config.augmentation.width_shift, 0.25);
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = TempDir::new().unwrap();
        let config = TrainingConfig {
            image_size: 64,
            batch_size: 8,
            seed: 7,
            ..Default::default()
        };

        for name in ["config.toml", "config.json"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();
            let loaded = TrainingConfig::load(&path).unwrap();
            assert_eq!(loaded.seed, 7);
            assert_eq!(loaded.image_size, 64);
            assert_eq!(loaded.model, config.model);
        }
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "batch_size: 3").unwrap();
        assert!(matches!(TrainingConfig::load(&path), Err(JaundiceError::Config(_))));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = TrainingConfig::default();
        config.plateau_factor = 1.5;
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.frozen_prefix = 6;
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.image_size = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_classifier_config_uses_image_size() {
        let mut config = TrainingConfig::default();
        config.image_size = 64;
        assert_eq!(config.classifier_config().input_size, 64);
    }

    #[test]
    fn test_serve_bind_address() {
        assert_eq!(ServeConfig::default().bind_address(), "0.0.0.0:5000");
    }
}
