//! Metrics record persisted next to the trained model
//!
//! Readers tolerate missing keys: numbers default to 0 and strings to "",
//! except `threshold`, which falls back to the uncalibrated 0.5 cutoff.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::training::Calibration;
use crate::utils::error::Result;
use crate::utils::metrics::{BinaryConfusionMatrix, BinaryMetrics};

/// Cutoff used when no calibrated threshold was recorded
pub const DEFAULT_THRESHOLD: f32 = 0.5;

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

/// Test-split evaluation of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsRecord {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
    pub total_samples: usize,
    /// RFC 3339 timestamp of the run
    pub training_date: String,
    /// Calibrated decision threshold (`p > threshold` means jaundice)
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    pub model_version: String,
    /// ROC candidate the threshold was derived from
    pub roc_candidate: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roc_auc: Option<f64>,
}

impl Default for MetricsRecord {
    fn default() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            true_negatives: 0,
            false_positives: 0,
            false_negatives: 0,
            true_positives: 0,
            total_samples: 0,
            training_date: String::new(),
            threshold: DEFAULT_THRESHOLD,
            model_version: String::new(),
            roc_candidate: 0.0,
            roc_auc: None,
        }
    }
}

impl MetricsRecord {
    /// Record for metrics measured at `threshold`
    pub fn from_metrics(metrics: &BinaryMetrics, threshold: f32, model_version: &str) -> Self {
        let cm = metrics.confusion;
        Self {
            accuracy: metrics.accuracy,
            precision: metrics.precision,
            recall: metrics.recall,
            f1_score: metrics.f1_score,
            true_negatives: cm.true_negatives,
            false_positives: cm.false_positives,
            false_negatives: cm.false_negatives,
            true_positives: cm.true_positives,
            total_samples: cm.total(),
            training_date: Utc::now().to_rfc3339(),
            threshold,
            model_version: model_version.to_string(),
            roc_candidate: threshold,
            roc_auc: None,
        }
    }

    pub fn from_calibration(calibration: &Calibration, model_version: &str) -> Self {
        Self {
            roc_candidate: calibration.candidate,
            roc_auc: calibration.auc,
            ..Self::from_metrics(&calibration.metrics, calibration.threshold, model_version)
        }
    }

    pub fn confusion(&self) -> BinaryConfusionMatrix {
        BinaryConfusionMatrix {
            true_negatives: self.true_negatives,
            false_positives: self.false_positives,
            false_negatives: self.false_negatives,
            true_positives: self.true_positives,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl std::fmt::Display for MetricsRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Model Version: {}", display_or_na(&self.model_version))?;
        writeln!(f, "Training Date: {}", display_or_na(&self.training_date))?;
        writeln!(f, "Threshold:     {:.4}", self.threshold)?;
        writeln!(f)?;
        writeln!(f, "Accuracy:  {:.4}", self.accuracy)?;
        writeln!(f, "Precision: {:.4}", self.precision)?;
        writeln!(f, "Recall:    {:.4}", self.recall)?;
        writeln!(f, "F1 Score:  {:.4}", self.f1_score)?;
        if let Some(auc) = self.roc_auc {
            writeln!(f, "ROC AUC:   {:.4}", auc)?;
        }
        writeln!(f)?;
        write!(f, "{}", self.confusion())?;
        write!(f, "Test Samples: {}", self.total_samples)
    }
}

fn display_or_na(value: &str) -> &str {
    if value.is_empty() {
        "N/A"
    } else {
        value
    }
}
