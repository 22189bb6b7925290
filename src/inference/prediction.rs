//! Prediction result types
//!
//! These are the response shapes of the single and batch endpoints.

use serde::{Deserialize, Serialize};

use crate::dataset::Label;

/// Verdict for one image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: Label,
    /// max(p, 1 - p)
    pub confidence: f32,
    pub probability_jaundice: f32,
    pub probability_normal: f32,
}

impl PredictionResult {
    /// Apply the decision rule `p > threshold` to a jaundice probability
    pub fn from_probability(probability_jaundice: f32, threshold: f32) -> Self {
        let p = probability_jaundice.clamp(0.0, 1.0);
        let probability_normal = 1.0 - p;

        let prediction = if p > threshold {
            Label::Jaundice
        } else {
            Label::Normal
        };

        Self {
            prediction,
            confidence: p.max(probability_normal),
            probability_jaundice: p,
            probability_normal,
        }
    }

    pub fn is_jaundice(&self) -> bool {
        self.prediction == Label::Jaundice
    }
}

/// Outcome of one batch item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemOutcome {
    Success(PredictionResult),
    Error { error: String },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success(_))
    }

    pub fn prediction(&self) -> Option<&PredictionResult> {
        match self {
            ItemOutcome::Success(result) => Some(result),
            ItemOutcome::Error { .. } => None,
        }
    }
}

/// A batch item tagged with the name it was submitted under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub filename: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Batch response, same order as the input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub results: Vec<BatchItemResult>,
    pub total: usize,
    pub successful: usize,
}

impl BatchPrediction {
    pub fn new(results: Vec<BatchItemResult>) -> Self {
        let successful = results.iter().filter(|r| r.outcome.is_success()).count();
        Self {
            total: results.len(),
            successful,
            results,
        }
    }

    pub fn failed(&self) -> usize {
        self.total - self.successful
    }
}
