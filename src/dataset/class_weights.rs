//! Class weights for the imbalanced training split
//!
//! `w_c = N / (2 * N_c)`: balanced weighting, so both classes contribute
//! equally to the weighted loss in expectation.

use serde::{Deserialize, Serialize};

use super::{Label, SplitSamples, NUM_CLASSES};
use crate::utils::error::{JaundiceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    weights: [f64; NUM_CLASSES],
}

impl ClassWeights {
    /// Weights from per-label counts (indexed by `Label::index`)
    ///
    /// A class with no samples is an `EmptyDataset` error for `train/<label>`.
    pub fn from_counts(counts: [usize; NUM_CLASSES]) -> Result<Self> {
        let total: usize = counts.iter().sum();
        let mut weights = [0.0; NUM_CLASSES];

        for label in Label::ALL {
            let count = counts[label.index()];
            if count == 0 {
                return Err(JaundiceError::EmptyDataset {
                    split: format!("train/{}", label),
                });
            }
            weights[label.index()] = total as f64 / (NUM_CLASSES as f64 * count as f64);
        }

        Ok(Self { weights })
    }

    /// Weights from the labels of a training split
    pub fn from_split(split: &SplitSamples) -> Result<Self> {
        Self::from_counts(split.label_counts())
    }

    /// Equal weighting for both classes
    pub fn uniform() -> Self {
        Self {
            weights: [1.0; NUM_CLASSES],
        }
    }

    pub fn weight_for(&self, label: Label) -> f64 {
        self.weights[label.index()]
    }

    /// Per-sample weights for a batch of labels
    pub fn sample_weights(&self, labels: &[Label]) -> Vec<f32> {
        labels.iter().map(|&l| self.weight_for(l) as f32).collect()
    }
}

impl std::fmt::Display for ClassWeights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "normal={:.4}, jaundice={:.4}",
            self.weight_for(Label::Normal),
            self.weight_for(Label::Jaundice)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imbalanced_counts() {
        let weights = ClassWeights::from_counts([80, 20]).unwrap();
        assert!((weights.weight_for(Label::Normal) - 0.625).abs() < 1e-12);
        assert!((weights.weight_for(Label::Jaundice) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_balanced_counts_give_unit_weights() {
        let weights = ClassWeights::from_counts([50, 50]).unwrap();
        assert_eq!(weights, ClassWeights::uniform());
    }

    #[test]
    fn test_weighted_classes_contribute_equally() {
        let counts = [73, 19];
        let weights = ClassWeights::from_counts(counts).unwrap();
        let normal_mass = weights.weight_for(Label::Normal) * counts[0] as f64;
        let jaundice_mass = weights.weight_for(Label::Jaundice) * counts[1] as f64;
        assert!((normal_mass - jaundice_mass).abs() < 1e-9);
    }

    #[test]
    fn test_missing_class_is_error() {
        let err = ClassWeights::from_counts([10, 0]).unwrap_err();
        match err {
            JaundiceError::EmptyDataset { split } => assert_eq!(split, "train/jaundice"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sample_weights() {
        let weights = ClassWeights::from_counts([3, 1]).unwrap();
        let per_sample = weights.sample_weights(&[Label::Jaundice, Label::Normal]);
        assert!((per_sample[0] - 2.0).abs() < 1e-6);
        assert!((per_sample[1] - 2.0 / 3.0).abs() < 1e-6);
    }
}
