//! Metrics Module for Binary Evaluation
//!
//! Confusion-matrix based metrics for the normal (0) / jaundice (1) task.
//! Precision, recall and F1 follow the usual zero-division convention:
//! an undefined ratio evaluates to 0.

use serde::{Deserialize, Serialize};

use crate::dataset::Label;

/// 2x2 confusion matrix with jaundice as the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl BinaryConfusionMatrix {
    /// Build from predicted-positive flags and ground truth labels
    pub fn from_predictions(predicted_positive: &[bool], ground_truth: &[Label]) -> Self {
        let mut cm = Self::default();
        for (&predicted, &actual) in predicted_positive.iter().zip(ground_truth) {
            cm.add(actual, predicted);
        }
        cm
    }

    /// Build by thresholding scores with the serving rule `score > threshold`
    pub fn at_threshold(scores: &[f32], ground_truth: &[Label], threshold: f32) -> Self {
        let predicted: Vec<bool> = scores.iter().map(|&s| s > threshold).collect();
        Self::from_predictions(&predicted, ground_truth)
    }

    /// Record a single outcome
    pub fn add(&mut self, actual: Label, predicted_positive: bool) {
        match (actual, predicted_positive) {
            (Label::Normal, false) => self.true_negatives += 1,
            (Label::Normal, true) => self.false_positives += 1,
            (Label::Jaundice, false) => self.false_negatives += 1,
            (Label::Jaundice, true) => self.true_positives += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// F1 as 2TP / (2TP + FP + FN)
    pub fn f1(&self) -> f64 {
        ratio(
            2 * self.true_positives,
            2 * self.true_positives + self.false_positives + self.false_negatives,
        )
    }

    /// Render as a small table
    pub fn display(&self) -> String {
        format!(
            "                 pred normal  pred jaundice\n\
             actual normal    {:>11}  {:>13}\n\
             actual jaundice  {:>11}  {:>13}\n",
            self.true_negatives, self.false_positives, self.false_negatives, self.true_positives
        )
    }
}

impl std::fmt::Display for BinaryConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Summary metrics derived from a confusion matrix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion: BinaryConfusionMatrix,
}

impl BinaryMetrics {
    pub fn from_confusion(confusion: BinaryConfusionMatrix) -> Self {
        Self {
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1_score: confusion.f1(),
            confusion,
        }
    }

    /// Metrics of `scores` against `ground_truth` at a decision threshold
    pub fn at_threshold(scores: &[f32], ground_truth: &[Label], threshold: f32) -> Self {
        Self::from_confusion(BinaryConfusionMatrix::at_threshold(scores, ground_truth, threshold))
    }

    pub fn total_samples(&self) -> usize {
        self.confusion.total()
    }
}

impl std::fmt::Display for BinaryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Accuracy:  {:.4}", self.accuracy)?;
        writeln!(f, "Precision: {:.4}", self.precision)?;
        writeln!(f, "Recall:    {:.4}", self.recall)?;
        writeln!(f, "F1 Score:  {:.4}", self.f1_score)?;
        write!(f, "{}", self.confusion)
    }
}

/// Running average of a scalar (e.g. per-batch loss)
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value weighted by the number of samples it covers
    pub fn add_weighted(&mut self, value: f64, samples: usize) {
        self.sum += value * samples as f64;
        self.count += samples;
    }

    pub fn add(&mut self, value: f64) {
        self.add_weighted(value, 1);
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}
