//! Decision threshold calibration
//!
//! Sweeps every ROC candidate threshold on the test split and keeps the one
//! with the highest F1. A sample is positive iff `score > threshold`, the same
//! rule the inference service applies.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::F1_EPSILON;
use crate::dataset::Label;
use crate::utils::error::{JaundiceError, Result};
use crate::utils::metrics::BinaryMetrics;

/// One candidate threshold of the sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub threshold: f32,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub false_positive_rate: f64,
}

impl CurvePoint {
    /// Recall is the true positive rate
    pub fn true_positive_rate(&self) -> f64 {
        self.recall
    }
}

/// Result of a calibration sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// ROC candidate with the highest F1 (smallest one on ties)
    pub candidate: f32,
    /// Operating threshold, strictly inside the score gap above `candidate`
    pub threshold: f32,
    /// F1 of the sweep at `candidate`
    pub candidate_f1: f64,
    /// Metrics recomputed at `threshold`
    pub metrics: BinaryMetrics,
    /// All candidates in ascending threshold order
    pub curve: Vec<CurvePoint>,
    /// Area under the ROC curve; `None` if a class is missing
    pub auc: Option<f64>,
}

/// Find the F1-optimal decision threshold for order-aligned scores and labels
pub fn calibrate_threshold(scores: &[f32], labels: &[Label]) -> Result<Calibration> {
    if scores.is_empty() {
        return Err(JaundiceError::EmptyDataset {
            split: "test".to_string(),
        });
    }
    if scores.len() != labels.len() {
        return Err(JaundiceError::InvalidInput(format!(
            "{} scores for {} labels",
            scores.len(),
            labels.len()
        )));
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(JaundiceError::InvalidInput(format!("non-finite score {}", bad)));
    }

    let mut pairs: Vec<(f32, Label)> = scores.iter().copied().zip(labels.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let candidates = candidate_thresholds(scores);
    let curve = sweep(&pairs, &candidates);

    // Strict comparison keeps the first (smallest) candidate on ties
    let mut best = 0;
    for (i, point) in curve.iter().enumerate() {
        if point.f1 > curve[best].f1 {
            best = i;
        }
    }

    let candidate = curve[best].threshold;
    let threshold = match curve.get(best + 1) {
        Some(next) => midpoint(candidate, next.threshold),
        None => candidate,
    };
    let metrics = BinaryMetrics::at_threshold(scores, labels, threshold);
    let both_classes = Label::ALL.iter().all(|label| labels.contains(label));
    let auc = both_classes.then(|| roc_auc(&curve));

    debug!("Evaluated {} candidate thresholds", curve.len());
    info!(
        "Calibrated threshold {:.4} (candidate {:.4}, F1 {:.4}, AUC {})",
        threshold,
        candidate,
        metrics.f1_score,
        auc.map(|a| format!("{:.4}", a)).unwrap_or_else(|| "n/a".to_string())
    );

    Ok(Calibration {
        candidate,
        threshold,
        candidate_f1: curve[best].f1,
        metrics,
        curve,
        auc,
    })
}

/// Distinct scores plus 0 and 1, ascending
fn candidate_thresholds(scores: &[f32]) -> Vec<f32> {
    let mut candidates: Vec<f32> = scores.iter().copied().chain([0.0, 1.0]).collect();
    candidates.sort_by(|a, b| a.total_cmp(b));
    candidates.dedup();
    candidates
}

/// Single pass over score-sorted pairs and ascending candidates
fn sweep(sorted: &[(f32, Label)], candidates: &[f32]) -> Vec<CurvePoint> {
    let total_pos = sorted.iter().filter(|(_, l)| *l == Label::Jaundice).count();
    let total_neg = sorted.len() - total_pos;

    let mut cursor = 0;
    let mut pos_at_or_below = 0;
    let mut neg_at_or_below = 0;

    candidates
        .iter()
        .map(|&t| {
            while cursor < sorted.len() && sorted[cursor].0 <= t {
                match sorted[cursor].1 {
                    Label::Jaundice => pos_at_or_below += 1,
                    Label::Normal => neg_at_or_below += 1,
                }
                cursor += 1;
            }

            let tp = total_pos - pos_at_or_below;
            let fp = total_neg - neg_at_or_below;
            let precision = ratio(tp, tp + fp);
            let recall = ratio(tp, total_pos);

            CurvePoint {
                threshold: t,
                precision,
                recall,
                f1: 2.0 * precision * recall / (precision + recall + F1_EPSILON),
                false_positive_rate: ratio(fp, total_neg),
            }
        })
        .collect()
}

/// Midpoint of `low` and `high`, falling back to `low` if it rounds onto `high`
fn midpoint(low: f32, high: f32) -> f32 {
    let mid = low + (high - low) / 2.0;
    if mid > low && mid < high {
        mid
    } else {
        low
    }
}

/// Trapezoidal area under the ROC curve
fn roc_auc(curve: &[CurvePoint]) -> f64 {
    // Ascending thresholds walk the curve from (1, 1) toward (0, 0)
    let mut points: Vec<(f64, f64)> = Vec::with_capacity(curve.len() + 2);
    points.push((1.0, 1.0));
    points.extend(curve.iter().map(|p| (p.false_positive_rate, p.true_positive_rate())));
    points.push((0.0, 0.0));

    points
        .windows(2)
        .map(|w| (w[0].0 - w[1].0) * (w[0].1 + w[1].1) / 2.0)
        .sum()
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
