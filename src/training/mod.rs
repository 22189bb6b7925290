//! Training module for the two-phase transfer-learning schedule
//!
//! This module provides:
//! - The head-only / fine-tune phase state machine
//! - Early stopping and reduce-on-plateau scheduling on val_loss
//! - Best val_accuracy checkpointing across the whole run
//! - F1-optimal threshold calibration on the test split
//!
//! ## Schedule
//!
//! 1. Train the head on a frozen backbone at `base_lr`
//! 2. Unfreeze backbone stages past `frozen_prefix`, reset the optimizer and
//!    continue at `fine_tune_lr`
//! 3. Reinstate the best checkpoint, score the test split and calibrate the
//!    decision threshold

pub mod calibration;
pub mod checkpoint;
pub mod early_stopping;
pub mod orchestrator;
pub mod pipeline;
pub mod scheduler;

// Re-export main types for convenience
pub use calibration::{calibrate_threshold, Calibration, CurvePoint};
pub use checkpoint::{BestCheckpoint, CheckpointInfo};
pub use early_stopping::EarlyStopping;
pub use orchestrator::{
    binary_cross_entropy, predict_split, EpochRecord, Evaluation, Phase, PhaseSummary, StopReason,
    TrainingOrchestrator, TrainingReport,
};
pub use pipeline::{evaluate_artifact, run_training, score_split, ArtifactEvaluation, TrainingOutcome};
pub use scheduler::{PlateauConfig, ReduceOnPlateau};

/// Probability clamp for the validation BCE
pub const PROBABILITY_EPSILON: f64 = 1e-7;

/// Cutoff for validation accuracy during training
pub const VALIDATION_THRESHOLD: f32 = 0.5;

/// Keeps the sweep's F1 finite when precision and recall are both 0
pub const F1_EPSILON: f64 = 1e-7;
