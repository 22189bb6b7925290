//! Two-Phase Training Orchestrator
//!
//! Drives a [`TrainableModel`] through the head-only and fine-tuning phases:
//!
//! ```text
//! HeadOnly --(budget or early stop)--> FineTune --(budget or early stop)--> Finished
//! ```
//!
//! Without pretrained backbone weights the head-only phase trains the whole
//! network instead, since freezing random features teaches nothing.
//!
//! Early stopping and LR-on-plateau restart with every phase; the best
//! validation-accuracy checkpoint spans the whole run and is reinstated once
//! the run finishes.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::checkpoint::{BestCheckpoint, CheckpointInfo};
use super::early_stopping::EarlyStopping;
use super::scheduler::{PlateauConfig, ReduceOnPlateau};
use super::{PROBABILITY_EPSILON, VALIDATION_THRESHOLD};
use crate::config::TrainingConfig;
use crate::dataset::{
    Augmenter, ClassWeights, DatasetSplits, ImageCodec, Label, SplitBatches, SplitSamples,
};
use crate::model::{TrainableModel, TrainableScope};
use crate::utils::error::{JaundiceError, Result};
use crate::utils::metrics::{BinaryConfusionMatrix, RunningAverage};

/// Training phase state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    HeadOnly,
    FineTune,
    Finished,
}

impl Phase {
    /// Phase that follows this one
    pub fn next(self) -> Phase {
        match self {
            Phase::HeadOnly => Phase::FineTune,
            Phase::FineTune | Phase::Finished => Phase::Finished,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::HeadOnly => "head_only",
            Phase::FineTune => "fine_tune",
            Phase::Finished => "finished",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Why a phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    BudgetExhausted,
    /// Parameters were rolled back to `best_epoch` (1-based)
    EarlyStopped { best_epoch: usize },
}

/// Metrics of one completed epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub phase: Phase,
    /// 1-based epoch within the phase
    pub epoch: usize,
    /// 1-based epoch across the run
    pub global_epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    /// LR used during this epoch
    pub learning_rate: f64,
}

/// Outcome of a single phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: Phase,
    pub epochs_run: usize,
    pub stop_reason: StopReason,
    pub final_learning_rate: f64,
}

/// Everything the orchestrator observed during a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs: Vec<EpochRecord>,
    pub phases: Vec<PhaseSummary>,
    pub best_checkpoint: Option<CheckpointInfo>,
    pub duration_secs: f64,
}

impl TrainingReport {
    pub fn best_val_accuracy(&self) -> Option<f64> {
        self.best_checkpoint.as_ref().map(|c| c.val_accuracy)
    }

    pub fn epochs_in(&self, phase: Phase) -> impl Iterator<Item = &EpochRecord> {
        self.epochs.iter().filter(move |e| e.phase == phase)
    }
}

/// Validation loss and accuracy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

/// Two-phase training state machine
pub struct TrainingOrchestrator {
    config: TrainingConfig,
    checkpoint_path: PathBuf,
    show_progress: bool,
    pretrained_backbone: bool,
}

impl TrainingOrchestrator {
    pub fn new(config: TrainingConfig, checkpoint_path: PathBuf) -> Self {
        Self {
            config,
            checkpoint_path,
            show_progress: true,
            pretrained_backbone: true,
        }
    }

    /// Whether the backbone starts from pretrained weights
    ///
    /// When false the first phase unfreezes the whole backbone.
    pub fn with_pretrained_backbone(mut self, pretrained: bool) -> Self {
        self.pretrained_backbone = pretrained;
        self
    }

    /// Enable or disable terminal progress bars
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn codec(&self) -> ImageCodec {
        ImageCodec::square(self.config.image_size as u32)
    }

    fn plateau_config(&self) -> PlateauConfig {
        PlateauConfig {
            factor: self.config.plateau_factor,
            patience: self.config.plateau_patience,
            min_lr: self.config.min_lr,
            min_delta: self.config.min_delta,
        }
    }

    fn phase_settings(&self, phase: Phase) -> (usize, f64, TrainableScope) {
        match phase {
            Phase::HeadOnly if self.pretrained_backbone => {
                (self.config.epochs_phase1, self.config.base_lr, TrainableScope::HeadOnly)
            }
            Phase::HeadOnly => (
                self.config.epochs_phase1,
                self.config.base_lr,
                TrainableScope::FineTune { frozen_prefix: 0 },
            ),
            Phase::FineTune | Phase::Finished => (
                self.config.epochs_phase2,
                self.config.fine_tune_lr,
                TrainableScope::FineTune {
                    frozen_prefix: self.config.frozen_prefix,
                },
            ),
        }
    }

    /// Run both phases; on return `model` holds the best-accuracy parameters
    pub fn run<M: TrainableModel>(&self, model: &mut M, splits: &DatasetSplits) -> Result<TrainingReport> {
        splits.train.ensure_not_empty()?;
        splits.validate.ensure_not_empty()?;
        let weights = ClassWeights::from_split(&splits.train)?;

        info!("Class weights: {}", weights);
        info!(
            "Training on {} samples, validating on {} samples",
            splits.train.len(),
            splits.validate.len()
        );

        let start = Instant::now();
        let mut report = TrainingReport::default();
        let mut checkpoint = BestCheckpoint::new(self.checkpoint_path.clone());

        let mut phase = Phase::HeadOnly;
        while phase != Phase::Finished {
            let summary = self.run_phase(phase, model, splits, &weights, &mut checkpoint, &mut report)?;
            info!(
                "Phase {} finished after {} epochs ({:?})",
                phase, summary.epochs_run, summary.stop_reason
            );
            report.phases.push(summary);
            phase = phase.next();
        }

        if let Some(best) = checkpoint.take_snapshot() {
            model.restore(best);
            if let Some(info) = checkpoint.info() {
                info!(
                    "Restored best checkpoint ({} epoch {}, val_accuracy {:.4})",
                    info.phase, info.epoch, info.val_accuracy
                );
            }
        } else {
            warn!("No epoch completed; keeping the current parameters");
        }

        report.best_checkpoint = checkpoint.info().cloned();
        report.duration_secs = start.elapsed().as_secs_f64();
        Ok(report)
    }

    fn run_phase<M: TrainableModel>(
        &self,
        phase: Phase,
        model: &mut M,
        splits: &DatasetSplits,
        weights: &ClassWeights,
        checkpoint: &mut BestCheckpoint<M::Snapshot>,
        report: &mut TrainingReport,
    ) -> Result<PhaseSummary> {
        let (epochs, initial_lr, scope) = self.phase_settings(phase);

        info!("Starting phase {} ({}, lr {:e}, up to {} epochs)", phase, scope, initial_lr, epochs);
        model.set_trainable(scope);
        model.reset_optimizer();

        let mut scheduler = ReduceOnPlateau::new(initial_lr, self.plateau_config());
        let mut stopper: EarlyStopping<M::Snapshot> = EarlyStopping::new(self.config.early_stopping_patience);
        let mut stop_reason = StopReason::BudgetExhausted;
        let mut epochs_run = 0;

        for epoch in 1..=epochs {
            let learning_rate = scheduler.lr();
            let global_epoch = report.epochs.len() + 1;

            let train_loss = self.train_epoch(model, &splits.train, weights, learning_rate, phase, epoch, global_epoch)?;
            let evaluation = self.evaluate(&*model, &splits.validate)?;
            if !evaluation.loss.is_finite() {
                return Err(JaundiceError::NumericInstability {
                    phase: phase.to_string(),
                    epoch,
                    loss: evaluation.loss,
                });
            }

            info!(
                "[{}] epoch {}/{}: train_loss={:.4} val_loss={:.4} val_acc={:.4} lr={:e}",
                phase, epoch, epochs, train_loss, evaluation.loss, evaluation.accuracy, learning_rate
            );

            report.epochs.push(EpochRecord {
                phase,
                epoch,
                global_epoch,
                train_loss,
                val_loss: evaluation.loss,
                val_accuracy: evaluation.accuracy,
                learning_rate,
            });
            epochs_run = epoch;

            checkpoint.observe(
                &*model,
                CheckpointInfo {
                    phase,
                    epoch,
                    global_epoch,
                    val_accuracy: evaluation.accuracy,
                    val_loss: evaluation.loss,
                    learning_rate,
                    timestamp: Utc::now().to_rfc3339(),
                },
            )?;

            let next_lr = scheduler.step(evaluation.loss);
            if next_lr < learning_rate {
                info!("Reducing learning rate to {:e}", next_lr);
            }

            if stopper.step(epoch, evaluation.loss, || model.snapshot()) {
                let best_epoch = stopper.best_epoch().unwrap_or(epoch);
                if let Some(best) = stopper.take_best() {
                    model.restore(best);
                }
                stop_reason = StopReason::EarlyStopped { best_epoch };
                break;
            }
        }

        Ok(PhaseSummary {
            phase,
            epochs_run,
            stop_reason,
            final_learning_rate: scheduler.lr(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn train_epoch<M: TrainableModel>(
        &self,
        model: &mut M,
        train: &SplitSamples,
        weights: &ClassWeights,
        learning_rate: f64,
        phase: Phase,
        epoch: usize,
        global_epoch: usize,
    ) -> Result<f64> {
        let batches = SplitBatches::shuffled(
            train,
            self.codec(),
            Augmenter::new(self.config.augmentation.clone()),
            self.config.batch_size,
            self.config.seed,
            global_epoch,
        );

        let progress = self.progress_bar(batches.num_batches() as u64, phase, epoch);
        let mut loss = RunningAverage::new();

        for batch in batches {
            let items = batch?;
            let batch_loss = model.fit_step(&items, weights, learning_rate)?;
            if !batch_loss.is_finite() {
                progress.abandon();
                return Err(JaundiceError::NumericInstability {
                    phase: phase.to_string(),
                    epoch,
                    loss: batch_loss,
                });
            }
            loss.add_weighted(batch_loss, items.len());
            progress.set_message(format!("loss {:.4}", loss.average()));
            progress.inc(1);
        }

        progress.finish_and_clear();
        debug!("Epoch {} trained on {} samples", epoch, loss.count());
        Ok(loss.average())
    }

    fn progress_bar(&self, batches: u64, phase: Phase, epoch: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(batches);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_prefix(format!("{} epoch {}", phase, epoch));
        bar
    }

    /// Unweighted BCE and accuracy (p > 0.5) over a split
    pub fn evaluate<M: TrainableModel>(&self, model: &M, split: &SplitSamples) -> Result<Evaluation> {
        let scores = predict_split(model, split, self.codec(), self.config.batch_size)?;
        let labels = split.labels();
        let confusion = BinaryConfusionMatrix::at_threshold(&scores, &labels, VALIDATION_THRESHOLD);

        Ok(Evaluation {
            loss: binary_cross_entropy(&scores, &labels),
            accuracy: confusion.accuracy(),
        })
    }
}

/// Jaundice probabilities for every sample of a split, in enumeration order
pub fn predict_split<M: TrainableModel>(
    model: &M,
    split: &SplitSamples,
    codec: ImageCodec,
    batch_size: usize,
) -> Result<Vec<f32>> {
    let mut scores = Vec::with_capacity(split.len());
    for batch in SplitBatches::ordered(split, codec, batch_size) {
        scores.extend(model.forward(&batch?)?);
    }
    Ok(scores)
}

/// Mean binary cross-entropy with probabilities clamped to [eps, 1 - eps]
pub fn binary_cross_entropy(probabilities: &[f32], labels: &[Label]) -> f64 {
    let mut loss = RunningAverage::new();
    for (&p, &label) in probabilities.iter().zip(labels) {
        let p = (p as f64).clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
        let y = label.as_target() as f64;
        loss.add(-(y * p.ln() + (1.0 - y) * (1.0 - p).ln()));
    }
    loss.average()
}
