//! End-to-end training and evaluation runs
//!
//! `run_training` goes from a dataset directory to a complete artifact:
//! two-phase training, the model and its config written to the output
//! directory, then threshold calibration on the test split scored by the
//! reloaded artifact, so the stored threshold matches what is served.

use std::path::Path;

use burn::{module::AutodiffModule, tensor::backend::{AutodiffBackend, Backend}};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::calibration::{calibrate_threshold, Calibration};
use super::orchestrator::{TrainingOrchestrator, TrainingReport};
use crate::artifact::{ArtifactStore, MetricsRecord, DEFAULT_THRESHOLD};
use crate::config::TrainingConfig;
use crate::dataset::{DatasetSplits, ImageCodec, SplitBatches, SplitSamples};
use crate::inference::{BurnProbabilityModel, ProbabilityModel};
use crate::model::{BurnTrainer, JaundiceClassifier};
use crate::utils::error::Result;
use crate::utils::metrics::BinaryMetrics;

/// Training run summary written as `training_report.json`
pub const REPORT_FILE: &str = "training_report.json";

/// Copy of the effective configuration
pub const CONFIG_SNAPSHOT_FILE: &str = "training_config.toml";

/// Everything a completed run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub report: TrainingReport,
    pub calibration: Calibration,
    pub record: MetricsRecord,
}

/// Train, calibrate and persist a model
pub fn run_training<B: AutodiffBackend>(config: &TrainingConfig, device: B::Device) -> Result<TrainingOutcome> {
    config.validate()?;

    println!("{}", "Loading Dataset...".cyan());
    let splits = DatasetSplits::load(&config.data_dir)?;
    splits.stats().print();

    let store = ArtifactStore::new(&config.output_dir);
    std::fs::create_dir_all(store.dir())?;
    config.save(&store.dir().join(CONFIG_SNAPSHOT_FILE))?;

    println!("{}", "Building Model...".cyan());
    let classifier_config = config.classifier_config();
    let mut model = JaundiceClassifier::<B>::new(&classifier_config, &device);
    if let Some(path) = &config.backbone_path {
        info!("Initializing backbone from {:?}", path);
        let donor = JaundiceClassifier::<B>::load(&classifier_config, path, &device)?;
        model = model.with_backbone_from(donor);
    }
    info!(
        "Classifier: {} backbone stages {:?}, input {}x{}",
        classifier_config.depth(),
        classifier_config.stage_filters,
        classifier_config.input_size,
        classifier_config.input_size
    );

    let pretrained = config.backbone_path.is_some();
    if !pretrained {
        warn!("No backbone weights supplied; training the full network in the head-only phase");
    }

    println!("{}", "Training...".cyan());
    let mut trainer = BurnTrainer::new(model, config.weight_decay as f32, device.clone());
    let orchestrator =
        TrainingOrchestrator::new(config.clone(), store.checkpoint_path()).with_pretrained_backbone(pretrained);
    let report = orchestrator.run(&mut trainer, &splits)?;

    let report_json = serde_json::to_string_pretty(&report)?;
    std::fs::write(store.dir().join(REPORT_FILE), report_json)?;

    store.save_model(&trainer.model().valid(), &classifier_config)?;

    println!("{}", "Calibrating Threshold...".cyan());
    let (served, served_config) = store.load_model::<B::InnerBackend>(&device)?;
    let served = BurnProbabilityModel::new(served, device);
    let codec = ImageCodec::square(served_config.input_size as u32);
    let scores = score_split(&served, &splits.test, codec, config.batch_size)?;
    let calibration = calibrate_threshold(&scores, &splits.test.labels())?;
    let record = MetricsRecord::from_calibration(&calibration, &config.model_version);

    store.save_metrics(&record)?;

    Ok(TrainingOutcome {
        report,
        calibration,
        record,
    })
}

/// Test-split metrics of a stored artifact at its stored threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEvaluation {
    pub threshold: f32,
    pub metrics: BinaryMetrics,
}

/// Re-evaluate a saved model on the test split of `data_dir`
pub fn evaluate_artifact<B: Backend>(
    model_dir: &Path,
    data_dir: &Path,
    batch_size: usize,
    device: B::Device,
) -> Result<ArtifactEvaluation> {
    let store = ArtifactStore::new(model_dir);
    let (model, config) = store.load_model::<B>(&device)?;
    let threshold = store
        .load_metrics()?
        .map(|record| record.threshold)
        .unwrap_or(DEFAULT_THRESHOLD);

    let splits = DatasetSplits::load(data_dir)?;
    splits.test.ensure_not_empty()?;

    let model = BurnProbabilityModel::new(model, device);
    let codec = ImageCodec::square(config.input_size as u32);
    let scores = score_split(&model, &splits.test, codec, batch_size)?;

    let metrics = BinaryMetrics::at_threshold(&scores, &splits.test.labels(), threshold);
    info!("Evaluated {} test samples at threshold {:.4}", metrics.total_samples(), threshold);

    Ok(ArtifactEvaluation { threshold, metrics })
}

/// Probabilities of a serving model over a split, in enumeration order
///
/// Images are decoded `batch_size` at a time but scored one forward pass
/// each, as the inference service scores uploads.
pub fn score_split(
    model: &dyn ProbabilityModel,
    split: &SplitSamples,
    codec: ImageCodec,
    batch_size: usize,
) -> Result<Vec<f32>> {
    let mut scores = Vec::with_capacity(split.len());
    for batch in SplitBatches::ordered(split, codec, batch_size) {
        for item in batch? {
            scores.extend(model.predict_probabilities(std::slice::from_ref(&item.image))?);
        }
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::tests::build_dataset;
    use crate::model::ClassifierConfig;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn tiny_config(root: &Path) -> TrainingConfig {
        TrainingConfig {
            data_dir: root.join("data"),
            output_dir: root.join("models"),
            image_size: 16,
            batch_size: 4,
            epochs_phase1: 1,
            epochs_phase2: 1,
            frozen_prefix: 1,
            model: ClassifierConfig::new()
                .with_stage_filters(vec![4, 8])
                .with_head_units(8)
                .with_head_units_2(4),
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_run_training_writes_artifact() {
        let dir = TempDir::new().unwrap();
        let config = tiny_config(dir.path());
        build_dataset(&config.data_dir, [(4, 2), (2, 2), (2, 2)], 16);

        let outcome = run_training::<TestBackend>(&config, Default::default()).unwrap();

        assert_eq!(outcome.report.epochs.len(), 2);
        assert_eq!(outcome.record.total_samples, 4);
        assert_eq!(outcome.record.threshold, outcome.calibration.threshold);

        let store = ArtifactStore::new(&config.output_dir);
        assert!(store.has_model());
        assert!(store.checkpoint_path().exists());
        assert!(store.dir().join(REPORT_FILE).exists());
        assert!(store.dir().join(CONFIG_SNAPSHOT_FILE).exists());
        assert_eq!(store.load_metrics().unwrap(), Some(outcome.record.clone()));

        let evaluation =
            evaluate_artifact::<NdArray<f32>>(&config.output_dir, &config.data_dir, 4, Default::default()).unwrap();
        assert_eq!(evaluation.threshold, outcome.record.threshold);
        assert_eq!(evaluation.metrics.total_samples(), 4);
    }

    #[test]
    fn test_stored_record_matches_artifact_evaluation() {
        let dir = TempDir::new().unwrap();
        let mut config = tiny_config(dir.path());
        config.epochs_phase1 = 2;
        config.epochs_phase2 = 2;
        build_dataset(&config.data_dir, [(6, 6), (3, 3), (4, 4)], 16);

        let outcome = run_training::<TestBackend>(&config, Default::default()).unwrap();
        let evaluation =
            evaluate_artifact::<NdArray<f32>>(&config.output_dir, &config.data_dir, 3, Default::default()).unwrap();

        assert_eq!(evaluation.metrics.confusion, outcome.record.confusion());
        assert_eq!(evaluation.metrics.accuracy, outcome.record.accuracy);
        assert_eq!(evaluation.metrics.f1_score, outcome.record.f1_score);
    }

    #[test]
    fn test_run_training_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let mut config = tiny_config(dir.path());
        config.batch_size = 0;
        assert!(run_training::<TestBackend>(&config, Default::default()).is_err());
        assert!(!config.output_dir.exists());
    }
}
