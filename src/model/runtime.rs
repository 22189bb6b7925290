//! Trainable Model Runtime
//!
//! The training loop only talks to models through [`TrainableModel`]:
//! probability forward passes, weighted fit steps, trainable-scope toggles,
//! parameter snapshots and persistence. [`BurnTrainer`] implements it on top
//! of a Burn autodiff backend with an Adam optimizer.

use std::path::Path;

use burn::{
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
    optim::{adaptor::OptimizerAdaptor, decay::WeightDecayConfig, Adam, AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion, Tensor, TensorData},
};
use tracing::{debug, warn};

use super::classifier::JaundiceClassifier;
use super::ModelRecorder;
use crate::dataset::{ClassWeights, ImageTensor, JaundiceBatcher, JaundiceItem};
use crate::utils::error::{JaundiceError, Result};

/// Which parameter groups receive updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainableScope {
    /// Backbone frozen, head trainable
    HeadOnly,
    /// Head plus backbone stages `frozen_prefix..` trainable
    FineTune { frozen_prefix: usize },
}

impl std::fmt::Display for TrainableScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HeadOnly => write!(f, "head only"),
            Self::FineTune { frozen_prefix } => write!(f, "fine-tune (first {} stages frozen)", frozen_prefix),
        }
    }
}

/// Operations the training orchestrator needs from a model
pub trait TrainableModel {
    /// Restorable copy of the parameters
    type Snapshot: Clone;

    /// Jaundice probabilities in inference mode, aligned with `items`
    fn forward(&self, items: &[JaundiceItem]) -> Result<Vec<f32>>;

    /// One optimizer step on a batch; returns the class-weighted loss
    fn fit_step(&mut self, items: &[JaundiceItem], weights: &ClassWeights, learning_rate: f64) -> Result<f64>;

    fn set_trainable(&mut self, scope: TrainableScope);

    /// Drop optimizer state (moments) before a new phase
    fn reset_optimizer(&mut self);

    fn snapshot(&self) -> Self::Snapshot;

    fn restore(&mut self, snapshot: Self::Snapshot);

    fn save(&self, path: &Path) -> Result<()>;
}

/// Burn implementation of [`TrainableModel`]
pub struct BurnTrainer<B: AutodiffBackend> {
    model: JaundiceClassifier<B>,
    optimizer: OptimizerAdaptor<Adam, JaundiceClassifier<B>, B>,
    scope: TrainableScope,
    weight_decay: f32,
    batcher: JaundiceBatcher<B>,
    device: B::Device,
}

impl<B: AutodiffBackend> BurnTrainer<B> {
    pub fn new(model: JaundiceClassifier<B>, weight_decay: f32, device: B::Device) -> Self {
        Self {
            model,
            optimizer: Self::build_optimizer(weight_decay),
            scope: TrainableScope::HeadOnly,
            weight_decay,
            batcher: JaundiceBatcher::new(),
            device,
        }
    }

    fn build_optimizer(weight_decay: f32) -> OptimizerAdaptor<Adam, JaundiceClassifier<B>, B> {
        AdamConfig::new()
            .with_weight_decay(Some(WeightDecayConfig::new(weight_decay)))
            .init()
    }

    pub fn model(&self) -> &JaundiceClassifier<B> {
        &self.model
    }

    pub fn scope(&self) -> TrainableScope {
        self.scope
    }

    pub fn into_model(self) -> JaundiceClassifier<B> {
        self.model
    }

    /// Leading backbone stages that receive no updates in the current scope
    fn frozen_stages(&self) -> usize {
        match self.scope {
            TrainableScope::HeadOnly => self.model.depth(),
            TrainableScope::FineTune { frozen_prefix } => frozen_prefix,
        }
    }

    /// Training-mode logits with the frozen stages run in inference mode
    ///
    /// Frozen stages go through the inner backend, so their BatchNorm layers
    /// normalize with running statistics and never update them.
    fn train_logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let frozen = self.frozen_stages();
        let features = self.model.backbone[..frozen]
            .iter()
            .fold(images.inner(), |x, stage| stage.valid().forward(x));
        self.model.forward_from_stage(Tensor::from_inner(features), frozen)
    }

    fn step_group(&mut self, learning_rate: f64, grads: GradientsParams) {
        self.model = self.optimizer.step(learning_rate, self.model.clone(), grads);
    }
}

/// Copy of a model that shares no running state (BatchNorm statistics) with it
fn detached<B: AutodiffBackend>(model: &JaundiceClassifier<B>) -> JaundiceClassifier<B> {
    let record = model.clone().into_record();
    model.clone().load_record(record)
}

/// Mean of `weights * BCE(sigmoid(logits), targets)`, computed from logits
///
/// Uses `max(z, 0) - z * y + ln(1 + exp(-|z|))` to stay finite for large |z|.
pub fn weighted_bce_with_logits<B: burn::tensor::backend::Backend>(
    logits: Tensor<B, 1>,
    targets: Tensor<B, 1>,
    weights: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let positive_part = logits.clone().clamp_min(0.0);
    let log_term = logits.clone().abs().neg().exp().log1p();
    let per_sample = positive_part - logits * targets + log_term;
    (per_sample * weights).mean()
}

impl<B: AutodiffBackend> TrainableModel for BurnTrainer<B> {
    type Snapshot = JaundiceClassifier<B>;

    fn forward(&self, items: &[JaundiceItem]) -> Result<Vec<f32>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.valid();
        let batcher = JaundiceBatcher::<B::InnerBackend>::new();
        let images: Vec<&ImageTensor> = items.iter().map(|item| &item.image).collect();
        let input = batcher.images(&images, &self.device);

        model
            .forward_probability(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| JaundiceError::Model(format!("Failed to read probabilities: {:?}", e)))
    }

    fn fit_step(&mut self, items: &[JaundiceItem], weights: &ClassWeights, learning_rate: f64) -> Result<f64> {
        if items.is_empty() {
            return Err(JaundiceError::InvalidInput("fit_step called with an empty batch".to_string()));
        }

        let batch_size = items.len();
        let labels: Vec<_> = items.iter().map(|item| item.label).collect();
        let batch = self.batcher.batch(items.to_vec(), &self.device);

        let logits = self.train_logits(batch.images).reshape([batch_size]);
        let sample_weights = Tensor::<B, 1>::from_floats(
            TensorData::new(weights.sample_weights(&labels), [batch_size]),
            &self.device,
        );

        let loss = weighted_bce_with_logits(logits, batch.targets, sample_weights);
        let loss_value: f64 = loss.clone().into_scalar().elem();
        if !loss_value.is_finite() {
            warn!("Non-finite training loss {}, skipping update", loss_value);
            return Ok(loss_value);
        }

        let mut grads = loss.backward();

        // Each trainable group is stepped on its own; frozen groups never
        // see gradients and keep their parameters and optimizer state.
        let head_grads = GradientsParams::from_module(&mut grads, &self.model.head);
        self.step_group(learning_rate, head_grads);

        if let TrainableScope::FineTune { frozen_prefix } = self.scope {
            let stages: Vec<GradientsParams> = self
                .model
                .backbone
                .iter()
                .skip(frozen_prefix)
                .map(|stage| GradientsParams::from_module(&mut grads, stage))
                .collect();
            for stage_grads in stages {
                self.step_group(learning_rate, stage_grads);
            }
        }

        debug!("fit_step: batch={} loss={:.5} lr={:e}", batch_size, loss_value, learning_rate);
        Ok(loss_value)
    }

    fn set_trainable(&mut self, scope: TrainableScope) {
        let depth = self.model.depth();
        self.scope = match scope {
            TrainableScope::FineTune { frozen_prefix } if frozen_prefix > depth => {
                warn!(
                    "frozen_prefix {} exceeds backbone depth {}, freezing the whole backbone",
                    frozen_prefix, depth
                );
                TrainableScope::FineTune { frozen_prefix: depth }
            }
            other => other,
        };
    }

    fn reset_optimizer(&mut self) {
        self.optimizer = Self::build_optimizer(self.weight_decay);
    }

    fn snapshot(&self) -> Self::Snapshot {
        detached(&self.model)
    }

    fn restore(&mut self, snapshot: Self::Snapshot) {
        self.model = detached(&snapshot);
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.model
            .clone()
            .save_file(path.to_path_buf(), &ModelRecorder::new())
            .map_err(|e| JaundiceError::Model(format!("Failed to save model to {:?}: {:?}", path, e)))
    }
}
