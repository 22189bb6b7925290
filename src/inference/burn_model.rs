//! Burn-backed serving model and artifact loader

use std::sync::Mutex;

use burn::tensor::backend::Backend;
use tracing::warn;

use super::service::{LoadedArtifact, ModelLoader, ProbabilityModel};
use crate::artifact::{ArtifactStore, DEFAULT_THRESHOLD};
use crate::dataset::{ImageTensor, JaundiceBatcher};
use crate::model::JaundiceClassifier;
use crate::utils::error::{JaundiceError, Result};

/// Classifier behind a mutex so forward passes are serialized
pub struct BurnProbabilityModel<B: Backend> {
    model: Mutex<JaundiceClassifier<B>>,
    batcher: JaundiceBatcher<B>,
    device: B::Device,
}

impl<B: Backend> BurnProbabilityModel<B> {
    pub fn new(model: JaundiceClassifier<B>, device: B::Device) -> Self {
        Self {
            model: Mutex::new(model),
            batcher: JaundiceBatcher::new(),
            device,
        }
    }
}

impl<B: Backend> ProbabilityModel for BurnProbabilityModel<B> {
    fn predict_probabilities(&self, images: &[ImageTensor]) -> Result<Vec<f32>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let refs: Vec<&ImageTensor> = images.iter().collect();
        let input = self.batcher.images(&refs, &self.device);

        let model = self
            .model
            .lock()
            .map_err(|_| JaundiceError::Model("model lock poisoned".to_string()))?;

        model
            .forward_probability(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| JaundiceError::Model(format!("Failed to read probabilities: {:?}", e)))
    }
}

/// Loads the model and threshold from an artifact directory
pub struct ArtifactLoader<B: Backend> {
    store: ArtifactStore,
    device: B::Device,
}

impl<B: Backend> ArtifactLoader<B> {
    pub fn new(store: ArtifactStore, device: B::Device) -> Self {
        Self { store, device }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }
}

impl<B: Backend> ModelLoader for ArtifactLoader<B> {
    fn load(&self) -> Result<LoadedArtifact> {
        let (model, config) = self.store.load_model::<B>(&self.device)?;

        // A record that exists but cannot be read would silently change the
        // decision threshold
        let metrics = self
            .store
            .load_metrics()
            .map_err(|e| JaundiceError::ModelUnavailable(format!("unreadable metrics record: {}", e)))?;
        let threshold = match &metrics {
            Some(record) => record.threshold,
            None => {
                warn!("No metrics record found, using threshold {}", DEFAULT_THRESHOLD);
                DEFAULT_THRESHOLD
            }
        };

        Ok(LoadedArtifact {
            model: Box::new(BurnProbabilityModel::new(model, self.device.clone())),
            threshold,
            input_size: config.input_size,
            metrics,
        })
    }

    fn declared_input_size(&self) -> Result<Option<usize>> {
        if !self.store.has_model() {
            return Ok(None);
        }
        let config = self
            .store
            .load_config()
            .map_err(|e| JaundiceError::ModelUnavailable(format!("invalid model config: {}", e)))?;
        Ok(Some(config.input_size))
    }
}
