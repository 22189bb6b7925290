//! Backbone + Head Classifier
//!
//! A convolutional feature extractor built from identical stages
//! (Conv2d, BatchNorm, ReLU, MaxPool) followed by a small dense head that
//! emits a single jaundice logit. The head is its own module so that the
//! training runtime can address it separately from the backbone stages.

use std::path::Path;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};

use super::config::ClassifierConfig;
use super::ModelRecorder;
use crate::utils::error::{JaundiceError, Result};

/// One backbone stage: Conv2d, BatchNorm, ReLU, 2x2 MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Dense head: fc -> ReLU -> dropout -> fc -> ReLU -> dropout -> fc(1)
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub fc1: Linear<B>,
    pub dropout1: Dropout,
    pub fc2: Linear<B>,
    pub dropout2: Dropout,
    pub out: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn new(config: &ClassifierConfig, in_features: usize, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(in_features, config.head_units).init(device),
            dropout1: DropoutConfig::new(config.dropout_1).init(),
            fc2: LinearConfig::new(config.head_units, config.head_units_2).init(device),
            dropout2: DropoutConfig::new(config.dropout_2).init(),
            out: LinearConfig::new(config.head_units_2, 1).init(device),
        }
    }

    /// Features [batch, in_features] -> logits [batch, 1]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout1.forward(x);
        let x = self.fc2.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout2.forward(x);
        self.out.forward(x)
    }
}

/// Binary jaundice classifier
#[derive(Module, Debug)]
pub struct JaundiceClassifier<B: Backend> {
    /// Backbone stages in input-to-output order
    pub backbone: Vec<ConvBlock<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub head: ClassifierHead<B>,
}

impl<B: Backend> JaundiceClassifier<B> {
    pub fn new(config: &ClassifierConfig, device: &B::Device) -> Self {
        let mut backbone = Vec::with_capacity(config.depth());
        let mut in_channels = config.in_channels;
        for &filters in &config.stage_filters {
            backbone.push(ConvBlock::new(in_channels, filters, device));
            in_channels = filters;
        }

        Self {
            backbone,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head: ClassifierHead::new(config, in_channels, device),
        }
    }

    /// Rebuild from a config and load a [`ModelRecorder`] file
    pub fn load(config: &ClassifierConfig, path: &Path, device: &B::Device) -> Result<Self> {
        Self::new(config, device)
            .load_file(path.to_path_buf(), &ModelRecorder::new(), device)
            .map_err(|e| JaundiceError::Model(format!("Failed to load model from {:?}: {:?}", path, e)))
    }

    /// Replace the backbone with the stages of another classifier
    pub fn with_backbone_from(mut self, donor: JaundiceClassifier<B>) -> Self {
        self.backbone = donor.backbone;
        self
    }

    pub fn depth(&self) -> usize {
        self.backbone.len()
    }

    /// Pooled backbone features [batch, channels]
    pub fn features(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.pool(self.stages_from(x, 0))
    }

    /// Run backbone stages `start..` on the output of stage `start - 1`
    pub fn stages_from(&self, x: Tensor<B, 4>, start: usize) -> Tensor<B, 4> {
        self.backbone
            .iter()
            .skip(start)
            .fold(x, |x, stage| stage.forward(x))
    }

    /// [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
    fn pool(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }

    /// Logits from the activations after backbone stage `start - 1`
    pub fn forward_from_stage(&self, x: Tensor<B, 4>, start: usize) -> Tensor<B, 2> {
        let x = self.stages_from(x, start);
        self.head.forward(self.pool(x))
    }

    /// Logits with shape [batch, 1]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward_from_stage(x, 0)
    }

    /// Jaundice probabilities with shape [batch]
    pub fn forward_probability(&self, x: Tensor<B, 4>) -> Tensor<B, 1> {
        let logits = self.forward(x);
        let [batch_size, _] = logits.dims();
        sigmoid(logits).reshape([batch_size])
    }
}
