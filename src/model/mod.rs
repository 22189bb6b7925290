//! Model module for the jaundice classifier
//!
//! This module contains:
//! - `classifier`: the Burn backbone+head network
//! - `config`: architecture configuration saved with each artifact
//! - `runtime`: the trainable-model seam used by the training loop

use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};

pub mod classifier;
pub mod config;
pub mod runtime;

pub use classifier::{ClassifierHead, ConvBlock, JaundiceClassifier};
pub use config::ClassifierConfig;
pub use runtime::{BurnTrainer, TrainableModel, TrainableScope};

/// Recorder for every weight file (artifact, checkpoint, backbone)
///
/// Full precision, so a reloaded model scores exactly like the one it was
/// saved from.
pub type ModelRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;
