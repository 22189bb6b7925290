//! # Jaundice Detection
//!
//! Binary jaundice vs. normal image classification built on the Burn framework.
//!
//! ## Features
//!
//! - **Two-phase transfer learning**: head-only training on a frozen backbone,
//!   then fine-tuning with the deepest stages unfrozen
//! - **Class-imbalance correction** with inverse-frequency loss weights
//! - **Threshold calibration**: the decision threshold maximizes F1 over the
//!   ROC sweep of the test split
//! - **Serving**: one preprocessing contract for training and inference, a lazily
//!   loaded model and per-item isolation in batch requests
//!
//! ## Modules
//!
//! - `dataset`: Split discovery, image decoding, augmentation and batching
//! - `model`: CNN architecture and the trainable runtime
//! - `training`: Phase scheduling, early stopping, checkpointing and calibration
//! - `artifact`: The on-disk model, config and metrics record
//! - `inference`: Single and batch prediction over a stored artifact
//! - `server`: axum HTTP API over the inference service
//! - `utils`: Logging, metrics, and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jaundice_detect::backend::{default_device, InferenceBackend};
//! use jaundice_detect::{ArtifactLoader, ArtifactStore, ImageCodec, InferenceService};
//!
//! let store = ArtifactStore::new("models");
//! let loader = ArtifactLoader::<InferenceBackend>::new(store, default_device());
//! let service = InferenceService::new(loader, ImageCodec::square(224));
//! let result = service.predict(&std::fs::read("face.jpg")?, Some("face.jpg"))?;
//! println!("{} ({:.1}%)", result.prediction, result.confidence * 100.0);
//! ```

pub mod artifact;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod server;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use artifact::{ArtifactStore, MetricsRecord};
pub use config::{ServeConfig, TrainingConfig};
pub use dataset::{DatasetSplits, ImageCodec, ImageTensor, Label, Split};
pub use inference::{
    ArtifactLoader, BatchPrediction, ImageUpload, InferenceService, ModelLoader, PredictionResult,
};
pub use model::{ClassifierConfig, JaundiceClassifier};
pub use training::{calibrate_threshold, run_training, Calibration, TrainingOrchestrator, TrainingReport};
pub use utils::error::{JaundiceError, Result};
pub use utils::metrics::{BinaryConfusionMatrix, BinaryMetrics};

/// Default square input size of the classifier
pub const IMAGE_SIZE: usize = 224;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
