//! Inference module for single and batch prediction
//!
//! This module provides:
//! - A lazily loaded, shared-read-only serving artifact
//! - The training-time image preprocessing applied to uploads
//! - Calibrated-threshold verdicts with confidence
//! - Batch prediction with per-item failure isolation

pub mod burn_model;
pub mod prediction;
pub mod service;

// Re-export main types for convenience
pub use burn_model::{ArtifactLoader, BurnProbabilityModel};
pub use prediction::{BatchItemResult, BatchPrediction, ItemOutcome, PredictionResult};
pub use service::{ImageUpload, InferenceService, LoadedArtifact, ModelLoader, ProbabilityModel};

/// Name reported by the model info endpoint
pub const MODEL_NAME: &str = "jaundice_detection_model";
