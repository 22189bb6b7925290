//! Artifact module: the contract between training and serving
//!
//! A training run leaves the weights, the architecture and a metrics record
//! (including the calibrated threshold) in one directory. Serving only reads it.

pub mod metrics_record;
pub mod store;

pub use metrics_record::{MetricsRecord, DEFAULT_THRESHOLD};
pub use store::ArtifactStore;
