//! Error Handling Module
//!
//! Defines the error taxonomy for training and serving.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for jaundice detection operations
#[derive(Error, Debug)]
pub enum JaundiceError {
    /// Bytes could not be decoded, or the file extension is not allowed
    #[error("Invalid image{}: {reason}", .filename.as_ref().map(|f| format!(" '{}'", f)).unwrap_or_default())]
    InvalidImage {
        filename: Option<String>,
        reason: String,
    },

    /// A split or label directory is missing from the dataset root
    #[error("Dataset layout error at '{}': {reason}", .path.display())]
    DatasetLayout { path: PathBuf, reason: String },

    /// A split (or a label bucket inside it) holds no samples
    #[error("Dataset split '{split}' is empty")]
    EmptyDataset { split: String },

    /// The model artifact is missing or failed to load
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Training produced a non-finite loss
    #[error("Numeric instability in {phase} at epoch {epoch}: loss = {loss}")]
    NumericInstability {
        phase: String,
        epoch: usize,
        loss: f64,
    },

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl JaundiceError {
    /// Shorthand for an image error without a filename
    pub fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            filename: None,
            reason: reason.into(),
        }
    }

    /// Attach a filename to an `InvalidImage` error, leaving other variants untouched
    pub fn with_filename(self, name: &str) -> Self {
        match self {
            Self::InvalidImage { reason, .. } => Self::InvalidImage {
                filename: Some(name.to_string()),
                reason,
            },
            other => other,
        }
    }

    /// True when the caller can fix the problem by resubmitting different input
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidImage { .. } | Self::InvalidInput(_))
    }
}

impl From<serde_json::Error> for JaundiceError {
    fn from(err: serde_json::Error) -> Self {
        JaundiceError::Serialization(err.to_string())
    }
}

/// Convenience Result type for jaundice detection operations
pub type Result<T> = std::result::Result<T, JaundiceError>;
