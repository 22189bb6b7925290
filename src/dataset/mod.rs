//! Dataset module for jaundice image data handling
//!
//! This module provides functionality for:
//! - Decoding and normalizing images (shared by training and serving)
//! - Enumerating the fixed train/validate/test splits from disk
//! - On-the-fly augmentation of training samples
//! - Assembling batches for the Burn model runtime
//! - Class weights for the imbalanced training split
//!
//! ## Layout
//!
//! ```text
//! <root>/train/{train N, train J}
//! <root>/validate/{validate N, validate J}
//! <root>/test/{test N, test J}
//! ```
//!
//! `normal` / `jaundice` (or bare `N` / `J`) are accepted as label directory names too.

pub mod augmentation;
pub mod batcher;
pub mod class_weights;
pub mod codec;
pub mod loader;

use serde::{Deserialize, Serialize};

// Re-export main types for convenience
pub use augmentation::{AugmentationConfig, Augmenter};
pub use batcher::{JaundiceBatch, JaundiceBatcher, JaundiceItem, SplitBatches};
pub use class_weights::ClassWeights;
pub use codec::{ImageCodec, ImageTensor, ALLOWED_EXTENSIONS};
pub use loader::{DatasetSplits, DatasetStats, Sample, SplitSamples};

/// Number of classes (binary task)
pub const NUM_CLASSES: usize = 2;

/// Class names indexed by label
pub const CLASS_NAMES: [&str; NUM_CLASSES] = ["normal", "jaundice"];

/// Binary label; jaundice is the positive class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Normal,
    Jaundice,
}

impl Label {
    /// Both labels in index order
    pub const ALL: [Label; NUM_CLASSES] = [Label::Normal, Label::Jaundice];

    pub fn index(self) -> usize {
        match self {
            Label::Normal => 0,
            Label::Jaundice => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        CLASS_NAMES[self.index()]
    }

    /// Target value for the binary loss
    pub fn as_target(self) -> f32 {
        self.index() as f32
    }

    /// Short directory suffix of the legacy dataset layout ("N" / "J")
    pub fn short_code(self) -> &'static str {
        match self {
            Label::Normal => "N",
            Label::Jaundice => "J",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One of the three fixed dataset splits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Validate,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Validate, Split::Test];

    /// Directory name under the dataset root
    pub fn dir_name(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validate => "validate",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_index_roundtrip() {
        for label in Label::ALL {
            assert_eq!(Label::from_index(label.index()), Some(label));
        }
        assert_eq!(Label::from_index(2), None);
    }

    #[test]
    fn test_label_names() {
        assert_eq!(Label::Normal.name(), "normal");
        assert_eq!(Label::Jaundice.to_string(), "jaundice");
        assert_eq!(Label::Jaundice.as_target(), 1.0);
    }

    #[test]
    fn test_label_serializes_lowercase() {
        let json = serde_json::to_string(&Label::Jaundice).unwrap();
        assert_eq!(json, "\"jaundice\"");
    }

    #[test]
    fn test_split_dir_names() {
        let names: Vec<&str> = Split::ALL.iter().map(|s| s.dir_name()).collect();
        assert_eq!(names, vec!["train", "validate", "test"]);
    }
}
