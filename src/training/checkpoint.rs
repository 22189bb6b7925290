//! Best-model checkpointing across the whole training run.
//!
//! This module provides:
//! - Saving the model whenever validation accuracy strictly improves
//! - A JSON sidecar describing the saved epoch
//! - An in-memory snapshot for reinstating the best parameters at the end

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::orchestrator::Phase;
use crate::model::TrainableModel;
use crate::utils::error::Result;

/// Metadata written next to the best checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub phase: Phase,
    /// 1-based epoch within the phase
    pub epoch: usize,
    /// 1-based epoch across the run
    pub global_epoch: usize,
    pub val_accuracy: f64,
    pub val_loss: f64,
    pub learning_rate: f64,
    pub timestamp: String,
}

impl CheckpointInfo {
    /// Sidecar path for a checkpoint file (`best_checkpoint.mpk` -> `best_checkpoint.json`)
    pub fn sidecar_path(checkpoint_path: &Path) -> PathBuf {
        checkpoint_path.with_extension("json")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Retains the parameters of the best validation-accuracy epoch
pub struct BestCheckpoint<S> {
    path: PathBuf,
    best_accuracy: f64,
    info: Option<CheckpointInfo>,
    snapshot: Option<S>,
}

impl<S> BestCheckpoint<S> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            best_accuracy: f64::NEG_INFINITY,
            info: None,
            snapshot: None,
        }
    }

    pub fn info(&self) -> Option<&CheckpointInfo> {
        self.info.as_ref()
    }

    /// Save the model if `info.val_accuracy` strictly beats every earlier epoch
    ///
    /// Returns true when a new checkpoint was written.
    pub fn observe<M>(&mut self, model: &M, info: CheckpointInfo) -> Result<bool>
    where
        M: TrainableModel<Snapshot = S>,
    {
        if info.val_accuracy <= self.best_accuracy {
            return Ok(false);
        }

        model.save(&self.path)?;
        info.save(&CheckpointInfo::sidecar_path(&self.path))?;
        info!(
            "Best checkpoint saved ({} epoch {}, val_accuracy {:.4})",
            info.phase, info.epoch, info.val_accuracy
        );

        self.best_accuracy = info.val_accuracy;
        self.snapshot = Some(model.snapshot());
        self.info = Some(info);
        Ok(true)
    }

    /// Take the parameters of the best epoch, if any epoch was observed
    pub fn take_snapshot(&mut self) -> Option<S> {
        self.snapshot.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn info(epoch: usize, val_accuracy: f64) -> CheckpointInfo {
        CheckpointInfo {
            phase: Phase::HeadOnly,
            epoch,
            global_epoch: epoch,
            val_accuracy,
            val_loss: 0.5,
            learning_rate: 1e-4,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_sidecar_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = CheckpointInfo::sidecar_path(&dir.path().join("checkpoints").join("best_checkpoint.mpk"));
        assert!(path.ends_with("best_checkpoint.json"));

        let original = info(3, 0.75);
        original.save(&path).unwrap();
        assert_eq!(CheckpointInfo::load(&path).unwrap(), original);
    }

    #[test]
    fn test_new_checkpoint_has_no_snapshot() {
        let mut checkpoint: BestCheckpoint<u32> = BestCheckpoint::new(PathBuf::from("unused.mpk"));
        assert!(checkpoint.info().is_none());
        assert!(checkpoint.take_snapshot().is_none());
    }
}
