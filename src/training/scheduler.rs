//! Learning Rate Scheduler Module
//!
//! Reduce-on-plateau scheduling driven by the validation loss.

use serde::{Deserialize, Serialize};

/// Settings for [`ReduceOnPlateau`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateauConfig {
    pub factor: f64,
    pub patience: usize,
    pub min_lr: f64,
    pub min_delta: f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            factor: 0.3,
            patience: 4,
            min_lr: 1e-7,
            min_delta: 1e-4,
        }
    }
}

/// Multiply the LR by `factor` after `patience` epochs without improvement
#[derive(Debug, Clone)]
pub struct ReduceOnPlateau {
    config: PlateauConfig,
    best_metric: f64,
    epochs_without_improvement: usize,
    current_lr: f64,
    reductions: usize,
}

impl ReduceOnPlateau {
    pub fn new(initial_lr: f64, config: PlateauConfig) -> Self {
        Self {
            config,
            best_metric: f64::INFINITY,
            epochs_without_improvement: 0,
            current_lr: initial_lr,
            reductions: 0,
        }
    }

    /// Record an epoch's loss and return the LR for the next epoch
    ///
    /// Only a drop of more than `min_delta` below the best loss counts as
    /// an improvement.
    pub fn step(&mut self, metric: f64) -> f64 {
        if metric < self.best_metric - self.config.min_delta {
            self.best_metric = metric;
            self.epochs_without_improvement = 0;
            return self.current_lr;
        }

        self.epochs_without_improvement += 1;
        if self.epochs_without_improvement >= self.config.patience {
            let new_lr = (self.current_lr * self.config.factor).max(self.config.min_lr);
            if new_lr < self.current_lr {
                self.current_lr = new_lr;
                self.reductions += 1;
            }
            self.epochs_without_improvement = 0;
        }

        self.current_lr
    }

    pub fn lr(&self) -> f64 {
        self.current_lr
    }

    /// Number of reductions applied so far
    pub fn reductions(&self) -> usize {
        self.reductions
    }

    pub fn best_metric(&self) -> f64 {
        self.best_metric
    }
}
