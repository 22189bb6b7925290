//! Early stopping on the validation loss
//!
//! Keeps a snapshot of the best epoch so the caller can roll back to it when
//! the patience runs out.

use tracing::info;

/// Patience-based early stopping with best-state retention
#[derive(Debug, Clone)]
pub struct EarlyStopping<S> {
    patience: usize,
    best_metric: f64,
    best_epoch: Option<usize>,
    epochs_without_improvement: usize,
    best_state: Option<S>,
}

impl<S> EarlyStopping<S> {
    /// Stop after `patience` consecutive epochs without a strictly lower loss
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_metric: f64::INFINITY,
            best_epoch: None,
            epochs_without_improvement: 0,
            best_state: None,
        }
    }

    /// Record an epoch; `snapshot` is only invoked when the metric improves.
    ///
    /// Returns true when training should stop.
    pub fn step(&mut self, epoch: usize, metric: f64, snapshot: impl FnOnce() -> S) -> bool {
        if metric < self.best_metric {
            self.best_metric = metric;
            self.best_epoch = Some(epoch);
            self.epochs_without_improvement = 0;
            self.best_state = Some(snapshot());
            return false;
        }

        self.epochs_without_improvement += 1;
        if self.epochs_without_improvement >= self.patience {
            info!(
                "Early stopping after {} epochs without improvement (best epoch {:?}, metric {:.5})",
                self.epochs_without_improvement, self.best_epoch, self.best_metric
            );
            return true;
        }
        false
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn best_metric(&self) -> f64 {
        self.best_metric
    }

    pub fn epochs_without_improvement(&self) -> usize {
        self.epochs_without_improvement
    }

    /// Take the state recorded at the best epoch
    pub fn take_best(&mut self) -> Option<S> {
        self.best_state.take()
    }
}
