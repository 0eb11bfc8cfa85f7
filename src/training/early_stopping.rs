//! Patience-based early stopping on validation accuracy

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStopping {
    /// 0 disables stopping
    patience: usize,
    best: Option<f64>,
    best_epoch: usize,
    epochs_without_improvement: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: None,
            best_epoch: 0,
            epochs_without_improvement: 0,
        }
    }

    /// Record an epoch's score, returning true when it is a new best
    pub fn update(&mut self, epoch: usize, score: f64) -> bool {
        let improved = self.best.map_or(true, |best| score > best);
        if improved {
            self.best = Some(score);
            self.best_epoch = epoch;
            self.epochs_without_improvement = 0;
        } else {
            self.epochs_without_improvement += 1;
            debug!(
                "No improvement for {} epoch(s), patience {}",
                self.epochs_without_improvement, self.patience
            );
        }
        improved
    }

    pub fn should_stop(&self) -> bool {
        let stop = self.patience > 0 && self.epochs_without_improvement >= self.patience;
        if stop {
            info!(
                "Stopping early: no improvement in {} epochs, best was epoch {}",
                self.patience, self.best_epoch
            );
        }
        stop
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}
