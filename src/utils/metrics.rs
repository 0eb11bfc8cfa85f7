//! Classification metrics
//!
//! `Metrics` is what `cropdoc val` prints and what a training run writes to
//! `val_metrics.json`. The two trackers at the bottom feed the per-epoch log.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Validation report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub total_samples: usize,
    pub correct_predictions: usize,
    /// Top-1 accuracy
    pub accuracy: f64,
    /// Means over the classes present in the ground truth
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    /// F1 averaged with each class counted by its support
    pub weighted_f1: f64,
    pub per_class: Vec<ClassMetrics>,
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Score `predictions` against `ground_truth`
    ///
    /// Pairs beyond the shorter slice are ignored.
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        if predictions.len() != ground_truth.len() {
            warn!(
                "{} predictions for {} labels, scoring the first {}",
                predictions.len(),
                ground_truth.len(),
                predictions.len().min(ground_truth.len())
            );
        }
        let scored = predictions.len().min(ground_truth.len());
        let (predictions, ground_truth) = (&predictions[..scored], &ground_truth[..scored]);
        if predictions.is_empty() {
            return Self::default();
        }

        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);
        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, idx))
            .collect();

        let present: Vec<&ClassMetrics> = per_class.iter().filter(|c| c.support > 0).collect();
        let mean_of = |score: fn(&ClassMetrics) -> f64| -> f64 {
            let sum: f64 = present.iter().map(|c| score(c)).sum();
            ratio_f64(sum, present.len() as f64)
        };

        let support: usize = present.iter().map(|c| c.support).sum();
        let weighted: f64 = present.iter().map(|c| c.f1 * c.support as f64).sum();

        let correct_predictions = confusion_matrix.correct();
        Self {
            total_samples: predictions.len(),
            correct_predictions,
            accuracy: ratio(correct_predictions, predictions.len()),
            macro_precision: mean_of(|c| c.precision),
            macro_recall: mean_of(|c| c.recall),
            macro_f1: mean_of(|c| c.f1),
            weighted_f1: ratio_f64(weighted, support as f64),
            per_class,
            confusion_matrix,
        }
    }

    pub fn with_class_names(mut self, names: &[String]) -> Self {
        for class in self.per_class.iter_mut() {
            class.class_name = names.get(class.class_idx).cloned();
        }
        self
    }

    /// The `n` classes with the lowest F1, ignoring classes absent from the data
    pub fn weakest_classes(&self, n: usize) -> Vec<&ClassMetrics> {
        let mut present: Vec<&ClassMetrics> =
            self.per_class.iter().filter(|c| c.support > 0).collect();
        present.sort_by(|a, b| a.f1.total_cmp(&b.f1));
        present.into_iter().take(n).collect()
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pct = |v: f64| v * 100.0;
        writeln!(f, "Validation metrics ({} samples):", self.total_samples)?;
        writeln!(f, "  Top-1 accuracy:  {:6.2}%", pct(self.accuracy))?;
        writeln!(f, "  Macro precision: {:6.2}%", pct(self.macro_precision))?;
        writeln!(f, "  Macro recall:    {:6.2}%", pct(self.macro_recall))?;
        writeln!(f, "  Macro F1:        {:6.2}%", pct(self.macro_f1))?;
        write!(f, "  Weighted F1:     {:6.2}%", pct(self.weighted_f1))
    }
}

/// Scores for a single class
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_idx: usize,
    pub class_name: Option<String>,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Ground-truth occurrences
    pub support: usize,
}

impl ClassMetrics {
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let hits = cm.get(class_idx, class_idx);
        let predicted = cm.col_sum(class_idx);
        let actual = cm.row_sum(class_idx);

        let precision = ratio(hits, predicted);
        let recall = ratio(hits, actual);
        let f1 = ratio_f64(2.0 * precision * recall, precision + recall);

        Self {
            class_idx,
            class_name: None,
            true_positives: hits,
            false_positives: predicted - hits,
            false_negatives: actual - hits,
            precision,
            recall,
            f1,
            support: actual,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    ratio_f64(num as f64, den as f64)
}

/// `num / den`, or 0 when the denominator is 0
fn ratio_f64(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Square count table indexed by `[actual][predicted]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![vec![0; num_classes]; num_classes],
        }
    }

    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut cm = Self::new(num_classes);
        predictions
            .iter()
            .zip(ground_truth)
            .for_each(|(&predicted, &actual)| cm.add(actual, predicted));
        cm
    }

    /// Count one sample; out-of-range indices are dropped
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if let Some(cell) = self
            .counts
            .get_mut(actual)
            .and_then(|row| row.get_mut(predicted))
        {
            *cell += 1;
        }
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.counts
            .get(actual)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    pub fn row_sum(&self, actual: usize) -> usize {
        self.counts.get(actual).map_or(0, |row| row.iter().sum())
    }

    pub fn col_sum(&self, predicted: usize) -> usize {
        self.counts
            .iter()
            .filter_map(|row| row.get(predicted))
            .sum()
    }
}

/// Mean of the per-batch losses seen so far
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn average(&self) -> f64 {
        ratio_f64(self.sum, self.count as f64)
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Hit rate over the training batches of an epoch
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    correct: usize,
    total: usize,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_batch(&mut self, predictions: &[usize], ground_truth: &[usize]) {
        let pairs = predictions.iter().zip(ground_truth);
        let seen = pairs.clone().count();
        self.correct += pairs.filter(|(p, t)| p == t).count();
        self.total += seen;
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.total)
    }

    pub fn count(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_confusion_counts() {
        let truth = [0, 1, 2, 0, 2, 2, 1, 0, 1, 2];
        let preds = [0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let cm = ConfusionMatrix::from_predictions(&preds, &truth, 3);

        assert_eq!(cm.get(0, 0), 3);
        assert_eq!(cm.get(1, 0), 1);
        assert_eq!(cm.get(2, 1), 1);
        assert_eq!(cm.row_sum(2), 4);
        assert_eq!(cm.col_sum(2), 4);
        assert_eq!(cm.total(), 10);
        assert_eq!(cm.correct(), 7);
        assert!(close(cm.accuracy(), 0.7));
    }

    #[test]
    fn test_out_of_range_entries_are_dropped() {
        let mut cm = ConfusionMatrix::new(2);
        cm.add(0, 5);
        cm.add(3, 1);
        assert_eq!(cm.total(), 0);
        assert_eq!(cm.get(9, 9), 0);
        assert_eq!(cm.row_sum(7), 0);
    }

    #[test]
    fn test_per_class_scores() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 0, 1, 1], &[0, 0, 1, 1, 0], 2);
        let first = ClassMetrics::from_confusion_matrix(&cm, 0);

        assert_eq!(
            (first.true_positives, first.false_positives, first.false_negatives),
            (2, 1, 1)
        );
        assert_eq!(first.support, 3);
        assert!(close(first.precision, 2.0 / 3.0));
        assert!(close(first.recall, 2.0 / 3.0));
        assert!(close(first.f1, 2.0 / 3.0));
    }

    #[test]
    fn test_absent_classes_do_not_drag_the_macro_mean() {
        let metrics = Metrics::from_predictions(&[0, 1, 1, 0], &[0, 1, 1, 0], 3);
        assert_eq!(metrics.correct_predictions, 4);
        assert!(close(metrics.accuracy, 1.0));
        assert!(close(metrics.macro_f1, 1.0));
        assert!(close(metrics.weighted_f1, 1.0));
    }

    #[test]
    fn test_length_mismatch_scores_the_common_prefix() {
        let metrics = Metrics::from_predictions(&[0, 1, 1, 0, 1], &[0, 1, 0], 2);
        assert_eq!(metrics.total_samples, 3);
        assert_eq!(metrics.correct_predictions, 2);
        assert_eq!(metrics.confusion_matrix.total(), 3);
    }

    #[test]
    fn test_no_samples() {
        let metrics = Metrics::from_predictions(&[], &[], 38);
        assert_eq!(metrics.total_samples, 0);
        assert_eq!(metrics.accuracy, 0.0);
        assert!(metrics.per_class.is_empty());
    }

    #[test]
    fn test_named_classes_and_weakest() {
        let names = ["healthy".to_string(), "blight".to_string()];
        let metrics = Metrics::from_predictions(&[0, 0, 1, 0], &[0, 0, 1, 1], 2)
            .with_class_names(&names);

        assert_eq!(metrics.per_class[1].class_name.as_deref(), Some("blight"));
        let weakest = metrics.weakest_classes(1);
        assert_eq!(weakest.len(), 1);
        assert_eq!(weakest[0].class_idx, 1);
    }

    #[test]
    fn test_batch_trackers() {
        let mut loss = RunningAverage::new();
        assert_eq!(loss.average(), 0.0);
        loss.add(1.0);
        loss.add(3.0);
        assert_eq!(loss.count(), 2);
        assert!(close(loss.average(), 2.0));

        let mut acc = AccuracyTracker::new();
        acc.add_batch(&[0, 1, 2], &[0, 1, 0]);
        assert_eq!(acc.count(), 3);
        assert!(close(acc.accuracy(), 2.0 / 3.0));
    }
}
