use crate::data::NUM_CLASSES;
use crate::metrics::accumulator::EvalAccumulator;
use crate::metrics::roc::{RocCurve, binary_auc, roc_curve};

/// Fraction of predictions equal to their label, `0.0` when empty.
pub fn accuracy(labels: &[usize], predictions: &[usize]) -> f64 {
    assert_eq!(labels.len(), predictions.len());
    if labels.is_empty() {
        return 0.0;
    }
    let correct = labels
        .iter()
        .zip(predictions)
        .filter(|(label, prediction)| label == prediction)
        .count();
    correct as f64 / labels.len() as f64
}

/// Rows are true labels, columns are predicted labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub counts: [[usize; NUM_CLASSES]; NUM_CLASSES],
}

impl ConfusionMatrix {
    pub fn new(labels: &[usize], predictions: &[usize]) -> Self {
        assert_eq!(labels.len(), predictions.len());
        let mut counts = [[0; NUM_CLASSES]; NUM_CLASSES];
        for (label, prediction) in labels.iter().zip(predictions) {
            counts[*label][*prediction] += 1;
        }
        Self { counts }
    }

    /// Number of true instances of each class.
    pub fn support(&self) -> [usize; NUM_CLASSES] {
        self.counts.map(|row| row.iter().sum())
    }

    /// Correct predictions of each class over its true instances, `0.0` for absent classes.
    pub fn per_class_accuracy(&self) -> [f64; NUM_CLASSES] {
        let support = self.support();
        std::array::from_fn(|class| match support[class] {
            0 => 0.0,
            n => self.counts[class][class] as f64 / n as f64,
        })
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }
}

pub fn per_class_accuracy(labels: &[usize], predictions: &[usize]) -> [f64; NUM_CLASSES] {
    ConfusionMatrix::new(labels, predictions).per_class_accuracy()
}

fn one_vs_rest(acc: &EvalAccumulator, class: usize) -> (Vec<f64>, Vec<bool>) {
    let scores = acc
        .probabilities()
        .iter()
        .map(|row| row[class] as f64)
        .collect();
    let positives = acc.labels().iter().map(|label| *label == class).collect();
    (scores, positives)
}

/// One-vs-rest ROC curve of `class`.
pub fn class_roc_curve(acc: &EvalAccumulator, class: usize) -> Option<RocCurve> {
    let (scores, positives) = one_vs_rest(acc, class);
    roc_curve(&scores, &positives)
}

/// One-vs-rest AUC of every class; `None` for a class that is absent or the only one present.
pub fn per_class_auc(acc: &EvalAccumulator) -> [Option<f64>; NUM_CLASSES] {
    std::array::from_fn(|class| {
        let (scores, positives) = one_vs_rest(acc, class);
        binary_auc(&scores, &positives)
    })
}

/// Unweighted mean of the defined per-class AUCs.
pub fn macro_auc(per_class: &[Option<f64>]) -> Option<f64> {
    let defined: Vec<f64> = per_class.iter().flatten().copied().collect();
    if defined.is_empty() {
        return None;
    }
    Some(defined.iter().sum::<f64>() / defined.len() as f64)
}

/// AUC of every (sample, class) pair pooled together, with one-hot labels.
pub fn micro_auc(acc: &EvalAccumulator) -> Option<f64> {
    let scores: Vec<f64> = acc
        .probabilities()
        .iter()
        .flat_map(|row| row.iter().map(|p| *p as f64))
        .collect();
    let positives: Vec<bool> = acc
        .labels()
        .iter()
        .flat_map(|label| (0..NUM_CLASSES).map(move |class| class == *label))
        .collect();
    binary_auc(&scores, &positives)
}
