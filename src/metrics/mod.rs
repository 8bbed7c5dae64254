pub mod accumulator;
pub mod classification;
pub mod roc;

pub use accumulator::{EvalAccumulator, Probabilities};
pub use classification::{
    ConfusionMatrix, accuracy, class_roc_curve, macro_auc, micro_auc, per_class_accuracy,
    per_class_auc,
};
pub use roc::{RocCurve, binary_auc, roc_curve};

use crate::data::NUM_CLASSES;

/// Every metric reported at the end of a run, computed from one accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub samples: usize,
    pub accuracy: f64,
    pub macro_auc: Option<f64>,
    pub micro_auc: Option<f64>,
    pub per_class_auc: [Option<f64>; NUM_CLASSES],
    pub per_class_accuracy: [f64; NUM_CLASSES],
    pub confusion_matrix: ConfusionMatrix,
    pub roc_curves: [Option<RocCurve>; NUM_CLASSES],
}

impl MetricsSummary {
    pub fn compute(acc: &EvalAccumulator) -> Self {
        let confusion_matrix = ConfusionMatrix::new(acc.labels(), acc.predictions());
        let per_class_auc = per_class_auc(acc);
        Self {
            samples: acc.len(),
            accuracy: accuracy(acc.labels(), acc.predictions()),
            macro_auc: macro_auc(&per_class_auc),
            micro_auc: micro_auc(acc),
            per_class_auc,
            per_class_accuracy: confusion_matrix.per_class_accuracy(),
            confusion_matrix,
            roc_curves: std::array::from_fn(|class| class_roc_curve(acc, class)),
        }
    }
}
