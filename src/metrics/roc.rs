//! Binary ROC curve and area under it.

/// Points of a ROC curve, from `(0, 0)` to `(1, 1)`, ordered by decreasing threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    pub false_positive_rate: Vec<f64>,
    pub true_positive_rate: Vec<f64>,
    /// The first threshold is `+inf` (nothing predicted positive).
    pub thresholds: Vec<f64>,
}

impl RocCurve {
    /// Trapezoidal area under the curve.
    pub fn auc(&self) -> f64 {
        self.false_positive_rate
            .windows(2)
            .zip(self.true_positive_rate.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
            .sum()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.false_positive_rate
            .iter()
            .copied()
            .zip(self.true_positive_rate.iter().copied())
    }
}

/// Builds the ROC curve of `scores` against the binary ground truth `positives`.
///
/// One point is emitted per distinct score, so tied scores move the curve diagonally.
/// Returns `None` when there is no positive or no negative sample, since one of the
/// rates is then undefined.
pub fn roc_curve(scores: &[f64], positives: &[bool]) -> Option<RocCurve> {
    assert_eq!(scores.len(), positives.len());

    let total_positives = positives.iter().filter(|p| **p).count();
    let total_negatives = positives.len() - total_positives;
    if total_positives == 0 || total_negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));

    let mut curve = RocCurve {
        false_positive_rate: vec![0.0],
        true_positive_rate: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };
    let (mut tp, mut fp) = (0usize, 0usize);
    for (rank, index) in order.iter().enumerate() {
        if positives[*index] {
            tp += 1;
        } else {
            fp += 1;
        }
        let threshold = scores[*index];
        let last_of_group = order
            .get(rank + 1)
            .is_none_or(|next| scores[*next] != threshold);
        if last_of_group {
            curve
                .false_positive_rate
                .push(fp as f64 / total_negatives as f64);
            curve
                .true_positive_rate
                .push(tp as f64 / total_positives as f64);
            curve.thresholds.push(threshold);
        }
    }

    Some(curve)
}

pub fn binary_auc(scores: &[f64], positives: &[bool]) -> Option<f64> {
    roc_curve(scores, positives).map(|curve| curve.auc())
}
