use crate::data::NUM_CLASSES;

/// Softmax output of one sample.
pub type Probabilities = [f32; NUM_CLASSES];

/// Labels, argmax predictions and softmax probabilities collected over evaluation passes.
///
/// The three lists are index-aligned and always have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalAccumulator {
    labels: Vec<usize>,
    predictions: Vec<usize>,
    probabilities: Vec<Probabilities>,
}

impl EvalAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: usize, prediction: usize, probabilities: Probabilities) {
        assert!(label < NUM_CLASSES, "label {label} out of range");
        assert!(prediction < NUM_CLASSES, "prediction {prediction} out of range");
        self.labels.push(label);
        self.predictions.push(prediction);
        self.probabilities.push(probabilities);
    }

    /// Appends a batch.
    ///
    /// # Shapes
    ///   - labels [batch_size]
    ///   - predictions [batch_size]
    ///   - probabilities [batch_size * NUM_CLASSES], row-major
    pub fn push_batch(&mut self, labels: &[usize], predictions: &[usize], probabilities: &[f32]) {
        assert_eq!(labels.len(), predictions.len());
        assert_eq!(labels.len() * NUM_CLASSES, probabilities.len());

        for ((label, prediction), row) in labels
            .iter()
            .zip(predictions)
            .zip(probabilities.chunks_exact(NUM_CLASSES))
        {
            let mut probabilities = [0f32; NUM_CLASSES];
            probabilities.copy_from_slice(row);
            self.push(*label, *prediction, probabilities);
        }
    }

    pub fn clear(&mut self) {
        self.labels.clear();
        self.predictions.clear();
        self.probabilities.clear();
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn predictions(&self) -> &[usize] {
        &self.predictions
    }

    pub fn probabilities(&self) -> &[Probabilities] {
        &self.probabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform() -> Probabilities {
        [1.0 / NUM_CLASSES as f32; NUM_CLASSES]
    }

    #[test]
    fn push_batch_keeps_lists_aligned() {
        let mut acc = EvalAccumulator::new();
        let probabilities: Vec<f32> = (0..3).flat_map(|_| uniform()).collect();

        acc.push_batch(&[1, 2, 3], &[1, 0, 3], &probabilities);

        assert_eq!(acc.len(), 3);
        assert_eq!(acc.labels(), &[1, 2, 3]);
        assert_eq!(acc.predictions(), &[1, 0, 3]);
        assert_eq!(acc.probabilities().len(), 3);
    }

    #[test]
    fn batches_accumulate_until_cleared() {
        let mut acc = EvalAccumulator::new();
        acc.push(0, 0, uniform());
        acc.push(1, 1, uniform());
        assert_eq!(acc.len(), 2);

        acc.clear();

        assert!(acc.is_empty());
        assert!(acc.predictions().is_empty());
        assert!(acc.probabilities().is_empty());
    }

    #[test]
    #[should_panic]
    fn misaligned_batches_are_rejected() {
        let mut acc = EvalAccumulator::new();
        acc.push_batch(&[1, 2], &[1], &[0.1; 2 * NUM_CLASSES]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn labels_must_be_digits() {
        EvalAccumulator::new().push(10, 0, uniform());
    }
}
