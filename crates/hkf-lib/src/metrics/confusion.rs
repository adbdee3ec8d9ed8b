use crate::error::LabelError;
use serde::{Deserialize, Serialize};

/// Square count matrix: rows are true labels, columns predicted labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub classes: usize,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn from_labels(
        truth: &[usize],
        predicted: &[usize],
        classes: usize,
    ) -> Result<Self, LabelError> {
        if truth.len() != predicted.len() {
            return Err(LabelError::LengthMismatch {
                truth: truth.len(),
                predicted: predicted.len(),
            });
        }
        let mut counts = vec![vec![0usize; classes]; classes];
        for (&t, &p) in truth.iter().zip(predicted) {
            for label in [t, p] {
                if label >= classes {
                    return Err(LabelError::OutOfRange { label, classes });
                }
            }
            counts[t][p] += 1;
        }
        Ok(Self { classes, counts })
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.classes).map(|i| self.counts[i][i]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.correct() as f64 / total as f64
    }

    /// Each row divided by its sum; empty rows stay zero.
    pub fn row_normalized(&self) -> Vec<Vec<f64>> {
        self.counts
            .iter()
            .map(|row| {
                let sum: usize = row.iter().sum();
                row.iter()
                    .map(|&c| if sum == 0 { 0.0 } else { c as f64 / sum as f64 })
                    .collect()
            })
            .collect()
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_true_rows_against_predicted_columns() {
        let truth = [0, 0, 1, 2, 2, 2];
        let pred = [0, 1, 1, 2, 0, 2];
        let cm = ConfusionMatrix::from_labels(&truth, &pred, 3).unwrap();
        assert_eq!(cm.counts, vec![vec![1, 1, 0], vec![0, 1, 0], vec![1, 0, 2]]);
        assert_eq!(cm.total(), 6);
        assert!((cm.accuracy() - 4.0 / 6.0).abs() < 1e-12);
        let norm = cm.row_normalized();
        assert!((norm[2][2] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(cm.max_count(), 2);
    }

    #[test]
    fn rejects_bad_label_inputs() {
        assert_eq!(
            ConfusionMatrix::from_labels(&[0, 1], &[0], 5),
            Err(LabelError::LengthMismatch {
                truth: 2,
                predicted: 1
            })
        );
        assert_eq!(
            ConfusionMatrix::from_labels(&[0, 7], &[0, 1], 5),
            Err(LabelError::OutOfRange {
                label: 7,
                classes: 5
            })
        );
    }

    #[test]
    fn empty_matrix_has_zero_accuracy() {
        let cm = ConfusionMatrix::from_labels(&[], &[], 5).unwrap();
        assert_eq!(cm.accuracy(), 0.0);
        assert_eq!(cm.row_normalized()[0], vec![0.0; 5]);
    }
}
