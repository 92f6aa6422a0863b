//! Confusion matrix over class indices.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SheafError};

/// `matrix[true][pred]` counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        ConfusionMatrix {
            matrix: vec![vec![0; n_classes]; n_classes],
        }
    }

    /// Count `(y_true[i], y_pred[i])` pairs over `n_classes` classes.
    pub fn from_predictions(y_pred: &[usize], y_true: &[usize], n_classes: usize) -> Result<Self> {
        if y_pred.len() != y_true.len() {
            return Err(SheafError::evaluation(format!(
                "{} predictions for {} labels",
                y_pred.len(),
                y_true.len()
            )));
        }

        let mut cm = Self::new(n_classes);
        for (&pred, &truth) in y_pred.iter().zip(y_true) {
            if pred >= n_classes || truth >= n_classes {
                return Err(SheafError::evaluation(format!(
                    "class index out of range: true {truth}, predicted {pred}, {n_classes} classes"
                )));
            }
            cm.matrix[truth][pred] += 1;
        }
        Ok(cm)
    }

    pub fn n_classes(&self) -> usize {
        self.matrix.len()
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    pub fn get(&self, true_label: usize, predicted_label: usize) -> usize {
        self.matrix[true_label][predicted_label]
    }

    pub fn true_positives(&self, class: usize) -> usize {
        self.matrix[class][class]
    }

    /// Predicted as `class` but labelled otherwise.
    pub fn false_positives(&self, class: usize) -> usize {
        (0..self.n_classes())
            .filter(|&i| i != class)
            .map(|i| self.matrix[i][class])
            .sum()
    }

    /// Labelled `class` but predicted otherwise.
    pub fn false_negatives(&self, class: usize) -> usize {
        (0..self.n_classes())
            .filter(|&j| j != class)
            .map(|j| self.matrix[class][j])
            .sum()
    }

    pub fn support(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.n_classes()).map(|i| self.matrix[i][i]).sum()
    }

    /// Fraction of correct predictions; 0 when there are none.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.correct() as f64 / total as f64
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for j in 0..self.n_classes() {
            write!(f, "{:>8}", format!("pred {j}"))?;
        }
        writeln!(f)?;
        for (i, row) in self.matrix.iter().enumerate() {
            write!(f, "{:>8}", format!("true {i}"))?;
            for count in row {
                write!(f, "{count:>8}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1, 2, 0, 1], &[0, 1, 0, 2, 0, 2], 3)
            .unwrap();
        assert_eq!(cm.get(0, 0), 2);
        assert_eq!(cm.get(0, 1), 1);
        assert_eq!(cm.get(2, 1), 1);
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.correct(), 4);
    }

    #[test]
    fn test_tp_fp_fn() {
        let cm = ConfusionMatrix::from_predictions(&[1, 1, 0, 1], &[1, 0, 0, 1], 2).unwrap();
        assert_eq!(cm.true_positives(1), 2);
        assert_eq!(cm.false_positives(1), 1);
        assert_eq!(cm.false_negatives(1), 0);
        assert_eq!(cm.false_negatives(0), 1);
        assert_eq!(cm.support(0), 2);
        assert_eq!(cm.accuracy(), 0.75);
    }

    #[test]
    fn test_out_of_range_and_length_errors() {
        assert!(ConfusionMatrix::from_predictions(&[0, 3], &[0, 1], 2).is_err());
        assert!(ConfusionMatrix::from_predictions(&[0], &[0, 1], 2).is_err());
    }

    #[test]
    fn test_empty() {
        let cm = ConfusionMatrix::new(3);
        assert_eq!(cm.accuracy(), 0.0);
        assert_eq!(serde_json::to_string(&cm).unwrap(), "[[0,0,0],[0,0,0],[0,0,0]]");
    }
}
