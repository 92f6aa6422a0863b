//! Dense row-major matrices and label vectors.

use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SheafError};

/// Largest number of classes a label vector may imply.
///
/// Labels index dense per-class tables (centroids, softmax weights, confusion
/// matrices), so a stray label is rejected before it sizes an allocation.
pub const MAX_CLASSES: usize = 10_000;

/// Dense `f32` matrix, one row per example.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

/// Per-example class scores or probabilities.
pub type ScoreMatrix = FeatureMatrix;

impl FeatureMatrix {
    /// Create a matrix from row-major data.
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(SheafError::invalid_argument(format!(
                "matrix of shape ({rows}, {cols}) cannot hold {} values",
                data.len()
            )));
        }
        Ok(FeatureMatrix { rows, cols, data })
    }

    /// Build a matrix from rows that must all have the same width.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let n = rows.len();
        let mut data = Vec::with_capacity(n * cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(SheafError::extraction(format!(
                    "row {i} has width {}, expected {cols}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Ok(FeatureMatrix {
            rows: n,
            cols,
            data,
        })
    }

    /// A `(0, 0)` matrix.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Row-major backing data.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Row `i`. Panics when out of bounds, like slice indexing.
    pub fn row(&self, i: usize) -> &[f32] {
        let start = i * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Iterate over rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }

    /// Index of the largest value in each row (ties go to the lowest index).
    pub fn argmax_rows(&self) -> Vec<usize> {
        self.iter_rows()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |(best, best_value), (j, &v)| {
                        if v > best_value { (j, v) } else { (best, best_value) }
                    })
                    .0
            })
            .collect()
    }

    /// Copy of the matrix with zero columns appended up to `cols`.
    ///
    /// Matrices already at least `cols` wide are returned unchanged.
    pub fn widen_cols(&self, cols: usize) -> Self {
        if cols <= self.cols {
            return self.clone();
        }
        let mut data = Vec::with_capacity(self.rows * cols);
        for row in self.iter_rows() {
            data.extend_from_slice(row);
            data.resize(data.len() + cols - self.cols, 0.0);
        }
        FeatureMatrix {
            rows: self.rows,
            cols,
            data,
        }
    }

    /// Select rows by index, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        FeatureMatrix {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }
}

/// Class indices, one per example.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelVector(Vec<usize>);

impl LabelVector {
    pub fn new(labels: Vec<usize>) -> Self {
        LabelVector(labels)
    }

    pub fn into_inner(self) -> Vec<usize> {
        self.0
    }

    /// Number of classes implied by the labels (max label + 1, saturating).
    pub fn num_classes(&self) -> usize {
        self.0.iter().max().map_or(0, |&m| m.saturating_add(1))
    }

    /// First `(position, label)` whose label is not below `n_classes`.
    pub fn first_out_of_range(&self, n_classes: usize) -> Option<(usize, usize)> {
        self.0
            .iter()
            .copied()
            .enumerate()
            .find(|&(_, label)| label >= n_classes)
    }
}

impl Deref for LabelVector {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for LabelVector {
    fn from(labels: Vec<usize>) -> Self {
        LabelVector(labels)
    }
}

impl FromIterator<usize> for LabelVector {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        LabelVector(iter.into_iter().collect())
    }
}

/// Check that a matrix and label vector can be paired.
pub fn check_paired(matrix: &FeatureMatrix, labels: &LabelVector) -> Result<()> {
    if matrix.rows() != labels.len() {
        return Err(SheafError::invalid_argument(format!(
            "matrix has {} rows but there are {} labels",
            matrix.rows(),
            labels.len()
        )));
    }
    Ok(())
}
