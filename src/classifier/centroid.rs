//! Nearest-centroid classifier.
//!
//! Each class is represented by the mean of its training rows. Scores are the
//! softmax of negative squared distances to every centroid; classes unseen
//! during training score zero.

use std::collections::BTreeMap;

use log::debug;

use crate::classifier::{Classifier, check_prediction_input, check_training_input, softmax_in_place};
use crate::error::{Result, SheafError};
use crate::features::{FeatureMatrix, LabelVector, ScoreMatrix};

#[derive(Debug, Clone, Default)]
pub struct NearestCentroid {
    /// Per-class mean row; `None` for classes absent from the training labels.
    centroids: Vec<Option<Vec<f32>>>,
    n_features: usize,
}

impl NearestCentroid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn centroid(&self, class: usize) -> Option<&[f32]> {
        self.centroids.get(class)?.as_deref()
    }
}

impl Classifier for NearestCentroid {
    fn name(&self) -> &str {
        "nearest_centroid"
    }

    fn fit(&mut self, x: &FeatureMatrix, y: &LabelVector) -> Result<()> {
        check_training_input(x, y)?;

        let n_classes = y.num_classes();
        // sums only for classes that occur
        let mut sums: BTreeMap<usize, (Vec<f64>, usize)> = BTreeMap::new();
        for (row, &label) in x.iter_rows().zip(y.iter()) {
            let (sum, count) = sums
                .entry(label)
                .or_insert_with(|| (vec![0f64; x.cols()], 0));
            *count += 1;
            for (acc, &v) in sum.iter_mut().zip(row) {
                *acc += f64::from(v);
            }
        }

        let mut centroids: Vec<Option<Vec<f32>>> = vec![None; n_classes];
        for (&label, (sum, count)) in &sums {
            centroids[label] = Some(sum.iter().map(|s| (s / *count as f64) as f32).collect());
        }
        let counts: Vec<(usize, usize)> = sums.iter().map(|(&l, (_, c))| (l, *c)).collect();
        self.centroids = centroids;
        self.n_features = x.cols();
        debug!("nearest_centroid fitted {n_classes} classes with counts {counts:?}");
        Ok(())
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Result<ScoreMatrix> {
        if !self.is_fitted() {
            return Err(SheafError::training("nearest_centroid is not fitted"));
        }
        check_prediction_input(self.name(), self.n_features, x)?;

        let n_classes = self.centroids.len();
        let mut data = Vec::with_capacity(x.rows() * n_classes);
        for row in x.iter_rows() {
            let mut scores: Vec<f32> = self
                .centroids
                .iter()
                .map(|centroid| match centroid {
                    Some(c) => -row
                        .iter()
                        .zip(c)
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum::<f32>(),
                    None => f32::NEG_INFINITY,
                })
                .collect();
            softmax_in_place(&mut scores);
            data.extend(scores);
        }
        FeatureMatrix::new(x.rows(), n_classes, data)
    }

    fn is_fitted(&self) -> bool {
        !self.centroids.is_empty()
    }
}
