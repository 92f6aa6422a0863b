//! Classical classifiers trained on extracted feature matrices.
//!
//! Every classifier implements [`Classifier`]. Instances are independent: the
//! [`ensemble::EnsembleTrainer`] fits each of them on the same training pair
//! without sharing state or combining their predictions.
//!
//! Classifiers are usually built from configuration through [`ClassifierSpec`]:
//!
//! ```json
//! [
//!   {"type": "nearest_centroid"},
//!   {"type": "softmax_regression", "learning_rate": 0.05, "epochs": 30}
//! ]
//! ```

pub mod centroid;
pub mod ensemble;
pub mod softmax;

pub use centroid::NearestCentroid;
pub use ensemble::{EnsembleReport, EnsembleTrainer, FailurePolicy, FitOutcome};
pub use softmax::{SoftmaxParams, SoftmaxRegression};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SheafError};
use crate::features::{FeatureMatrix, LabelVector, MAX_CLASSES, ScoreMatrix};

/// A classifier fitted on a feature matrix and label vector.
pub trait Classifier: Send {
    /// Short identifier, e.g. `"nearest_centroid"`.
    fn name(&self) -> &str;

    /// Name plus hyperparameters, for logs and reports.
    fn describe(&self) -> String {
        self.name().to_string()
    }

    /// Fit on `x` (one row per example) and `y`.
    fn fit(&mut self, x: &FeatureMatrix, y: &LabelVector) -> Result<()>;

    /// Per-class scores for each row of `x`; each row sums to 1.
    fn predict_proba(&self, x: &FeatureMatrix) -> Result<ScoreMatrix>;

    fn is_fitted(&self) -> bool;

    /// Most likely class per row.
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<usize>> {
        Ok(self.predict_proba(x)?.argmax_rows())
    }
}

/// Configuration of a classifier instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifierSpec {
    NearestCentroid,
    SoftmaxRegression(SoftmaxParams),
}

impl ClassifierSpec {
    /// Instantiate an unfitted classifier.
    pub fn build(&self) -> Box<dyn Classifier> {
        match self {
            ClassifierSpec::NearestCentroid => Box::new(NearestCentroid::new()),
            ClassifierSpec::SoftmaxRegression(params) => {
                Box::new(SoftmaxRegression::new(params.clone()))
            }
        }
    }
}

/// Build every classifier in a spec list.
pub fn build_all(specs: &[ClassifierSpec]) -> Vec<Box<dyn Classifier>> {
    specs.iter().map(ClassifierSpec::build).collect()
}

/// Common checks before fitting.
pub(crate) fn check_training_input(x: &FeatureMatrix, y: &LabelVector) -> Result<()> {
    if x.rows() != y.len() {
        return Err(SheafError::training(format!(
            "feature matrix has {} rows but there are {} labels",
            x.rows(),
            y.len()
        )));
    }
    if x.rows() == 0 || x.cols() == 0 {
        return Err(SheafError::training(format!(
            "cannot fit on an empty feature matrix {:?}",
            x.shape()
        )));
    }
    if let Some((position, label)) = y.first_out_of_range(MAX_CLASSES) {
        return Err(SheafError::training(format!(
            "label {label} at position {position} exceeds the limit of {MAX_CLASSES} classes"
        )));
    }
    Ok(())
}

/// Common checks before predicting.
pub(crate) fn check_prediction_input(name: &str, expected_cols: usize, x: &FeatureMatrix) -> Result<()> {
    if x.cols() != expected_cols && !x.is_empty() {
        return Err(SheafError::invalid_argument(format!(
            "{name} was fitted on {expected_cols} features, got {}",
            x.cols()
        )));
    }
    Ok(())
}

/// Numerically stable in-place softmax.
pub(crate) fn softmax_in_place(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        let uniform = 1.0 / values.len() as f32;
        values.iter_mut().for_each(|v| *v = uniform);
        return;
    }
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_deserialization() {
        let specs: Vec<ClassifierSpec> = serde_json::from_str(
            r#"[
                {"type": "nearest_centroid"},
                {"type": "softmax_regression", "learning_rate": 0.5, "epochs": 3}
            ]"#,
        )
        .unwrap();

        assert_eq!(specs[0], ClassifierSpec::NearestCentroid);
        match &specs[1] {
            ClassifierSpec::SoftmaxRegression(params) => {
                assert_eq!(params.learning_rate, 0.5);
                assert_eq!(params.epochs, 3);
                assert_eq!(params.l2, SoftmaxParams::default().l2);
            }
            other => panic!("unexpected spec {other:?}"),
        }

        let classifiers = build_all(&specs);
        assert_eq!(classifiers[0].name(), "nearest_centroid");
        assert_eq!(classifiers[1].name(), "softmax_regression");
        assert!(classifiers.iter().all(|c| !c.is_fitted()));
    }

    #[test]
    fn test_softmax_in_place() {
        let mut values = vec![1.0, 2.0, 3.0];
        softmax_in_place(&mut values);
        let sum: f32 = values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(values[2] > values[1] && values[1] > values[0]);

        let mut all_neg_inf = vec![f32::NEG_INFINITY; 4];
        softmax_in_place(&mut all_neg_inf);
        assert_eq!(all_neg_inf, vec![0.25; 4]);
    }

    #[test]
    fn test_training_input_checks() {
        let x = FeatureMatrix::from_rows(vec![vec![1.0], vec![2.0]]).unwrap();
        assert!(check_training_input(&x, &LabelVector::from(vec![0])).is_err());
        assert!(check_training_input(&x, &LabelVector::from(vec![0, 1])).is_ok());
        assert!(check_training_input(&FeatureMatrix::empty(), &LabelVector::default()).is_err());

        let err = check_training_input(&x, &LabelVector::from(vec![0, usize::MAX])).unwrap_err();
        assert!(matches!(err, SheafError::Training(_)));
        assert!(check_training_input(&x, &LabelVector::from(vec![0, MAX_CLASSES])).is_err());
        assert!(check_training_input(&x, &LabelVector::from(vec![0, MAX_CLASSES - 1])).is_ok());
    }
}
