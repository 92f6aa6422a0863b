//! Multinomial logistic regression trained with mini-batch SGD.
//!
//! Besides being a [`Classifier`], the model exposes epoch-level training
//! ([`SoftmaxRegression::train_epoch`]) and weight snapshots so it can serve as
//! the trainable head of a fine-tuning run.

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::classifier::{Classifier, check_prediction_input, check_training_input, softmax_in_place};
use crate::error::{Result, SheafError};
use crate::features::{FeatureMatrix, LabelVector, MAX_CLASSES, ScoreMatrix};

/// Hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftmaxParams {
    pub learning_rate: f32,
    pub epochs: usize,
    pub batch_size: usize,
    /// L2 penalty applied to the weights (not the bias).
    pub l2: f32,
    pub seed: u64,
    /// Minimum number of classes; the labels may imply more.
    pub num_classes: Option<usize>,
}

impl Default for SoftmaxParams {
    fn default() -> Self {
        SoftmaxParams {
            learning_rate: 0.1,
            epochs: 20,
            batch_size: 32,
            l2: 0.0,
            seed: 0,
            num_classes: None,
        }
    }
}

/// Learned parameters: `weights` is `n_classes x n_features`, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxWeights {
    pub n_classes: usize,
    pub n_features: usize,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl SoftmaxWeights {
    pub fn zeros(n_classes: usize, n_features: usize) -> Self {
        SoftmaxWeights {
            n_classes,
            n_features,
            weights: vec![0.0; n_classes * n_features],
            bias: vec![0.0; n_classes],
        }
    }

    fn logits_into(&self, row: &[f32], out: &mut [f32]) {
        for (k, logit) in out.iter_mut().enumerate() {
            let w = &self.weights[k * self.n_features..(k + 1) * self.n_features];
            *logit = self.bias[k] + w.iter().zip(row).map(|(a, b)| a * b).sum::<f32>();
        }
    }

    fn probabilities(&self, row: &[f32]) -> Vec<f32> {
        let mut out = vec![0.0; self.n_classes];
        self.logits_into(row, &mut out);
        softmax_in_place(&mut out);
        out
    }
}

#[derive(Debug, Clone)]
pub struct SoftmaxRegression {
    params: SoftmaxParams,
    state: Option<SoftmaxWeights>,
}

impl SoftmaxRegression {
    pub fn new(params: SoftmaxParams) -> Self {
        SoftmaxRegression {
            params,
            state: None,
        }
    }

    pub fn params(&self) -> &SoftmaxParams {
        &self.params
    }

    /// Reset to zero weights for the given shape.
    pub fn initialize(&mut self, n_features: usize, n_classes: usize) {
        self.state = Some(SoftmaxWeights::zeros(n_classes, n_features));
    }

    pub fn weights(&self) -> Option<&SoftmaxWeights> {
        self.state.as_ref()
    }

    pub fn set_weights(&mut self, weights: SoftmaxWeights) -> Result<()> {
        if weights.weights.len() != weights.n_classes * weights.n_features
            || weights.bias.len() != weights.n_classes
        {
            return Err(SheafError::model(format!(
                "inconsistent weights for {} classes x {} features",
                weights.n_classes, weights.n_features
            )));
        }
        self.state = Some(weights);
        Ok(())
    }

    fn state(&self) -> Result<&SoftmaxWeights> {
        self.state
            .as_ref()
            .ok_or_else(|| SheafError::training("softmax_regression is not fitted"))
    }

    fn check_labels(state: &SoftmaxWeights, y: &LabelVector) -> Result<()> {
        if let Some(&bad) = y.iter().find(|&&label| label >= state.n_classes) {
            return Err(SheafError::training(format!(
                "label {bad} out of range for {} classes",
                state.n_classes
            )));
        }
        Ok(())
    }

    /// One pass of mini-batch SGD over shuffled rows. Returns the mean training loss.
    pub fn train_epoch(
        &mut self,
        x: &FeatureMatrix,
        y: &LabelVector,
        rng: &mut StdRng,
    ) -> Result<f64> {
        check_training_input(x, y)?;
        let params = self.params.clone();
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| SheafError::training("softmax_regression is not initialized"))?;
        check_prediction_input("softmax_regression", state.n_features, x)?;
        Self::check_labels(state, y)?;

        let mut order: Vec<usize> = (0..x.rows()).collect();
        order.shuffle(rng);

        let n_features = state.n_features;
        let mut grad_w = vec![0f32; state.weights.len()];
        let mut grad_b = vec![0f32; state.n_classes];
        let mut total_loss = 0f64;

        for batch in order.chunks(params.batch_size.max(1)) {
            grad_w.iter_mut().for_each(|g| *g = 0.0);
            grad_b.iter_mut().for_each(|g| *g = 0.0);

            for &i in batch {
                let row = x.row(i);
                let mut p = state.probabilities(row);
                let label = y[i];
                total_loss -= f64::from(p[label].max(f32::MIN_POSITIVE)).ln();
                p[label] -= 1.0;
                for (k, &delta) in p.iter().enumerate() {
                    grad_b[k] += delta;
                    let g = &mut grad_w[k * n_features..(k + 1) * n_features];
                    for (gj, &xj) in g.iter_mut().zip(row) {
                        *gj += delta * xj;
                    }
                }
            }

            let scale = params.learning_rate / batch.len() as f32;
            for (w, g) in state.weights.iter_mut().zip(&grad_w) {
                *w -= scale * g + params.learning_rate * params.l2 * *w;
            }
            for (b, g) in state.bias.iter_mut().zip(&grad_b) {
                *b -= scale * g;
            }
        }

        Ok(total_loss / x.rows() as f64)
    }

    /// Mean cross-entropy of the current weights on `(x, y)`.
    pub fn loss(&self, x: &FeatureMatrix, y: &LabelVector) -> Result<f64> {
        check_training_input(x, y)?;
        let state = self.state()?;
        check_prediction_input(self.name(), state.n_features, x)?;
        Self::check_labels(state, y)?;

        let total: f64 = x
            .iter_rows()
            .zip(y.iter())
            .map(|(row, &label)| {
                let p = state.probabilities(row);
                -f64::from(p[label].max(f32::MIN_POSITIVE)).ln()
            })
            .sum();
        Ok(total / x.rows() as f64)
    }
}

impl Default for SoftmaxRegression {
    fn default() -> Self {
        Self::new(SoftmaxParams::default())
    }
}

impl Classifier for SoftmaxRegression {
    fn name(&self) -> &str {
        "softmax_regression"
    }

    fn describe(&self) -> String {
        format!(
            "softmax_regression(learning_rate={}, epochs={}, batch_size={}, l2={}, seed={})",
            self.params.learning_rate,
            self.params.epochs,
            self.params.batch_size,
            self.params.l2,
            self.params.seed
        )
    }

    fn fit(&mut self, x: &FeatureMatrix, y: &LabelVector) -> Result<()> {
        check_training_input(x, y)?;
        let n_classes = y.num_classes().max(self.params.num_classes.unwrap_or(0));
        if n_classes > MAX_CLASSES {
            return Err(SheafError::training(format!(
                "num_classes {n_classes} exceeds the limit of {MAX_CLASSES}"
            )));
        }
        self.initialize(x.cols(), n_classes);

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        for epoch in 0..self.params.epochs {
            let loss = self.train_epoch(x, y, &mut rng)?;
            debug!("softmax_regression epoch {}: loss {loss:.4}", epoch + 1);
        }
        Ok(())
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Result<ScoreMatrix> {
        let state = self.state()?;
        check_prediction_input(self.name(), state.n_features, x)?;

        let mut data = Vec::with_capacity(x.rows() * state.n_classes);
        for row in x.iter_rows() {
            data.extend(state.probabilities(row));
        }
        FeatureMatrix::new(x.rows(), state.n_classes, data)
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (FeatureMatrix, LabelVector) {
        let x = FeatureMatrix::from_rows(vec![
            vec![1.0, 0.0],
            vec![0.9, 0.1],
            vec![0.0, 1.0],
            vec![0.1, 0.9],
            vec![1.0, 0.1],
            vec![0.2, 1.0],
        ])
        .unwrap();
        (x, LabelVector::from(vec![0, 0, 1, 1, 0, 1]))
    }

    fn params() -> SoftmaxParams {
        SoftmaxParams {
            learning_rate: 0.5,
            epochs: 200,
            batch_size: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_learns_separable_data() {
        let (x, y) = separable();
        let mut model = SoftmaxRegression::new(params());
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y.to_vec());
        let proba = model.predict_proba(&x).unwrap();
        for row in proba.iter_rows() {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_training_reduces_loss() {
        let (x, y) = separable();
        let mut model = SoftmaxRegression::new(params());
        model.initialize(2, 2);
        let initial = model.loss(&x, &y).unwrap();
        assert!((initial - 2f64.ln()).abs() < 1e-6);

        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            model.train_epoch(&x, &y, &mut rng).unwrap();
        }
        assert!(model.loss(&x, &y).unwrap() < initial);
    }

    #[test]
    fn test_fit_is_deterministic_for_a_seed() {
        let (x, y) = separable();
        let mut a = SoftmaxRegression::new(params());
        let mut b = SoftmaxRegression::new(params());
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.weights(), b.weights());
    }

    #[test]
    fn test_num_classes_floor() {
        let (x, y) = separable();
        let mut model = SoftmaxRegression::new(SoftmaxParams {
            num_classes: Some(5),
            epochs: 1,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict_proba(&x).unwrap().cols(), 5);

        let mut oversized = SoftmaxRegression::new(SoftmaxParams {
            num_classes: Some(MAX_CLASSES + 1),
            ..Default::default()
        });
        assert!(matches!(oversized.fit(&x, &y), Err(SheafError::Training(_))));
        assert!(!oversized.is_fitted());
    }

    #[test]
    fn test_out_of_range_label() {
        let (x, _) = separable();
        let mut model = SoftmaxRegression::default();
        model.initialize(2, 2);
        let y = LabelVector::from(vec![0, 0, 1, 1, 0, 2]);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(model.train_epoch(&x, &y, &mut rng).is_err());
    }

    #[test]
    fn test_set_weights_validates_shape() {
        let mut model = SoftmaxRegression::default();
        let mut weights = SoftmaxWeights::zeros(2, 3);
        weights.bias.pop();
        assert!(model.set_weights(weights).is_err());
        assert!(model.set_weights(SoftmaxWeights::zeros(2, 3)).is_ok());
        assert!(model.is_fitted());
    }
}
