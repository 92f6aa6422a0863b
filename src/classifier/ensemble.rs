//! Fitting a set of independent classifiers on one training pair.

use std::time::Instant;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::classifier::{Classifier, check_training_input};
use crate::error::Result;
use crate::features::{FeatureMatrix, LabelVector};

/// What to do when one classifier fails to fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort at the first failure.
    #[default]
    FailFast,
    /// Record the failure and keep fitting the rest.
    Isolate,
}

/// Result of fitting one classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitOutcome {
    pub index: usize,
    pub name: String,
    pub description: String,
    pub fitted: bool,
    pub error: Option<String>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnsembleReport {
    pub outcomes: Vec<FitOutcome>,
}

impl EnsembleReport {
    pub fn fitted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.fitted).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &FitOutcome> {
        self.outcomes.iter().filter(|o| !o.fitted)
    }

    pub fn all_fitted(&self) -> bool {
        self.outcomes.iter().all(|o| o.fitted)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnsembleTrainer {
    policy: FailurePolicy,
}

impl EnsembleTrainer {
    pub fn new(policy: FailurePolicy) -> Self {
        EnsembleTrainer { policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Fit every classifier on `(x, y)` in order.
    ///
    /// Under [`FailurePolicy::FailFast`] the first error is returned and the
    /// remaining classifiers stay unfitted.
    pub fn fit_all(
        &self,
        classifiers: &mut [Box<dyn Classifier>],
        x: &FeatureMatrix,
        y: &LabelVector,
    ) -> Result<EnsembleReport> {
        check_training_input(x, y)?;

        let mut report = EnsembleReport::default();
        for (index, classifier) in classifiers.iter_mut().enumerate() {
            let description = classifier.describe();
            info!("Fitting classifier {index}: {description}");

            let start = Instant::now();
            let result = classifier.fit(x, y);
            let duration_ms = start.elapsed().as_millis();

            let error = match result {
                Ok(()) => None,
                Err(e) if self.policy == FailurePolicy::FailFast => return Err(e),
                Err(e) => {
                    warn!("Classifier {index} ({description}) failed: {e}");
                    Some(e.to_string())
                }
            };
            report.outcomes.push(FitOutcome {
                index,
                name: classifier.name().to_string(),
                description,
                fitted: error.is_none(),
                error,
                duration_ms,
            });
        }
        Ok(report)
    }
}
