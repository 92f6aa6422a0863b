//! Scoring predictions against ground truth.
//!
//! The [`Evaluator`] turns a [`ScoreMatrix`] and the paired [`LabelVector`]
//! into an [`EvaluationReport`]. When asked to save, it writes a
//! [`RunResult`] to `{results_dir}/{run_id}/results.json`. Result files are
//! write-once: evaluating twice under the same run id is an error.

pub mod confusion;
pub mod metrics;

pub use confusion::ConfusionMatrix;
pub use metrics::{Averages, ClassMetrics};

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SheafError};
use crate::features::{LabelVector, ScoreMatrix};
use crate::run::{RESULTS_FILE, RunId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_id: String,
    pub n_examples: usize,
    pub n_classes: usize,
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
    pub macro_avg: Averages,
    pub weighted_avg: Averages,
    pub confusion_matrix: ConfusionMatrix,
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run: {}", self.run_id)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for m in &self.per_class {
            writeln!(
                f,
                "{:>14} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                format!("class {}", m.class),
                m.precision,
                m.recall,
                m.f1,
                m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.4} {:>10}",
            "accuracy", "", "", self.accuracy, self.n_examples
        )?;
        for (name, avg) in [("macro avg", self.macro_avg), ("weighted avg", self.weighted_avg)] {
            writeln!(
                f,
                "{:>14} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                name, avg.precision, avg.recall, avg.f1, self.n_examples
            )?;
        }
        writeln!(f)?;
        write!(f, "{}", self.confusion_matrix)
    }
}

/// Persisted outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub report: EvaluationReport,
    pub predictions: Vec<usize>,
    pub scores: Vec<Vec<f32>>,
    pub ground_truth: Vec<usize>,
}

impl RunResult {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    results_dir: PathBuf,
}

impl Evaluator {
    pub fn new<P: Into<PathBuf>>(results_dir: P) -> Self {
        Evaluator {
            results_dir: results_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn result_path(&self, run_id: &RunId) -> PathBuf {
        self.results_dir.join(run_id.to_string()).join(RESULTS_FILE)
    }

    /// Score `scores` against `labels`, persisting a [`RunResult`] when `save` is set.
    pub fn evaluate(
        &self,
        run_id: &RunId,
        scores: &ScoreMatrix,
        labels: &LabelVector,
        save: bool,
    ) -> Result<EvaluationReport> {
        if scores.rows() != labels.len() || scores.cols() == 0 {
            return Err(SheafError::evaluation(format!(
                "score matrix of shape {:?} does not match {} labels",
                scores.shape(),
                labels.len()
            )));
        }
        if let Some((position, label)) = labels.first_out_of_range(scores.cols()) {
            return Err(SheafError::evaluation(format!(
                "label {label} at position {position} has no column in score matrix of shape {:?}",
                scores.shape()
            )));
        }

        let predictions = scores.argmax_rows();
        let n_classes = scores.cols();
        let cm = ConfusionMatrix::from_predictions(&predictions, labels, n_classes)?;
        let per_class = metrics::per_class(&cm);

        let report = EvaluationReport {
            run_id: run_id.to_string(),
            n_examples: labels.len(),
            n_classes,
            accuracy: cm.accuracy(),
            macro_avg: metrics::macro_average(&per_class),
            weighted_avg: metrics::weighted_average(&per_class),
            per_class,
            confusion_matrix: cm,
        };
        info!(
            "Run {}: accuracy {:.4} over {} examples",
            report.run_id, report.accuracy, report.n_examples
        );

        if save {
            let result = RunResult {
                report: report.clone(),
                predictions,
                scores: scores.iter_rows().map(<[f32]>::to_vec).collect(),
                ground_truth: labels.to_vec(),
            };
            let path = self.write_result(run_id, &result)?;
            info!("Saved results to {}", path.display());
        }
        Ok(report)
    }

    fn write_result(&self, run_id: &RunId, result: &RunResult) -> Result<PathBuf> {
        let path = self.result_path(run_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SheafError::evaluation(format!(
                    "results for run {run_id} already exist at {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(serde_json::to_string_pretty(result)?.as_bytes())?;
        file.sync_all()?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureMatrix;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn run_id() -> RunId {
        RunId::with_timestamp("hashing", "tiny", Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
    }

    #[test]
    fn test_perfect_binary_predictions() {
        let temp_dir = TempDir::new().unwrap();
        let evaluator = Evaluator::new(temp_dir.path());
        let scores = FeatureMatrix::from_rows(vec![vec![0.9, 0.1], vec![0.2, 0.8]]).unwrap();

        let report = evaluator
            .evaluate(&run_id(), &scores, &LabelVector::from(vec![0, 1]), false)
            .unwrap();

        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.n_classes, 2);
        assert_eq!(report.macro_avg.f1, 1.0);
        assert!(!evaluator.result_path(&run_id()).exists());
    }

    #[test]
    fn test_label_without_score_column_is_rejected() {
        let evaluator = Evaluator::new("unused");
        let scores = FeatureMatrix::from_rows(vec![vec![0.9, 0.1], vec![0.2, 0.8]]).unwrap();
        let err = evaluator
            .evaluate(&run_id(), &scores, &LabelVector::from(vec![0, 2]), false)
            .unwrap_err();
        assert!(matches!(err, SheafError::Evaluation(_)));
        assert!(err.to_string().contains("label 2 at position 1"), "{err}");

        let single = FeatureMatrix::from_rows(vec![vec![0.9, 0.1]]).unwrap();
        let err = evaluator
            .evaluate(&run_id(), &single, &LabelVector::from(vec![usize::MAX]), false)
            .unwrap_err();
        assert!(matches!(err, SheafError::Evaluation(_)));
    }

    #[test]
    fn test_shape_mismatch() {
        let evaluator = Evaluator::new("unused");
        let scores = FeatureMatrix::from_rows(vec![vec![0.9, 0.1]]).unwrap();
        let err = evaluator
            .evaluate(&run_id(), &scores, &LabelVector::from(vec![0, 1]), false)
            .unwrap_err();
        assert!(matches!(err, SheafError::Evaluation(_)));
        assert!(err.to_string().contains("(1, 2)"));

        let no_columns = FeatureMatrix::new(1, 0, vec![]).unwrap();
        assert!(
            evaluator
                .evaluate(&run_id(), &no_columns, &LabelVector::from(vec![0]), false)
                .is_err()
        );
    }

    #[test]
    fn test_saved_result_is_write_once() {
        let temp_dir = TempDir::new().unwrap();
        let evaluator = Evaluator::new(temp_dir.path());
        let scores = FeatureMatrix::from_rows(vec![vec![0.3, 0.7], vec![0.6, 0.4]]).unwrap();
        let labels = LabelVector::from(vec![1, 1]);

        let report = evaluator.evaluate(&run_id(), &scores, &labels, true).unwrap();
        let saved = RunResult::load(evaluator.result_path(&run_id())).unwrap();
        assert_eq!(saved.report, report);
        assert_eq!(saved.predictions, vec![1, 0]);
        assert_eq!(saved.ground_truth, vec![1, 1]);
        assert_eq!(saved.scores[1], vec![0.6, 0.4]);

        let second = evaluator.evaluate(&run_id(), &scores, &labels, true);
        assert!(second.is_err());
        assert_eq!(RunResult::load(evaluator.result_path(&run_id())).unwrap(), saved);
    }

    #[test]
    fn test_report_display() {
        let evaluator = Evaluator::new("unused");
        let scores = FeatureMatrix::from_rows(vec![vec![0.9, 0.1], vec![0.2, 0.8]]).unwrap();
        let report = evaluator
            .evaluate(&run_id(), &scores, &LabelVector::from(vec![0, 1]), false)
            .unwrap();
        let text = report.to_string();
        assert!(text.contains("class 1"));
        assert!(text.contains("weighted avg"));
    }
}
