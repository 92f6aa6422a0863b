//! Per-class precision, recall and F1, plus their averages.

use serde::{Deserialize, Serialize};

use super::confusion::ConfusionMatrix;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Averages {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Metrics for every class of `cm`. Undefined ratios (0/0) are reported as 0.
pub fn per_class(cm: &ConfusionMatrix) -> Vec<ClassMetrics> {
    (0..cm.n_classes())
        .map(|class| {
            let tp = cm.true_positives(class) as f64;
            let fp = cm.false_positives(class) as f64;
            let fn_ = cm.false_negatives(class) as f64;

            let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
            let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            ClassMetrics {
                class,
                precision,
                recall,
                f1,
                support: cm.support(class),
            }
        })
        .collect()
}

/// Unweighted mean over classes.
pub fn macro_average(metrics: &[ClassMetrics]) -> Averages {
    if metrics.is_empty() {
        return Averages::default();
    }
    let n = metrics.len() as f64;
    Averages {
        precision: metrics.iter().map(|m| m.precision).sum::<f64>() / n,
        recall: metrics.iter().map(|m| m.recall).sum::<f64>() / n,
        f1: metrics.iter().map(|m| m.f1).sum::<f64>() / n,
    }
}

/// Mean over classes weighted by support.
pub fn weighted_average(metrics: &[ClassMetrics]) -> Averages {
    let total: usize = metrics.iter().map(|m| m.support).sum();
    if total == 0 {
        return Averages::default();
    }
    let weighted = |value: fn(&ClassMetrics) -> f64| {
        metrics
            .iter()
            .map(|m| value(m) * m.support as f64)
            .sum::<f64>()
            / total as f64
    };
    Averages {
        precision: weighted(|m| m.precision),
        recall: weighted(|m| m.recall),
        f1: weighted(|m| m.f1),
    }
}
