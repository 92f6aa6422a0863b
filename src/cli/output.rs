//! Output formatting for CLI commands.

use std::fmt;

use serde::Serialize;

use crate::classifier::EnsembleReport;
use crate::cli::args::{OutputFormat, SheafArgs};
use crate::error::Result;
use crate::evaluation::EvaluationReport;
use crate::finetune::TrainingHistory;

/// Result of a fine-tuning command.
#[derive(Debug, Serialize)]
pub struct FinetuneSummary {
    pub run_id: String,
    pub run_dir: String,
    pub history: Option<TrainingHistory>,
    pub report: EvaluationReport,
}

/// Features produced for one split.
#[derive(Debug, Serialize)]
pub struct SplitFeatures {
    pub split: String,
    pub cache_key: String,
    pub rows: usize,
    pub cols: usize,
}

/// Result of a feature extraction command.
#[derive(Debug, Serialize)]
pub struct FeaturesSummary {
    pub encoder: String,
    pub dataset: String,
    pub splits: Vec<SplitFeatures>,
}

/// Result of an ensemble command.
#[derive(Debug, Serialize)]
pub struct EnsembleSummary {
    pub features: FeaturesSummary,
    pub training: Option<EnsembleReport>,
    pub reports: Vec<EvaluationReport>,
}

/// Cache directory listing.
#[derive(Debug, Serialize)]
pub struct CacheListing {
    pub directory: String,
    pub entries: Vec<String>,
}

/// Result of clearing the cache.
#[derive(Debug, Serialize)]
pub struct CacheCleared {
    pub directory: String,
    pub removed_files: usize,
}

/// Output a result in the selected format.
pub fn output_result<T: Serialize + fmt::Display>(
    message: &str,
    result: &T,
    args: &SheafArgs,
) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 0 {
                println!("{message}");
                println!();
            }
            print!("{result}");
            Ok(())
        }
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_json<T: Serialize>(result: &T, args: &SheafArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}

impl fmt::Display for FinetuneSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run directory: {}", self.run_dir)?;
        if let Some(history) = &self.history {
            for epoch in &history.epochs {
                writeln!(
                    f,
                    "  epoch {:>3}  loss {:.4}  val_loss {:.4}",
                    epoch.epoch, epoch.train_loss, epoch.val_loss
                )?;
            }
            match history.best_epoch {
                Some(best) => writeln!(f, "Best epoch: {best}")?,
                None => writeln!(f, "No epoch improved validation loss")?,
            }
        }
        writeln!(f)?;
        write!(f, "{}", self.report)
    }
}

impl fmt::Display for FeaturesSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Encoder: {}  Dataset: {}", self.encoder, self.dataset)?;
        for split in &self.splits {
            writeln!(
                f,
                "  {:<6} {:>8} x {:<8} {}",
                split.split, split.rows, split.cols, split.cache_key
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for EnsembleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.features)?;
        if let Some(training) = &self.training {
            writeln!(f)?;
            for outcome in &training.outcomes {
                let status = match &outcome.error {
                    None => "fitted".to_string(),
                    Some(e) => format!("failed: {e}"),
                };
                writeln!(
                    f,
                    "  [{}] {} ({} ms) {status}",
                    outcome.index, outcome.description, outcome.duration_ms
                )?;
            }
        }
        for report in &self.reports {
            writeln!(f)?;
            write!(f, "{report}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CacheListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "No cached features in {}", self.directory);
        }
        writeln!(f, "{} cached entries in {}", self.entries.len(), self.directory)?;
        for entry in &self.entries {
            writeln!(f, "  {entry}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CacheCleared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Removed {} files from {}", self.removed_files, self.directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_listing_display() {
        let empty = CacheListing {
            directory: "data".into(),
            entries: vec![],
        };
        assert_eq!(empty.to_string(), "No cached features in data\n");

        let listing = CacheListing {
            directory: "data".into(),
            entries: vec!["train_small_hashing".into()],
        };
        let text = listing.to_string();
        assert!(text.starts_with("1 cached entries"));
        assert!(text.contains("  train_small_hashing"));
    }

    #[test]
    fn test_features_summary_json() {
        let summary = FeaturesSummary {
            encoder: "hashing".into(),
            dataset: "small".into(),
            splits: vec![SplitFeatures {
                split: "train".into(),
                cache_key: "train_small_hashing".into(),
                rows: 4,
                cols: 8,
            }],
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["splits"][0]["rows"], 4);
        assert!(summary.to_string().contains("train_small_hashing"));
    }
}
