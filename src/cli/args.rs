//! Command line argument parsing for the Sheaf CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::Paths;
use crate::dataset::Split;

/// Sheaf - encoder feature extraction, classifier ensembles and fine-tuning runs
#[derive(Parser, Debug, Clone)]
#[command(name = "sheaf")]
#[command(about = "Run text-classification experiments over pretrained encoders")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct SheafArgs {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only report errors (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Directory holding `{dataset}/{split}.jsonl` files
    #[arg(long, env = "SHEAF_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory receiving one subdirectory per run
    #[arg(long, env = "SHEAF_RESULTS_DIR", default_value = "results")]
    pub results_dir: PathBuf,

    /// Directory holding cached feature artifacts
    #[arg(long, env = "SHEAF_CACHE_DIR", default_value = "data")]
    pub cache_dir: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl SheafArgs {
    /// Effective verbosity: 0 = errors only, 1 = warnings (default), 2 = info, 3+ = debug.
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose.saturating_add(1)
        }
    }

    pub fn paths(&self) -> Paths {
        Paths {
            data_dir: self.data_dir.clone(),
            results_dir: self.results_dir.clone(),
            cache_dir: self.cache_dir.clone(),
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fine-tune a classifier on top of an encoder and evaluate it
    Finetune(FinetuneArgs),

    /// Extract (or load cached) encoder features for dataset splits
    Features(FeaturesArgs),

    /// Train and evaluate a classifier ensemble on encoder features
    Ensemble(EnsembleArgs),

    /// Inspect or clear the feature cache
    Cache(CacheArgs),
}

/// Arguments for a fine-tuning run
#[derive(Parser, Debug, Clone)]
pub struct FinetuneArgs {
    /// Parameter file (JSON)
    #[arg(short, long, value_name = "PARAMS_FILE")]
    pub params: PathBuf,

    /// Checkpoint to load before training or evaluation
    #[arg(short, long, value_name = "CHECKPOINT")]
    pub checkpoint: Option<PathBuf>,

    /// Dataset identifier overriding the parameter file
    #[arg(short, long, value_name = "DATASET")]
    pub dataset: Option<String>,

    /// Evaluate only
    #[arg(long)]
    pub skip_training: bool,
}

/// Arguments for feature extraction
#[derive(Parser, Debug, Clone)]
pub struct FeaturesArgs {
    /// Parameter file (JSON)
    #[arg(short, long, value_name = "PARAMS_FILE")]
    pub params: PathBuf,

    /// Dataset identifier overriding the parameter file
    #[arg(short, long, value_name = "DATASET")]
    pub dataset: Option<String>,

    /// Splits to extract (repeatable); defaults to train and test
    #[arg(short, long = "split", value_name = "SPLIT")]
    pub splits: Vec<Split>,
}

impl FeaturesArgs {
    pub fn splits(&self) -> Vec<Split> {
        if self.splits.is_empty() {
            vec![Split::Train, Split::Test]
        } else {
            self.splits.clone()
        }
    }
}

/// Arguments for an ensemble run
#[derive(Parser, Debug, Clone)]
pub struct EnsembleArgs {
    /// Parameter file (JSON)
    #[arg(short, long, value_name = "PARAMS_FILE")]
    pub params: PathBuf,

    /// Dataset identifier overriding the parameter file
    #[arg(short, long, value_name = "DATASET")]
    pub dataset: Option<String>,

    /// Only generate train and test features
    #[arg(long)]
    pub skip_training: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// List cached feature entries
    List,

    /// Delete every cached feature entry
    Clear(ClearArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ClearArgs {
    /// Confirm deletion
    #[arg(short, long)]
    pub yes: bool,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}
