//! # Sheaf
//!
//! An experiment harness for text classification over pretrained encoders.
//!
//! ## Features
//!
//! - Sharded, order-preserving feature extraction with pluggable batch producers
//! - Checksummed on-disk feature cache keyed by encoder, dataset and split
//! - Ensembles of independently fitted classical classifiers
//! - Fine-tuning runs with early stopping and best-by-validation checkpoints
//! - Accuracy, per-class precision/recall/F1 and confusion matrices per run
//!
//! A deterministic hashing tokenizer and encoder make every flow runnable
//! offline; BERT checkpoints from the HuggingFace Hub are available with the
//! `bert` feature.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod finetune;
pub mod pipeline;
pub mod run;
pub mod tokenizer;

pub mod prelude {
    pub use crate::classifier::{Classifier, ClassifierSpec, EnsembleTrainer, FailurePolicy};
    pub use crate::config::{FeatureConfig, FineTuneConfig, Paths};
    pub use crate::dataset::{Dataset, DatasetProvider, Example, JsonlDatasetProvider, Split};
    pub use crate::encoder::Encoder;
    pub use crate::error::{Result, SheafError};
    pub use crate::evaluation::{EvaluationReport, Evaluator};
    pub use crate::features::{
        CacheKey, FeatureCache, FeatureMatrix, LabelVector, ScoreMatrix, ShardedExtractor,
    };
    pub use crate::finetune::FineTuneExperiment;
    pub use crate::pipeline::FeatureExperiment;
    pub use crate::run::RunId;
    pub use crate::tokenizer::Tokenizer;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
