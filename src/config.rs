//! Experiment configuration.
//!
//! Parameter files are JSON. Every setting lives in an explicit value handed to
//! the experiment that uses it; there is no process-wide configuration.
//!
//! ```json
//! {
//!   "model_id": "emilyalsentzer/Bio_ClinicalBERT",
//!   "dataset_id": "small",
//!   "batch_size": 32,
//!   "learning_rate": 0.05,
//!   "freeze_bert": true,
//!   "epochs": 3
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::classifier::{ClassifierSpec, FailurePolicy};
use crate::error::{Result, SheafError};
use crate::features::{ExtractorConfig, MAX_CLASSES, ShardPolicy};
use crate::tokenizer::{Padding, TokenizeOptions};

/// Directories shared by all experiments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paths {
    /// Root of the JSONL datasets.
    pub data_dir: PathBuf,
    /// Per-run output directories.
    pub results_dir: PathBuf,
    /// Feature cache artifacts.
    pub cache_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Paths {
            data_dir: PathBuf::from("data"),
            results_dir: PathBuf::from("results"),
            cache_dir: PathBuf::from("data"),
        }
    }
}

/// Parameters of a fine-tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FineTuneConfig {
    pub model_id: String,
    pub dataset_id: String,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// Keep the encoder weights fixed and train only the classification head.
    #[serde(alias = "freeze_bert")]
    pub freeze_encoder: bool,
    /// Older parameter files carry this next to `freeze_bert`; both must hold
    /// for the encoder to count as frozen.
    pub freeze_bert_encoder: Option<bool>,
    /// Checkpoint to initialise the model from.
    pub load_checkpoint_from: Option<PathBuf>,
    /// Snapshot weights whenever validation loss improves.
    pub save_checkpoints: bool,
    pub epochs: usize,
    pub save_results: bool,
    pub num_labels: usize,
    pub max_length: usize,
    /// Width of the built-in hashing encoder; ignored by pretrained encoders.
    pub hidden_size: usize,
    pub seed: u64,
}

impl Default for FineTuneConfig {
    fn default() -> Self {
        FineTuneConfig {
            model_id: String::new(),
            dataset_id: String::new(),
            batch_size: 32,
            learning_rate: 0.05,
            freeze_encoder: true,
            freeze_bert_encoder: None,
            load_checkpoint_from: None,
            save_checkpoints: true,
            epochs: 3,
            save_results: true,
            num_labels: 5,
            max_length: 100,
            hidden_size: 32,
            seed: 42,
        }
    }
}

impl FineTuneConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_json(path.as_ref())
    }

    pub fn validate(&self) -> Result<()> {
        require_id("model_id", &self.model_id)?;
        require_id("dataset_id", &self.dataset_id)?;
        require_positive("batch_size", self.batch_size)?;
        require_positive("epochs", self.epochs)?;
        require_positive("max_length", self.max_length)?;
        require_positive("hidden_size", self.hidden_size)?;
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(SheafError::config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        check_num_labels(self.num_labels)
    }

    /// Whether every freeze flag in the file asks for a frozen encoder.
    pub fn encoder_frozen(&self) -> bool {
        self.freeze_encoder && self.freeze_bert_encoder.unwrap_or(true)
    }

    pub fn tokenize_options(&self) -> TokenizeOptions {
        TokenizeOptions {
            max_length: self.max_length,
            padding: Padding::MaxLength,
            truncation: true,
        }
    }
}

/// Parameters of a feature-extraction + classifier-ensemble run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    #[serde(alias = "model_id")]
    pub encoder_id: String,
    pub dataset_id: String,
    pub shards: usize,
    pub batch_size: usize,
    pub max_length: usize,
    /// Width of the built-in hashing encoder; ignored by pretrained encoders.
    pub hidden_size: usize,
    pub shard_policy: ShardPolicy,
    pub parallel: bool,
    pub use_cache: bool,
    pub failure_policy: FailurePolicy,
    pub save_results: bool,
    pub classifiers: Vec<ClassifierSpec>,
    /// Upper bound on the dataset's class count; unset means [`MAX_CLASSES`].
    pub num_labels: Option<usize>,
    pub seed: u64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            encoder_id: String::new(),
            dataset_id: String::new(),
            shards: 10,
            batch_size: 32,
            max_length: 100,
            hidden_size: 32,
            shard_policy: ShardPolicy::Contiguous,
            parallel: false,
            use_cache: true,
            failure_policy: FailurePolicy::FailFast,
            save_results: true,
            classifiers: vec![ClassifierSpec::NearestCentroid],
            num_labels: None,
            seed: 42,
        }
    }
}

impl FeatureConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_json(path.as_ref())
    }

    pub fn validate(&self) -> Result<()> {
        require_id("encoder_id", &self.encoder_id)?;
        require_id("dataset_id", &self.dataset_id)?;
        require_positive("shards", self.shards)?;
        require_positive("batch_size", self.batch_size)?;
        require_positive("max_length", self.max_length)?;
        require_positive("hidden_size", self.hidden_size)?;
        if let Some(num_labels) = self.num_labels {
            check_num_labels(num_labels)?;
        }
        Ok(())
    }

    /// Largest class count a dataset may have for this run.
    pub fn class_limit(&self) -> usize {
        self.num_labels.unwrap_or(MAX_CLASSES)
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            shards: self.shards,
            policy: self.shard_policy,
            parallel: self.parallel,
        }
    }

    pub fn tokenize_options(&self) -> TokenizeOptions {
        TokenizeOptions {
            max_length: self.max_length,
            padding: Padding::MaxLength,
            truncation: true,
        }
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        SheafError::config(format!("cannot read params file {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| SheafError::config(format!("malformed params file {}: {e}", path.display())))
}

fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SheafError::config(format!("{field} is required")));
    }
    Ok(())
}

fn require_positive(field: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(SheafError::config(format!("{field} must be positive")));
    }
    Ok(())
}

fn check_num_labels(num_labels: usize) -> Result<()> {
    if !(2..=MAX_CLASSES).contains(&num_labels) {
        return Err(SheafError::config(format!(
            "num_labels must be between 2 and {MAX_CLASSES}, got {num_labels}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_finetune_config_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("params.json");
        fs::write(
            &path,
            r#"{"model_id": "emilyalsentzer/Bio_ClinicalBERT", "dataset_id": "small",
                "batch_size": 8, "learning_rate": 2e-5, "freeze_bert": false, "epochs": 2}"#,
        )
        .unwrap();

        let config = FineTuneConfig::from_file(&path).unwrap();
        assert_eq!(config.batch_size, 8);
        assert!(!config.freeze_encoder);
        assert_eq!(config.num_labels, 5);
        assert_eq!(config.max_length, 100);
        assert_eq!(config.seed, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_finetune_validation() {
        let valid = FineTuneConfig {
            model_id: "hashing".into(),
            dataset_id: "tiny".into(),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());
        assert!(FineTuneConfig::default().validate().is_err());

        let bad_lr = FineTuneConfig {
            learning_rate: f32::NAN,
            ..valid.clone()
        };
        assert!(bad_lr.validate().is_err());

        let one_label = FineTuneConfig {
            num_labels: 1,
            ..valid.clone()
        };
        assert!(one_label.validate().is_err());

        let too_many = FineTuneConfig {
            num_labels: MAX_CLASSES + 1,
            ..valid.clone()
        };
        assert!(too_many.validate().is_err());

        let no_epochs = FineTuneConfig { epochs: 0, ..valid };
        let err = no_epochs.validate().unwrap_err();
        assert!(matches!(err, SheafError::Config(_)));
    }

    #[test]
    fn test_feature_config_defaults_and_classifiers() {
        let config: FeatureConfig = serde_json::from_str(
            r#"{"model_id": "hashing", "dataset_id": "tiny", "shard_policy": "strided",
                "classifiers": [{"type": "softmax_regression", "epochs": 5}]}"#,
        )
        .unwrap();
        assert_eq!(config.encoder_id, "hashing");
        assert_eq!(config.shards, 10);
        assert!(config.use_cache);
        assert_eq!(config.extractor_config().policy, ShardPolicy::Strided);
        assert_eq!(config.classifiers.len(), 1);
        assert!(config.validate().is_ok());

        assert_eq!(config.class_limit(), MAX_CLASSES);

        let bounded = FeatureConfig {
            num_labels: Some(3),
            ..config.clone()
        };
        assert_eq!(bounded.class_limit(), 3);
        let unbounded = FeatureConfig {
            num_labels: Some(usize::MAX),
            ..config.clone()
        };
        assert!(unbounded.validate().is_err());

        let no_shards = FeatureConfig { shards: 0, ..config };
        assert!(no_shards.validate().is_err());
    }

    #[test]
    fn test_legacy_freeze_flag_is_read() {
        let config: FineTuneConfig = serde_json::from_str(
            r#"{"model_id": "hashing", "dataset_id": "tiny",
                "freeze_bert": true, "freeze_bert_encoder": false}"#,
        )
        .unwrap();
        assert!(config.freeze_encoder);
        assert_eq!(config.freeze_bert_encoder, Some(false));
        assert!(!config.encoder_frozen());

        let plain: FineTuneConfig =
            serde_json::from_str(r#"{"model_id": "hashing", "dataset_id": "tiny"}"#).unwrap();
        assert!(plain.encoder_frozen());
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let temp_dir = TempDir::new().unwrap();
        let missing = FineTuneConfig::from_file(temp_dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, SheafError::Config(_)));

        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            FeatureConfig::from_file(&path).unwrap_err(),
            SheafError::Config(_)
        ));
    }
}
