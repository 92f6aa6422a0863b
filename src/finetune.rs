//! Fine-tuning a sequence classifier on a labeled dataset.
//!
//! A [`FineTuneExperiment`] owns one run: it creates the run directory and
//! snapshots its parameters on construction, then trains with early stopping on
//! validation loss and evaluates on the test split.
//!
//! # Example
//!
//! ```no_run
//! use sheaf::config::{FineTuneConfig, Paths};
//! use sheaf::dataset::JsonlDatasetProvider;
//! use sheaf::finetune::FineTuneExperiment;
//!
//! # fn main() -> sheaf::error::Result<()> {
//! let config = FineTuneConfig::from_file("params.json")?;
//! let paths = Paths::default();
//! let mut experiment = FineTuneExperiment::from_config(config, paths.clone())?;
//! experiment.load_data(&JsonlDatasetProvider::new(&paths.data_dir))?;
//! experiment.train()?;
//! let report = experiment.evaluate()?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod model;

pub use model::{EncoderClassifier, SequenceClassifier};

use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::classifier::SoftmaxParams;
use crate::config::{FineTuneConfig, Paths};
use crate::dataset::{Dataset, DatasetProvider, Example, Split};
use crate::encoder;
use crate::error::{Result, SheafError};
use crate::evaluation::{EvaluationReport, Evaluator};
use crate::features::LabelVector;
use crate::features::cache::write_atomic;
use crate::run::{RunDirectory, RunId};

pub const CHECKPOINT_FILE: &str = "checkpoint.bin";

/// Losses recorded for one epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochStats>,
    /// 1-based epoch whose weights were kept.
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn best_val_loss(&self) -> Option<f64> {
        let best = self.best_epoch?;
        self.epochs.iter().find(|e| e.epoch == best).map(|e| e.val_loss)
    }
}

pub struct FineTuneExperiment<M: SequenceClassifier> {
    config: FineTuneConfig,
    paths: Paths,
    run_id: RunId,
    run_dir: RunDirectory,
    model: M,
    dataset: Option<Dataset>,
}

impl FineTuneExperiment<EncoderClassifier> {
    /// Build the experiment around the encoder named by `config.model_id`.
    pub fn from_config(config: FineTuneConfig, paths: Paths) -> Result<Self> {
        config.validate()?;
        let (tokenizer, encoder) =
            encoder::load(&config.model_id, config.hidden_size, config.seed)?;
        let head = SoftmaxParams {
            learning_rate: config.learning_rate,
            batch_size: config.batch_size,
            seed: config.seed,
            num_classes: Some(config.num_labels),
            ..Default::default()
        };
        let model = EncoderClassifier::new(
            tokenizer,
            encoder,
            config.tokenize_options(),
            config.batch_size,
            head,
        )?;
        Self::new(config, paths, model)
    }
}

impl<M: SequenceClassifier> FineTuneExperiment<M> {
    /// Validate the configuration, create the run directory, save the
    /// parameters and load the configured checkpoint, in that order.
    pub fn new(config: FineTuneConfig, paths: Paths, mut model: M) -> Result<Self> {
        config.validate()?;
        if !config.encoder_frozen() {
            warn!(
                "encoder freezing is disabled, but '{}' has no trainable encoder weights; only the head is trained",
                model.name()
            );
        }

        let run_id = RunId::new(&config.model_id, &config.dataset_id);
        let run_dir = RunDirectory::create(&paths.results_dir, &run_id)?;
        run_dir.save_params(&config)?;
        info!("Run {run_id} in {}", run_dir.path().display());

        if let Some(checkpoint) = &config.load_checkpoint_from {
            let bytes = fs::read(checkpoint).map_err(|e| {
                SheafError::model(format!("cannot read checkpoint {}: {e}", checkpoint.display()))
            })?;
            model.restore(&bytes)?;
            info!("Loaded checkpoint {}", checkpoint.display());
        }

        Ok(FineTuneExperiment {
            config,
            paths,
            run_id,
            run_dir,
            model,
            dataset: None,
        })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn run_dir(&self) -> &RunDirectory {
        &self.run_dir
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.run_dir.checkpoint_dir().join(CHECKPOINT_FILE)
    }

    /// Load the configured dataset and check its labels against `num_labels`.
    pub fn load_data<P: DatasetProvider + ?Sized>(&mut self, provider: &P) -> Result<()> {
        let dataset = provider.load(&self.config.dataset_id)?;
        let num_classes = dataset.num_classes();
        if num_classes > self.config.num_labels {
            return Err(SheafError::dataset(format!(
                "dataset '{}' has labels up to {} but num_labels is {}",
                dataset.id(),
                num_classes - 1,
                self.config.num_labels
            )));
        }
        self.dataset = Some(dataset);
        Ok(())
    }

    fn split(&self, split: Split) -> Result<&[Example]> {
        self.dataset
            .as_ref()
            .ok_or_else(|| SheafError::dataset("no dataset loaded; call load_data first"))?
            .split(split)
    }

    /// Train for up to `epochs`, stopping as soon as validation loss fails to
    /// improve. The weights of the best epoch are restored before returning.
    pub fn train(&mut self) -> Result<TrainingHistory> {
        let train = self.split(Split::Train)?.to_vec();
        let valid = self.split(Split::Validation)?.to_vec();
        if train.is_empty() || valid.is_empty() {
            return Err(SheafError::dataset("train and valid splits must not be empty"));
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut history = TrainingHistory::default();
        let mut best: Option<(f64, Vec<u8>)> = None;

        for epoch in 1..=self.config.epochs {
            let train_loss = self.model.train_epoch(&train, &mut rng)?;
            let val_loss = self.model.loss(&valid)?;
            info!(
                "Epoch {epoch}/{}: loss {train_loss:.4}, val_loss {val_loss:.4}",
                self.config.epochs
            );
            history.epochs.push(EpochStats {
                epoch,
                train_loss,
                val_loss,
            });

            let improved = best.as_ref().is_none_or(|(b, _)| val_loss < *b);
            if !improved || !val_loss.is_finite() {
                info!("val_loss did not improve; stopping after epoch {epoch}");
                history.stopped_early = epoch < self.config.epochs;
                break;
            }

            let snapshot = self.model.snapshot()?;
            if self.config.save_checkpoints {
                let path = self.checkpoint_path();
                write_atomic(&path, &snapshot).map_err(|e| {
                    SheafError::training(format!("failed to write checkpoint {}: {e}", path.display()))
                })?;
                info!("val_loss improved to {val_loss:.4}; saved {}", path.display());
            }
            best = Some((val_loss, snapshot));
            history.best_epoch = Some(epoch);
        }

        if let Some((val_loss, snapshot)) = &best {
            self.model.restore(snapshot)?;
            info!(
                "Restored weights from epoch {} (val_loss {val_loss:.4})",
                history.best_epoch.unwrap_or_default()
            );
        }
        Ok(history)
    }

    /// Score the model on the test split under this run's id.
    pub fn evaluate(&self) -> Result<EvaluationReport> {
        let test = self.split(Split::Test)?;
        let scores = self.model.predict_proba(test)?.widen_cols(self.config.num_labels);
        let labels: LabelVector = test.iter().map(|e| e.label).collect();
        Evaluator::new(&self.paths.results_dir).evaluate(
            &self.run_id,
            &scores,
            &labels,
            self.config.save_results,
        )
    }
}
