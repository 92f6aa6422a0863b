//! Encoder features feeding an ensemble of classical classifiers.
//!
//! [`FeatureExperiment`] runs the feature flow end to end:
//!
//! 1. [`generate_features`](FeatureExperiment::generate_features) extracts a
//!    split through the sharded extractor, or loads it from the feature cache
//! 2. [`train`](FeatureExperiment::train) fits every configured classifier on
//!    the train features
//! 3. [`evaluate`](FeatureExperiment::evaluate) scores each fitted classifier on
//!    the test features under its own run id

use log::{info, warn};

use crate::classifier::{self, Classifier, EnsembleReport, EnsembleTrainer};
use crate::config::{FeatureConfig, Paths};
use crate::dataset::{Dataset, DatasetProvider, Split};
use crate::encoder::{self, Encoder};
use crate::error::{Result, SheafError};
use crate::evaluation::{EvaluationReport, Evaluator};
use crate::features::{
    CacheKey, EncoderBatchProducer, FeatureCache, FeatureMatrix, LabelVector, ShardedExtractor,
};
use crate::run::RunId;
use crate::tokenizer::Tokenizer;

pub struct FeatureExperiment {
    config: FeatureConfig,
    paths: Paths,
    tokenizer: Box<dyn Tokenizer>,
    encoder: Box<dyn Encoder>,
    extractor: ShardedExtractor,
    cache: FeatureCache,
    classifiers: Vec<Box<dyn Classifier>>,
    dataset: Option<Dataset>,
}

impl FeatureExperiment {
    /// Build the experiment around the encoder named by `config.encoder_id`.
    pub fn from_config(config: FeatureConfig, paths: Paths) -> Result<Self> {
        config.validate()?;
        let (tokenizer, encoder) =
            encoder::load(&config.encoder_id, config.hidden_size, config.seed)?;
        Self::new(config, paths, tokenizer, encoder)
    }

    pub fn new(
        config: FeatureConfig,
        paths: Paths,
        tokenizer: Box<dyn Tokenizer>,
        encoder: Box<dyn Encoder>,
    ) -> Result<Self> {
        config.validate()?;
        let extractor = ShardedExtractor::new(config.extractor_config())?;
        let cache = FeatureCache::new(&paths.cache_dir)?;
        let classifiers = classifier::build_all(&config.classifiers);
        Ok(FeatureExperiment {
            config,
            paths,
            tokenizer,
            encoder,
            extractor,
            cache,
            classifiers,
            dataset: None,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }

    pub fn cache(&self) -> &FeatureCache {
        &self.cache
    }

    pub fn classifiers(&self) -> &[Box<dyn Classifier>] {
        &self.classifiers
    }

    /// Load the configured dataset and check its labels against the class limit.
    pub fn load_data<P: DatasetProvider + ?Sized>(&mut self, provider: &P) -> Result<()> {
        let dataset = provider.load(&self.config.dataset_id)?;
        let limit = self.config.class_limit();
        if dataset.num_classes() > limit {
            return Err(SheafError::dataset(format!(
                "dataset '{}' has labels up to {} but at most {limit} classes are allowed",
                dataset.id(),
                dataset.num_classes() - 1
            )));
        }
        self.dataset = Some(dataset);
        Ok(())
    }

    /// Cache key of a split's features under this experiment's encoder,
    /// dataset and extraction settings.
    pub fn cache_key(&self, split: Split) -> CacheKey {
        let params = format!(
            "{};tokenizer[{}];encoder[{}]",
            self.config.tokenize_options().fingerprint(),
            self.tokenizer.fingerprint(),
            self.encoder.fingerprint()
        );
        CacheKey::new(self.encoder.name(), &self.config.dataset_id, split).with_params(params)
    }

    /// Feature matrix and labels of `split`, from the cache when present.
    pub fn generate_features(&self, split: Split) -> Result<(FeatureMatrix, LabelVector)> {
        let compute = || self.compute_features(split);
        if !self.config.use_cache {
            return compute();
        }

        let key = self.cache_key(split);
        if self.cache.contains(&key) {
            info!("Loading cached features for {key}");
        }
        self.cache.get_or_compute(&key, compute)
    }

    fn compute_features(&self, split: Split) -> Result<(FeatureMatrix, LabelVector)> {
        let examples = self
            .dataset
            .as_ref()
            .ok_or_else(|| SheafError::dataset("no dataset loaded; call load_data first"))?
            .split(split)?;
        info!("Computing {split} features with '{}'", self.encoder.name());

        let producer = EncoderBatchProducer::new(
            self.tokenizer.as_ref(),
            self.encoder.as_ref(),
            self.config.tokenize_options(),
            self.config.batch_size,
        )?;
        self.extractor.extract(examples, &producer)
    }

    /// Fit every configured classifier on the train features.
    pub fn train(&mut self) -> Result<EnsembleReport> {
        let (x, y) = self.generate_features(Split::Train)?;
        let trainer = EnsembleTrainer::new(self.config.failure_policy);
        let report = trainer.fit_all(&mut self.classifiers, &x, &y)?;
        info!(
            "Fitted {}/{} classifiers",
            report.fitted(),
            report.outcomes.len()
        );
        Ok(report)
    }

    /// Evaluate every fitted classifier on the test features.
    ///
    /// Each classifier gets a run id built from its name and position in the
    /// configuration. Unfitted classifiers are skipped.
    pub fn evaluate(&self) -> Result<Vec<EvaluationReport>> {
        if !self.classifiers.iter().any(|c| c.is_fitted()) {
            return Err(SheafError::training("no fitted classifiers to evaluate"));
        }

        let (x, y) = self.generate_features(Split::Test)?;
        // classes missing from the train split still get a score column
        let n_classes = self.dataset.as_ref().map_or(0, Dataset::num_classes);
        let evaluator = Evaluator::new(&self.paths.results_dir);
        let mut reports = Vec::new();
        for (index, classifier) in self.classifiers.iter().enumerate() {
            if !classifier.is_fitted() {
                warn!("Skipping unfitted classifier {index} ({})", classifier.name());
                continue;
            }
            let run_id = RunId::new(
                format!("{}-{index}", classifier.name()),
                &self.config.dataset_id,
            );
            let scores = classifier.predict_proba(&x)?.widen_cols(n_classes);
            reports.push(evaluator.evaluate(&run_id, &scores, &y, self.config.save_results)?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassifierSpec, SoftmaxParams};
    use crate::dataset::{Example, InMemoryDatasetProvider};
    use tempfile::TempDir;

    fn provider() -> InMemoryDatasetProvider {
        let mut provider = InMemoryDatasetProvider::new();
        let train = vec![
            Example::new("apple banana", 0),
            Example::new("Apple Banana", 0),
            Example::new("car truck", 1),
            Example::new("Car Truck", 1),
        ];
        let test = vec![Example::new("apple banana", 0), Example::new("car truck", 1)];
        provider.insert(
            Dataset::new("fruit")
                .with_split(Split::Train, train)
                .with_split(Split::Test, test),
        );
        provider
    }

    fn experiment(temp_dir: &TempDir, config: FeatureConfig) -> FeatureExperiment {
        let paths = Paths {
            data_dir: temp_dir.path().join("data"),
            results_dir: temp_dir.path().join("results"),
            cache_dir: temp_dir.path().join("cache"),
        };
        let mut experiment = FeatureExperiment::from_config(config, paths).unwrap();
        experiment.load_data(&provider()).unwrap();
        experiment
    }

    fn config() -> FeatureConfig {
        FeatureConfig {
            encoder_id: "hashing".into(),
            dataset_id: "fruit".into(),
            shards: 3,
            max_length: 4,
            hidden_size: 8,
            classifiers: vec![
                ClassifierSpec::NearestCentroid,
                ClassifierSpec::SoftmaxRegression(SoftmaxParams {
                    learning_rate: 0.5,
                    epochs: 50,
                    ..Default::default()
                }),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_generate_features_populates_cache() {
        let temp_dir = TempDir::new().unwrap();
        let experiment = experiment(&temp_dir, config());

        let key = experiment.cache_key(Split::Train);
        assert!(!experiment.cache().contains(&key));

        let (x, y) = experiment.generate_features(Split::Train).unwrap();
        assert_eq!(x.shape(), (4, 4 * 8));
        assert_eq!(&y[..], &[0, 0, 1, 1]);
        assert!(experiment.cache().contains(&key));
        assert_eq!(experiment.cache().entries().unwrap(), vec![key.stem()]);
    }

    #[test]
    fn test_cache_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let experiment = experiment(
            &temp_dir,
            FeatureConfig {
                use_cache: false,
                ..config()
            },
        );
        experiment.generate_features(Split::Test).unwrap();
        assert!(experiment.cache().entries().unwrap().is_empty());
    }

    #[test]
    fn test_train_and_evaluate_each_classifier() {
        let temp_dir = TempDir::new().unwrap();
        let mut experiment = experiment(&temp_dir, config());

        assert!(experiment.evaluate().is_err());

        let report = experiment.train().unwrap();
        assert!(report.all_fitted());

        let reports = experiment.evaluate().unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].run_id.starts_with("nearest-centroid-0_fruit_"));
        assert!(reports[1].run_id.starts_with("softmax-regression-1_fruit_"));
        assert_eq!(reports[0].accuracy, 1.0);

        let saved = std::fs::read_dir(temp_dir.path().join("results")).unwrap().count();
        assert_eq!(saved, 2);
    }

    #[test]
    fn test_changed_extraction_settings_recompute_features() {
        let temp_dir = TempDir::new().unwrap();
        let short = experiment(&temp_dir, config());
        assert_eq!(short.generate_features(Split::Train).unwrap().0.shape(), (4, 4 * 8));

        let long = experiment(
            &temp_dir,
            FeatureConfig {
                max_length: 8,
                hidden_size: 16,
                ..config()
            },
        );
        assert_ne!(short.cache_key(Split::Train), long.cache_key(Split::Train));
        assert_eq!(long.generate_features(Split::Train).unwrap().0.shape(), (4, 8 * 16));

        let reseeded = experiment(&temp_dir, FeatureConfig { seed: 7, ..config() });
        let (x, _) = reseeded.generate_features(Split::Train).unwrap();
        assert_eq!(x.shape(), (4, 4 * 8));
        assert_ne!(x, short.generate_features(Split::Train).unwrap().0);
    }

    #[test]
    fn test_test_only_class_is_scored() {
        let temp_dir = TempDir::new().unwrap();
        let mut provider = InMemoryDatasetProvider::new();
        provider.insert(
            Dataset::new("fruit")
                .with_split(
                    Split::Train,
                    vec![Example::new("apple", 0), Example::new("car", 1)],
                )
                .with_split(
                    Split::Test,
                    vec![Example::new("apple", 0), Example::new("boat", 2)],
                ),
        );
        let paths = Paths {
            data_dir: temp_dir.path().join("data"),
            results_dir: temp_dir.path().join("results"),
            cache_dir: temp_dir.path().join("cache"),
        };
        let mut experiment = FeatureExperiment::from_config(
            FeatureConfig {
                classifiers: vec![ClassifierSpec::NearestCentroid],
                save_results: false,
                ..config()
            },
            paths,
        )
        .unwrap();
        experiment.load_data(&provider).unwrap();
        experiment.train().unwrap();

        let reports = experiment.evaluate().unwrap();
        assert_eq!(reports[0].n_classes, 3);
        assert_eq!(reports[0].per_class[2].support, 1);
    }

    #[test]
    fn test_class_limit_enforced_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths {
            data_dir: temp_dir.path().join("data"),
            results_dir: temp_dir.path().join("results"),
            cache_dir: temp_dir.path().join("cache"),
        };
        let mut experiment = FeatureExperiment::from_config(
            FeatureConfig {
                num_labels: Some(2),
                ..config()
            },
            paths,
        )
        .unwrap();
        let mut bad_provider = InMemoryDatasetProvider::new();
        bad_provider.insert(
            Dataset::new("fruit").with_split(Split::Train, vec![Example::new("boat", 2)]),
        );
        assert!(matches!(
            experiment.load_data(&bad_provider),
            Err(SheafError::Dataset(_))
        ));
        // the fruit fixture has two classes
        experiment.load_data(&provider()).unwrap();
    }

    #[test]
    fn test_missing_split() {
        let temp_dir = TempDir::new().unwrap();
        let experiment = experiment(&temp_dir, config());
        assert!(matches!(
            experiment.generate_features(Split::Validation),
            Err(SheafError::Dataset(_))
        ));
    }
}
