//! Command implementations for the Sheaf CLI.

use std::path::Path;

use log::info;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::{FeatureConfig, FineTuneConfig};
use crate::dataset::{JsonlDatasetProvider, Split};
use crate::error::{Result, SheafError};
use crate::features::FeatureCache;
use crate::finetune::FineTuneExperiment;
use crate::pipeline::FeatureExperiment;

/// Execute a CLI command.
pub fn execute_command(args: SheafArgs) -> Result<()> {
    match &args.command {
        Command::Finetune(finetune_args) => run_finetune(finetune_args, &args),
        Command::Features(features_args) => run_features(features_args, &args),
        Command::Ensemble(ensemble_args) => run_ensemble(ensemble_args, &args),
        Command::Cache(cache_args) => match &cache_args.action {
            CacheCommand::List => list_cache(&args),
            CacheCommand::Clear(clear_args) => clear_cache(clear_args, &args),
        },
    }
}

/// Fine-tune (unless skipped) and evaluate on the test split.
fn run_finetune(args: &FinetuneArgs, cli_args: &SheafArgs) -> Result<()> {
    let mut config = FineTuneConfig::from_file(&args.params)?;
    if let Some(checkpoint) = &args.checkpoint {
        config.load_checkpoint_from = Some(checkpoint.clone());
    }
    if let Some(dataset) = &args.dataset {
        config.dataset_id = dataset.clone();
    }
    if args.skip_training && config.load_checkpoint_from.is_none() {
        return Err(SheafError::config(
            "--skip-training needs a checkpoint (--checkpoint or load_checkpoint_from)",
        ));
    }

    let paths = cli_args.paths();
    let mut experiment = FineTuneExperiment::from_config(config, paths.clone())?;
    experiment.load_data(&JsonlDatasetProvider::new(&paths.data_dir))?;

    let history = if args.skip_training {
        info!("Skipping training");
        None
    } else {
        Some(experiment.train()?)
    };
    let report = experiment.evaluate()?;

    output_result(
        "Fine-tuning run complete",
        &FinetuneSummary {
            run_id: experiment.run_id().to_string(),
            run_dir: experiment.run_dir().path().display().to_string(),
            history,
            report,
        },
        cli_args,
    )
}

fn load_feature_experiment(
    params: &Path,
    dataset: Option<&str>,
    cli_args: &SheafArgs,
) -> Result<FeatureExperiment> {
    let mut config = FeatureConfig::from_file(params)?;
    if let Some(dataset) = dataset {
        config.dataset_id = dataset.to_string();
    }
    let paths = cli_args.paths();
    let mut experiment = FeatureExperiment::from_config(config, paths.clone())?;
    experiment.load_data(&JsonlDatasetProvider::new(&paths.data_dir))?;
    Ok(experiment)
}

fn generate_splits(experiment: &FeatureExperiment, splits: &[Split]) -> Result<FeaturesSummary> {
    let mut summary = FeaturesSummary {
        encoder: experiment.encoder_name().to_string(),
        dataset: experiment.config().dataset_id.clone(),
        splits: Vec::with_capacity(splits.len()),
    };
    for &split in splits {
        let (matrix, _) = experiment.generate_features(split)?;
        summary.splits.push(SplitFeatures {
            split: split.to_string(),
            cache_key: experiment.cache_key(split).stem(),
            rows: matrix.rows(),
            cols: matrix.cols(),
        });
    }
    Ok(summary)
}

/// Extract or load the requested splits.
fn run_features(args: &FeaturesArgs, cli_args: &SheafArgs) -> Result<()> {
    let experiment = load_feature_experiment(&args.params, args.dataset.as_deref(), cli_args)?;
    let summary = generate_splits(&experiment, &args.splits())?;
    output_result("Features ready", &summary, cli_args)
}

/// Generate features, then fit and evaluate the configured classifiers.
fn run_ensemble(args: &EnsembleArgs, cli_args: &SheafArgs) -> Result<()> {
    let mut experiment = load_feature_experiment(&args.params, args.dataset.as_deref(), cli_args)?;
    let features = generate_splits(&experiment, &[Split::Train, Split::Test])?;

    let (training, reports) = if args.skip_training {
        info!("Skipping training");
        (None, Vec::new())
    } else {
        let training = experiment.train()?;
        (Some(training), experiment.evaluate()?)
    };

    output_result(
        "Ensemble run complete",
        &EnsembleSummary {
            features,
            training,
            reports,
        },
        cli_args,
    )
}

fn list_cache(cli_args: &SheafArgs) -> Result<()> {
    let cache = FeatureCache::new(&cli_args.cache_dir)?;
    output_result(
        "Feature cache",
        &CacheListing {
            directory: cache.directory().display().to_string(),
            entries: cache.entries()?,
        },
        cli_args,
    )
}

fn clear_cache(args: &ClearArgs, cli_args: &SheafArgs) -> Result<()> {
    if !args.yes {
        return Err(SheafError::invalid_argument(
            "refusing to clear the feature cache without --yes",
        ));
    }
    let cache = FeatureCache::new(&cli_args.cache_dir)?;
    let removed_files = cache.clear()?;
    output_result(
        "Feature cache cleared",
        &CacheCleared {
            directory: cache.directory().display().to_string(),
            removed_files,
        },
        cli_args,
    )
}
