//! Sharded feature extraction.
//!
//! [`ShardedExtractor`] partitions a split into a fixed number of shards,
//! feeds each shard through a [`BatchProducer`], and concatenates the per-shard
//! rows in shard order. The label vector is built from the same index order, so
//! row `i` always pairs with label `i`.
//!
//! # Shard policies
//!
//! | Policy | Shard `i` of `S` over `n` examples |
//! |--------|------------------------------------|
//! | [`ShardPolicy::Contiguous`] | the `i`-th contiguous block; the first `n % S` shards get one extra example |
//! | [`ShardPolicy::Strided`] | every index `j` with `j % S == i` |
//!
//! With the contiguous policy the output order equals the input order. With the
//! strided policy rows come out grouped by shard, and the labels follow them.
//!
//! # Example
//!
//! ```
//! use sheaf::dataset::Example;
//! use sheaf::encoder::hashing::HashingEncoder;
//! use sheaf::features::{EncoderBatchProducer, ExtractorConfig, ShardedExtractor};
//! use sheaf::tokenizer::{HashingTokenizer, TokenizeOptions};
//!
//! # fn main() -> sheaf::error::Result<()> {
//! let tokenizer = HashingTokenizer::default();
//! let encoder = HashingEncoder::new("hashing", 4, 0)?;
//! let options = TokenizeOptions { max_length: 8, ..Default::default() };
//! let producer = EncoderBatchProducer::new(&tokenizer, &encoder, options, 32)?;
//!
//! let examples = vec![Example::new("a", 0), Example::new("b", 1)];
//! let extractor = ShardedExtractor::new(ExtractorConfig::default())?;
//! let (features, labels) = extractor.extract(&examples, &producer)?;
//! assert_eq!(features.shape(), (2, 8 * 4));
//! assert_eq!(&labels[..], &[0, 1]);
//! # Ok(())
//! # }
//! ```

use std::ops::Range;

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::Example;
use crate::encoder::Encoder;
use crate::error::{Result, SheafError};
use crate::features::matrix::{FeatureMatrix, LabelVector};
use crate::tokenizer::{TokenizeOptions, Tokenizer};

/// How examples are assigned to shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardPolicy {
    #[default]
    Contiguous,
    Strided,
}

/// Produces one flattened feature row per example.
///
/// This is the seam between shard bookkeeping and whatever computes the
/// features; [`EncoderBatchProducer`] is the tokenizer + encoder implementation.
pub trait BatchProducer: Sync {
    fn produce(&self, examples: &[&Example]) -> Result<Vec<Vec<f32>>>;
}

/// Tokenizes examples and runs them through an encoder in fixed-size batches.
pub struct EncoderBatchProducer<'a, T: Tokenizer + ?Sized, E: Encoder + ?Sized> {
    tokenizer: &'a T,
    encoder: &'a E,
    options: TokenizeOptions,
    batch_size: usize,
}

impl<'a, T: Tokenizer + ?Sized, E: Encoder + ?Sized> EncoderBatchProducer<'a, T, E> {
    pub fn new(
        tokenizer: &'a T,
        encoder: &'a E,
        options: TokenizeOptions,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(SheafError::invalid_argument("batch_size must be positive"));
        }
        Ok(EncoderBatchProducer {
            tokenizer,
            encoder,
            options,
            batch_size,
        })
    }

    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }
}

impl<T: Tokenizer + ?Sized, E: Encoder + ?Sized> BatchProducer for EncoderBatchProducer<'_, T, E> {
    fn produce(&self, examples: &[&Example]) -> Result<Vec<Vec<f32>>> {
        let mut rows = Vec::with_capacity(examples.len());
        for batch in examples.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|e| e.text.as_str()).collect();
            let inputs = self.tokenizer.tokenize_batch(&texts, &self.options)?;
            let embeddings = self.encoder.encode(&inputs)?;
            if embeddings.len() != batch.len() {
                return Err(SheafError::extraction(format!(
                    "encoder '{}' returned {} embeddings for a batch of {}",
                    self.encoder.name(),
                    embeddings.len(),
                    batch.len()
                )));
            }
            rows.extend(embeddings.into_iter().map(|e| e.into_row()));
        }
        Ok(rows)
    }
}

/// Extractor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Number of shards the split is divided into.
    pub shards: usize,
    pub policy: ShardPolicy,
    /// Compute shards on the rayon pool. Output is identical to sequential mode.
    pub parallel: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            shards: 10,
            policy: ShardPolicy::Contiguous,
            parallel: false,
        }
    }
}

/// Drives a [`BatchProducer`] over a split shard by shard.
#[derive(Debug, Clone)]
pub struct ShardedExtractor {
    config: ExtractorConfig,
}

impl ShardedExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        if config.shards == 0 {
            return Err(SheafError::invalid_argument("shard count must be positive"));
        }
        Ok(ShardedExtractor { config })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract the feature matrix and label vector for `examples`.
    ///
    /// Fails as a whole if any shard fails; no partial output is returned.
    pub fn extract<P: BatchProducer + ?Sized>(
        &self,
        examples: &[Example],
        producer: &P,
    ) -> Result<(FeatureMatrix, LabelVector)> {
        let shards = shard_indices(examples.len(), self.config.shards, self.config.policy);
        let total = shards.len();
        info!(
            "extracting features for {} examples in {total} shards ({:?}{})",
            examples.len(),
            self.config.policy,
            if self.config.parallel { ", parallel" } else { "" }
        );

        let run_shard = |(i, indices): (usize, &Vec<usize>)| -> Result<Vec<Vec<f32>>> {
            if indices.is_empty() {
                return Ok(Vec::new());
            }
            debug!("shard {}/{total}: {} examples", i + 1, indices.len());
            let shard: Vec<&Example> = indices.iter().map(|&j| &examples[j]).collect();
            let rows = producer
                .produce(&shard)
                .map_err(|e| SheafError::extraction(format!("shard {}/{total}: {e}", i + 1)))?;
            if rows.len() != shard.len() {
                return Err(SheafError::extraction(format!(
                    "shard {}/{total}: produced {} rows for {} examples",
                    i + 1,
                    rows.len(),
                    shard.len()
                )));
            }
            Ok(rows)
        };

        let per_shard: Vec<Vec<Vec<f32>>> = if self.config.parallel {
            shards
                .par_iter()
                .enumerate()
                .map(run_shard)
                .collect::<Result<Vec<_>>>()?
        } else {
            shards
                .iter()
                .enumerate()
                .map(run_shard)
                .collect::<Result<Vec<_>>>()?
        };

        let matrix = FeatureMatrix::from_rows(per_shard.into_iter().flatten().collect())?;
        let labels: LabelVector = shards
            .iter()
            .flatten()
            .map(|&j| examples[j].label)
            .collect();

        info!("extracted feature matrix {:?}", matrix.shape());
        Ok((matrix, labels))
    }
}

/// Index range of contiguous shard `index` out of `shards` over `n` items.
///
/// A shard index outside `0..shards` (including any index when `shards` is
/// zero) owns no items.
pub fn contiguous_range(n: usize, shards: usize, index: usize) -> Range<usize> {
    if index >= shards {
        return n..n;
    }
    let base = n / shards;
    let extra = n % shards;
    let start = index * base + index.min(extra);
    let len = base + usize::from(index < extra);
    start..start + len
}

/// Example indices of every shard, in shard order. Zero shards yield no shards.
pub fn shard_indices(n: usize, shards: usize, policy: ShardPolicy) -> Vec<Vec<usize>> {
    match policy {
        ShardPolicy::Contiguous => (0..shards)
            .map(|i| contiguous_range(n, shards, i).collect())
            .collect(),
        ShardPolicy::Strided => (0..shards)
            .map(|i| (i..n).step_by(shards).collect())
            .collect(),
    }
}
