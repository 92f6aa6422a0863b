//! Encoder feature extraction and caching.
//!
//! This module converts a split of labeled examples into a dense
//! [`FeatureMatrix`] and its paired [`LabelVector`]:
//!
//! - [`extractor`] drives a [`BatchProducer`](extractor::BatchProducer) over the
//!   split in fixed shards and concatenates the rows in a deterministic order
//! - [`cache`] persists matrix/label pairs on disk under a [`CacheKey`] so later
//!   runs skip extraction
//!
//! The pairing invariant holds everywhere: row `i` of the matrix belongs to
//! label `i` of the label vector.

pub mod artifact;
pub mod cache;
pub mod extractor;
pub mod key;
pub mod matrix;

pub use cache::FeatureCache;
pub use extractor::{
    BatchProducer, EncoderBatchProducer, ExtractorConfig, ShardPolicy, ShardedExtractor,
};
pub use key::CacheKey;
pub use matrix::{FeatureMatrix, LabelVector, MAX_CLASSES, ScoreMatrix};
