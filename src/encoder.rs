//! Pretrained sequence encoders.
//!
//! An [`Encoder`] maps a batch of tokenized inputs to one [`Embedding`] per
//! example. Embeddings may be multi-dimensional (for a transformer, the last
//! hidden state is `[seq_len, hidden_size]`); callers flatten them into a single
//! feature row with [`Embedding::into_row`].
//!
//! # Implementations
//!
//! - [`hashing::HashingEncoder`] - deterministic, dependency-free encoder used by
//!   default and in tests
//! - `bert::BertEncoder` - BERT checkpoints from the HuggingFace Hub via candle
//!   (requires the `bert` feature)

pub mod hashing;

#[cfg(feature = "bert")]
pub mod bert;

use log::info;

use crate::error::{Result, SheafError};
use crate::tokenizer::{HashingTokenizer, TokenizedInput, Tokenizer};

/// Model identifiers starting with this prefix select the built-in hashing encoder.
pub const HASHING_PREFIX: &str = "hashing";

/// Per-example encoder output.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    shape: Vec<usize>,
    values: Vec<f32>,
}

impl Embedding {
    /// Create an embedding, checking that `values` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(SheafError::extraction(format!(
                "embedding shape {shape:?} needs {expected} values, got {}",
                values.len()
            )));
        }
        Ok(Embedding { shape, values })
    }

    /// A one-dimensional embedding.
    pub fn from_vec(values: Vec<f32>) -> Self {
        Embedding {
            shape: vec![values.len()],
            values,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Flattened length.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Flatten (row-major) into a single feature row.
    pub fn into_row(self) -> Vec<f32> {
        self.values
    }
}

/// Trait for pretrained sequence encoders.
pub trait Encoder: Send + Sync {
    /// Identifier of the encoder, e.g. a HuggingFace model id.
    fn name(&self) -> &str;

    /// Settings beyond [`name`](Self::name) that change the output, in a
    /// canonical form.
    ///
    /// Name and fingerprint together key the feature cache, so two encoders
    /// agreeing on both must produce the same features.
    fn fingerprint(&self) -> String {
        String::new()
    }

    /// Encode a batch, returning exactly one embedding per input.
    fn encode(&self, batch: &[TokenizedInput]) -> Result<Vec<Embedding>>;
}

impl<E: Encoder + ?Sized> Encoder for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fingerprint(&self) -> String {
        (**self).fingerprint()
    }

    fn encode(&self, batch: &[TokenizedInput]) -> Result<Vec<Embedding>> {
        (**self).encode(batch)
    }
}

impl<E: Encoder + ?Sized> Encoder for std::sync::Arc<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fingerprint(&self) -> String {
        (**self).fingerprint()
    }

    fn encode(&self, batch: &[TokenizedInput]) -> Result<Vec<Embedding>> {
        (**self).encode(batch)
    }
}

/// Short form of a model identifier: the last `/`-separated segment.
///
/// `"emilyalsentzer/Bio_ClinicalBERT"` becomes `"Bio_ClinicalBERT"`.
pub fn short_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}

/// A tokenizer and encoder pair ready for extraction.
pub type EncoderPair = (Box<dyn Tokenizer>, Box<dyn Encoder>);

/// Resolve a model identifier to a tokenizer and encoder.
///
/// Identifiers starting with `hashing` use the built-in [`hashing::HashingEncoder`]
/// with the given `hidden_size`. Anything else is loaded from the HuggingFace
/// Hub, which needs the `bert` feature.
pub fn load(model_id: &str, hidden_size: usize, seed: u64) -> Result<EncoderPair> {
    if model_id.starts_with(HASHING_PREFIX) {
        info!("Using built-in hashing encoder '{model_id}' (hidden size {hidden_size})");
        let encoder = hashing::HashingEncoder::new(model_id, hidden_size, seed)?;
        return Ok((Box::new(HashingTokenizer::default()), Box::new(encoder)));
    }
    load_pretrained(model_id)
}

#[cfg(feature = "bert")]
fn load_pretrained(model_id: &str) -> Result<EncoderPair> {
    info!("Loading pretrained encoder '{model_id}'");
    let (encoder, tokenizer) = bert::BertEncoder::from_pretrained(model_id)?;
    Ok((Box::new(tokenizer), Box::new(encoder)))
}

#[cfg(not(feature = "bert"))]
fn load_pretrained(model_id: &str) -> Result<EncoderPair> {
    Err(SheafError::model(format!(
        "encoder '{model_id}' is not built in; rebuild with the `bert` feature to load it"
    )))
}
