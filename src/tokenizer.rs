//! Text tokenization feeding the encoder.
//!
//! A [`Tokenizer`] maps raw text to a [`TokenizedInput`] of token ids and an
//! attention mask. With [`Padding::MaxLength`] and truncation enabled every input
//! has exactly `max_length` positions, which keeps flattened encoder outputs at a
//! fixed width.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Result, SheafError};

/// Padding policy applied by the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    /// Pad every input to `max_length`.
    #[default]
    MaxLength,
    /// Leave inputs unpadded; batches are padded to their longest member.
    Longest,
}

/// Options for a tokenize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizeOptions {
    pub max_length: usize,
    pub padding: Padding,
    pub truncation: bool,
}

impl TokenizeOptions {
    /// Canonical form of the options, for cache keys.
    pub fn fingerprint(&self) -> String {
        let padding = match self.padding {
            Padding::MaxLength => "max_length",
            Padding::Longest => "longest",
        };
        format!(
            "max_length={},padding={padding},truncation={}",
            self.max_length, self.truncation
        )
    }
}

impl Default for TokenizeOptions {
    fn default() -> Self {
        TokenizeOptions {
            max_length: 100,
            padding: Padding::MaxLength,
            truncation: true,
        }
    }
}

/// Token ids plus the attention mask (1 = real token, 0 = padding).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenizedInput {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

impl TokenizedInput {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Number of non-padding positions.
    pub fn real_tokens(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m != 0).count()
    }

    fn pad_to(&mut self, length: usize, pad_id: u32) {
        if self.input_ids.len() < length {
            self.input_ids.resize(length, pad_id);
            self.attention_mask.resize(length, 0);
        }
    }
}

/// Converts text into token ids.
pub trait Tokenizer: Send + Sync {
    /// Tokenize a single text.
    fn tokenize(&self, text: &str, options: &TokenizeOptions) -> Result<TokenizedInput>;

    /// Id used for padding positions.
    fn pad_token_id(&self) -> u32 {
        0
    }

    /// Settings that change the produced ids, in a canonical form.
    fn fingerprint(&self) -> String {
        String::new()
    }

    /// Tokenize a batch and pad it to a common length.
    fn tokenize_batch(
        &self,
        texts: &[&str],
        options: &TokenizeOptions,
    ) -> Result<Vec<TokenizedInput>> {
        let inputs = texts
            .iter()
            .map(|text| self.tokenize(text, options))
            .collect::<Result<Vec<_>>>()?;
        Ok(pad_batch(inputs, self.pad_token_id()))
    }
}

/// Pad every input in the batch to the longest one.
pub fn pad_batch(mut inputs: Vec<TokenizedInput>, pad_id: u32) -> Vec<TokenizedInput> {
    let longest = inputs.iter().map(TokenizedInput::len).max().unwrap_or(0);
    for input in &mut inputs {
        input.pad_to(longest, pad_id);
    }
    inputs
}

/// Vocabulary-free tokenizer that hashes lowercase Unicode words into a fixed id space.
///
/// Ids `0..3` are reserved for `[PAD]`, `[CLS]` and `[SEP]`. The hash is CRC32,
/// so ids are stable across processes and platforms.
#[derive(Debug, Clone)]
pub struct HashingTokenizer {
    vocab_size: u32,
}

impl HashingTokenizer {
    pub const PAD_ID: u32 = 0;
    pub const CLS_ID: u32 = 1;
    pub const SEP_ID: u32 = 2;
    const RESERVED: u32 = 3;

    pub fn new(vocab_size: u32) -> Result<Self> {
        if vocab_size <= Self::RESERVED {
            return Err(SheafError::invalid_argument(format!(
                "vocab_size must exceed {}, got {vocab_size}",
                Self::RESERVED
            )));
        }
        Ok(HashingTokenizer { vocab_size })
    }

    pub fn vocab_size(&self) -> u32 {
        self.vocab_size
    }

    fn word_id(&self, word: &str) -> u32 {
        let hash = crc32fast::hash(word.to_lowercase().as_bytes());
        Self::RESERVED + hash % (self.vocab_size - Self::RESERVED)
    }
}

impl Default for HashingTokenizer {
    fn default() -> Self {
        HashingTokenizer { vocab_size: 30522 }
    }
}

impl Tokenizer for HashingTokenizer {
    fn tokenize(&self, text: &str, options: &TokenizeOptions) -> Result<TokenizedInput> {
        if options.max_length < 2 {
            return Err(SheafError::invalid_argument(
                "max_length must leave room for [CLS] and [SEP]",
            ));
        }

        let mut input_ids = vec![Self::CLS_ID];
        input_ids.extend(text.unicode_words().map(|word| self.word_id(word)));
        if options.truncation && input_ids.len() + 1 > options.max_length {
            input_ids.truncate(options.max_length - 1);
        }
        input_ids.push(Self::SEP_ID);

        let mut input = TokenizedInput {
            attention_mask: vec![1; input_ids.len()],
            input_ids,
        };
        if options.padding == Padding::MaxLength {
            input.pad_to(options.max_length, Self::PAD_ID);
        }
        Ok(input)
    }

    fn pad_token_id(&self) -> u32 {
        Self::PAD_ID
    }

    fn fingerprint(&self) -> String {
        format!("vocab_size={}", self.vocab_size)
    }
}
