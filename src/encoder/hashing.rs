//! Deterministic hashing encoder.
//!
//! Every token id is mapped to a fixed pseudo-random vector of `hidden_size`
//! values in `[-1, 1)`, seeded from the token id and the encoder seed. The output
//! mirrors a transformer's last hidden state: shape `[seq_len, hidden_size]`, with
//! padding positions set to zero.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::encoder::{Embedding, Encoder};
use crate::error::{Result, SheafError};
use crate::tokenizer::TokenizedInput;

/// An encoder without learned weights, used as the default and in tests.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    name: String,
    hidden_size: usize,
    seed: u64,
}

impl HashingEncoder {
    pub fn new<S: Into<String>>(name: S, hidden_size: usize, seed: u64) -> Result<Self> {
        if hidden_size == 0 {
            return Err(SheafError::model("hidden_size must be positive"));
        }
        Ok(HashingEncoder {
            name: name.into(),
            hidden_size,
            seed,
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn token_vector(&self, token_id: u32, out: &mut Vec<f32>) {
        let mut rng = StdRng::seed_from_u64(self.seed ^ (u64::from(token_id) << 17));
        out.extend((0..self.hidden_size).map(|_| rng.random_range(-1.0f32..1.0)));
    }
}

impl Encoder for HashingEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> String {
        format!("hidden_size={},seed={}", self.hidden_size, self.seed)
    }

    fn encode(&self, batch: &[TokenizedInput]) -> Result<Vec<Embedding>> {
        batch
            .iter()
            .map(|input| {
                if input.input_ids.len() != input.attention_mask.len() {
                    return Err(SheafError::extraction(format!(
                        "malformed batch: {} ids but {} mask entries",
                        input.input_ids.len(),
                        input.attention_mask.len()
                    )));
                }
                let mut values = Vec::with_capacity(input.len() * self.hidden_size);
                for (&id, &mask) in input.input_ids.iter().zip(&input.attention_mask) {
                    if mask == 0 {
                        values.resize(values.len() + self.hidden_size, 0.0);
                    } else {
                        self.token_vector(id, &mut values);
                    }
                }
                Embedding::new(vec![input.len(), self.hidden_size], values)
            })
            .collect()
    }
}
