//! BERT encoder backed by HuggingFace Candle.
//!
//! Requires the `bert` feature. Weights, config and tokenizer are fetched from the
//! HuggingFace Hub (honouring `HF_HOME`) on construction.

use anyhow::{Context, anyhow};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::api::sync::ApiBuilder;
use log::info;

use crate::encoder::{Embedding, Encoder};
use crate::error::{Result, SheafError};
use crate::tokenizer::{Padding, TokenizeOptions, TokenizedInput, Tokenizer};

/// Files of a BERT checkpoint on the hub.
struct HubFiles {
    config: std::path::PathBuf,
    weights: std::path::PathBuf,
    tokenizer: std::path::PathBuf,
}

fn fetch(model_id: &str) -> anyhow::Result<HubFiles> {
    let cache_dir = std::env::var("HF_HOME")
        .or_else(|_| std::env::var("HOME").map(|home| format!("{home}/.cache/huggingface")))
        .unwrap_or_else(|_| "/tmp/huggingface".to_string());

    let api = ApiBuilder::new()
        .with_cache_dir(cache_dir.into())
        .build()
        .context("HF API initialization failed")?;
    let repo = api.model(model_id.to_string());

    Ok(HubFiles {
        config: repo.get("config.json").context("config download failed")?,
        weights: repo
            .get("model.safetensors")
            .context("weights download failed")?,
        tokenizer: repo
            .get("tokenizer.json")
            .context("tokenizer download failed")?,
    })
}

/// Encoder returning the last hidden state `[seq_len, hidden_size]` of a BERT model.
pub struct BertEncoder {
    model: BertModel,
    device: Device,
    model_id: String,
    hidden_size: usize,
}

impl std::fmt::Debug for BertEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertEncoder")
            .field("model_id", &self.model_id)
            .field("hidden_size", &self.hidden_size)
            .field("device", &self.device)
            .finish()
    }
}

impl BertEncoder {
    /// Load a BERT model and its tokenizer from the hub.
    pub fn from_pretrained(model_id: &str) -> Result<(Self, BertTokenizer)> {
        Self::load(model_id).map_err(|e| SheafError::model(format!("{model_id}: {e:#}")))
    }

    fn load(model_id: &str) -> anyhow::Result<(Self, BertTokenizer)> {
        let device = Device::cuda_if_available(0).context("device setup failed")?;
        let files = fetch(model_id)?;

        let config: Config = serde_json::from_str(
            &std::fs::read_to_string(&files.config).context("config read failed")?,
        )
        .context("config parse failed")?;
        let hidden_size = config.hidden_size;

        // SAFETY: the safetensors file is not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[files.weights], DType::F32, &device)
                .context("VarBuilder creation failed")?
        };
        let model = BertModel::load(vb, &config).context("model load failed")?;

        let tokenizer = tokenizers::Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("tokenizer load failed: {e}"))?;

        info!("loaded {model_id} (hidden size {hidden_size})");
        Ok((
            BertEncoder {
                model,
                device,
                model_id: model_id.to_string(),
                hidden_size,
            },
            BertTokenizer { inner: tokenizer },
        ))
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn forward(&self, batch: &[TokenizedInput]) -> anyhow::Result<Vec<Vec<Vec<f32>>>> {
        let seq_len = batch.iter().map(TokenizedInput::len).max().unwrap_or(0);
        if batch.iter().any(|input| input.len() != seq_len) {
            return Err(anyhow!("batch is not padded to a common length"));
        }

        let ids: Vec<u32> = batch.iter().flat_map(|i| i.input_ids.iter().copied()).collect();
        let mask: Vec<u32> = batch
            .iter()
            .flat_map(|i| i.attention_mask.iter().copied())
            .collect();

        let shape = (batch.len(), seq_len);
        let input_ids = Tensor::from_vec(ids, shape, &self.device)?;
        let attention_mask = Tensor::from_vec(mask, shape, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        Ok(hidden.to_dtype(DType::F32)?.to_vec3::<f32>()?)
    }
}

impl Encoder for BertEncoder {
    fn name(&self) -> &str {
        &self.model_id
    }

    fn encode(&self, batch: &[TokenizedInput]) -> Result<Vec<Embedding>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let hidden = self
            .forward(batch)
            .map_err(|e| SheafError::extraction(format!("{}: {e:#}", self.model_id)))?;

        hidden
            .into_iter()
            .map(|positions| {
                let seq_len = positions.len();
                let values: Vec<f32> = positions.into_iter().flatten().collect();
                Embedding::new(vec![seq_len, self.hidden_size], values)
            })
            .collect()
    }
}

/// WordPiece tokenizer shipped with a BERT checkpoint.
pub struct BertTokenizer {
    inner: tokenizers::Tokenizer,
}

impl Tokenizer for BertTokenizer {
    fn tokenize(&self, text: &str, options: &TokenizeOptions) -> Result<TokenizedInput> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| SheafError::extraction(format!("tokenization failed: {e}")))?;

        let mut input_ids = encoding.get_ids().to_vec();
        let mut attention_mask = encoding.get_attention_mask().to_vec();
        if options.truncation && input_ids.len() > options.max_length {
            // keep the trailing [SEP]
            let sep = input_ids.last().copied();
            input_ids.truncate(options.max_length);
            attention_mask.truncate(options.max_length);
            if let (Some(sep), Some(last)) = (sep, input_ids.last_mut()) {
                *last = sep;
            }
        }
        if options.padding == Padding::MaxLength && input_ids.len() < options.max_length {
            input_ids.resize(options.max_length, self.pad_token_id());
            attention_mask.resize(options.max_length, 0);
        }

        Ok(TokenizedInput {
            input_ids,
            attention_mask,
        })
    }

    fn pad_token_id(&self) -> u32 {
        self.inner
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| self.inner.token_to_id("[PAD]"))
            .unwrap_or(0)
    }
}
