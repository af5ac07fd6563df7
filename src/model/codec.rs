//! Adapters from the tokenizer and candle model to the crate's traits

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::qwen2::{Config as Qwen2Config, ModelForCausalLM};
use tokenizers::Tokenizer;

use super::device::Placement;
use super::{inference_err, load_err};
use crate::decode::TextCodec;
use crate::error::{Result, SomniaError};
use crate::generate::GenerativeModel;

/// `tokenizer.json` tokenizer
pub struct TokenizerCodec {
    tokenizer: Tokenizer,
}

impl std::fmt::Debug for TokenizerCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerCodec")
            .field("vocab_size", &self.tokenizer.get_vocab_size(true))
            .finish()
    }
}

impl TokenizerCodec {
    /// Load from a `tokenizer.json` file
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::ModelLoad`] if the file cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| SomniaError::ModelLoad {
            reason: format!("Failed to load tokenizer from {}: {e}", path.display()),
        })?;
        Ok(Self { tokenizer })
    }

    /// Id of a token string, if in the vocabulary
    #[must_use]
    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }
}

impl TextCodec for TokenizerCodec {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        // The chat template already carries the special tokens
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| SomniaError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.tokenizer
            .decode(ids, skip_special_tokens)
            .map_err(|e| SomniaError::Tokenizer(e.to_string()))
    }
}

/// Qwen2-architecture causal LM (Qwen2 chat models, DeepSeek-R1 Qwen distills)
pub struct CandleQwen2 {
    model: ModelForCausalLM,
    device: Device,
    vocab_size: usize,
}

impl std::fmt::Debug for CandleQwen2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleQwen2")
            .field("device", &self.device)
            .field("vocab_size", &self.vocab_size)
            .finish_non_exhaustive()
    }
}

impl CandleQwen2 {
    /// Parse `config.json`
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::ModelLoad`] if the JSON does not describe a Qwen2 model.
    pub fn parse_config(json: &str) -> Result<Qwen2Config> {
        serde_json::from_str(json).map_err(|e| SomniaError::ModelLoad {
            reason: format!("Invalid model config: {e}"),
        })
    }

    /// Memory-map safetensors weights onto `placement`
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::ModelLoad`] if the weights cannot be mapped or
    /// do not match `config`.
    pub fn load(config: &Qwen2Config, weights: &[impl AsRef<Path>], placement: &Placement) -> Result<Self> {
        // SAFETY: the weight files are not modified while mapped
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(weights, placement.dtype, &placement.device)
                .map_err(load_err("Failed to map weights"))?
        };
        let model = ModelForCausalLM::new(config, vb).map_err(load_err("Failed to build model"))?;
        Ok(Self {
            model,
            device: placement.device.clone(),
            vocab_size: config.vocab_size,
        })
    }
}

impl GenerativeModel for CandleQwen2 {
    fn forward(&mut self, tokens: &[u32], position: usize) -> Result<Vec<f32>> {
        let input = Tensor::new(tokens, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(inference_err)?;
        // (batch, 1, vocab): logits for the last position only
        let logits = self
            .model
            .forward(&input, position)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_dtype(DType::F32))
            .map_err(inference_err)?;
        logits.to_vec1::<f32>().map_err(inference_err)
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn reset(&mut self) {
        self.model.clear_kv_cache();
    }
}
