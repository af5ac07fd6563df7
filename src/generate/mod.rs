//! Autoregressive generation
//!
//! [`GenerationRunner`] drives any [`GenerativeModel`] one token at a time:
//!
//! 1. Prefill: forward the whole prompt at position 0
//! 2. Sample the next token from the last logits (temperature + nucleus)
//! 3. Stop on an end-of-sequence id or when `max_new_tokens` is reached
//! 4. Otherwise forward the new token at its absolute position and repeat
//!
//! The returned sequence always starts with the prompt ids, so callers slice
//! the continuation off with the prompt length.
//!
//! # Example
//!
//! ```rust,ignore
//! use somnia::generate::{GenerationConfig, GenerationRunner};
//!
//! let runner = GenerationRunner::new(GenerationConfig::default().with_max_new_tokens(64));
//! let sequence = runner.run(&mut model, &prompt_ids)?;
//! assert_eq!(&sequence[..prompt_ids.len()], &prompt_ids[..]);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, SomniaError};

mod sampler;

pub use sampler::{
    apply_temperature, nucleus_candidates, sample_greedy, sample_top_p, softmax, TokenSampler,
};

/// Sampling hyperparameters for one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Upper bound on generated tokens (prompt excluded)
    pub max_new_tokens: usize,
    /// Softmax temperature; `<= 0` means greedy
    pub temperature: f32,
    /// Nucleus threshold in `(0, 1]`
    pub top_p: f32,
    /// Sample from the distribution instead of taking the argmax
    pub do_sample: bool,
    /// Fixed RNG seed; `None` draws from entropy
    pub seed: Option<u64>,
    /// Ids that terminate generation
    pub eos_token_ids: Vec<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            temperature: 0.7,
            top_p: 0.9,
            do_sample: true,
            seed: None,
            eos_token_ids: Vec::new(),
        }
    }
}

impl GenerationConfig {
    /// Greedy decoding (argmax at every step)
    #[must_use]
    pub fn greedy() -> Self {
        Self {
            do_sample: false,
            ..Self::default()
        }
    }

    /// Set the generation budget
    #[must_use]
    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the nucleus threshold
    #[must_use]
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    /// Set the RNG seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the end-of-sequence ids
    #[must_use]
    pub fn with_eos_token_ids(mut self, ids: Vec<u32>) -> Self {
        self.eos_token_ids = ids;
        self
    }

    /// Whether `token` ends generation
    #[must_use]
    pub fn is_eos(&self, token: u32) -> bool {
        self.eos_token_ids.contains(&token)
    }

    /// Check hyperparameter ranges
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::InvalidConfiguration`] for a zero budget, a
    /// negative or non-finite temperature, or `top_p` outside `(0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.max_new_tokens == 0 {
            return Err(SomniaError::InvalidConfiguration(
                "max_new_tokens must be at least 1".to_string(),
            ));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(SomniaError::InvalidConfiguration(format!(
                "temperature must be finite and >= 0, got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(SomniaError::InvalidConfiguration(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        Ok(())
    }
}

/// A causal language model that can be stepped token by token
///
/// `position` is the absolute index of `tokens[0]` in the sequence, so a
/// model with a KV cache only needs to process the new tokens.
pub trait GenerativeModel: Send {
    /// Forward pass returning the logits for the token after `tokens`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying runtime fails.
    fn forward(&mut self, tokens: &[u32], position: usize) -> Result<Vec<f32>>;

    /// Vocabulary size
    fn vocab_size(&self) -> usize;

    /// Reset any cached state (e.g., KV cache)
    fn reset(&mut self) {}
}

/// Runs the decode loop for one request
#[derive(Debug, Clone)]
pub struct GenerationRunner {
    config: GenerationConfig,
}

impl GenerationRunner {
    /// Create a runner with the given hyperparameters
    #[must_use]
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }

    /// Hyperparameters in use
    #[must_use]
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generate a continuation of `prompt`
    ///
    /// The result starts with `prompt` and holds at most
    /// `max_new_tokens` further ids. An end-of-sequence id is kept as the
    /// final element.
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::InferenceError`] for an empty prompt, for logits
    /// with no finite values, or when the model's forward pass fails.
    pub fn run<M: GenerativeModel + ?Sized>(&self, model: &mut M, prompt: &[u32]) -> Result<Vec<u32>> {
        if prompt.is_empty() {
            return Err(SomniaError::InferenceError(
                "Prompt cannot be empty".to_string(),
            ));
        }

        model.reset();
        let mut sampler = TokenSampler::new(&self.config);
        let mut tokens = Vec::with_capacity(prompt.len() + self.config.max_new_tokens);
        tokens.extend_from_slice(prompt);

        let mut logits = model.forward(prompt, 0)?;
        for step in 0..self.config.max_new_tokens {
            let next = sampler.sample(&logits)?;
            tokens.push(next);

            if self.config.is_eos(next) || step + 1 == self.config.max_new_tokens {
                break;
            }
            logits = model.forward(&[next], tokens.len() - 1)?;
        }

        Ok(tokens)
    }
}
