//! Response decoding
//!
//! Turns the runner's output sequence back into text: only the continuation
//! after the prompt is decoded, special tokens are skipped and the reasoning
//! preamble of R1-style models is removed.

use crate::error::Result;

/// Opening marker of a reasoning block
pub const THINK_OPEN: &str = "<think>";
/// Closing marker of a reasoning block
pub const THINK_CLOSE: &str = "</think>";

/// Text <-> token id conversion
pub trait TextCodec: Send + Sync {
    /// Encode text without adding special tokens
    ///
    /// # Errors
    ///
    /// Returns [`crate::SomniaError::Tokenizer`] if encoding fails.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode ids to text
    ///
    /// # Errors
    ///
    /// Returns [`crate::SomniaError::Tokenizer`] if decoding fails.
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String>;
}

/// Decodes the generated continuation of a prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDecoder {
    keep_reasoning: bool,
}

impl ResponseDecoder {
    /// Decoder that strips reasoning blocks
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `<think>` blocks in the output
    #[must_use]
    pub fn keep_reasoning(mut self, keep: bool) -> Self {
        self.keep_reasoning = keep;
        self
    }

    /// Decode `generated[input_len..]`
    ///
    /// A sequence no longer than the prompt yields `""`.
    ///
    /// # Errors
    ///
    /// Propagates codec failures.
    pub fn decode<C: TextCodec + ?Sized>(
        &self,
        codec: &C,
        generated: &[u32],
        input_len: usize,
    ) -> Result<String> {
        let Some(suffix) = generated.get(input_len..) else {
            return Ok(String::new());
        };
        if suffix.is_empty() {
            return Ok(String::new());
        }

        let text = codec.decode(suffix, true)?;
        let text = if self.keep_reasoning {
            text.as_str()
        } else {
            strip_reasoning(&text)
        };
        Ok(text.trim().to_string())
    }
}

/// Drop a leading reasoning block, returning the answer after it
///
/// The opening marker is often part of the prompt, so text that only carries
/// the closing marker is cut after it too. An unterminated block is returned
/// unchanged.
#[must_use]
pub fn strip_reasoning(text: &str) -> &str {
    let body = text.trim_start();
    let body = body.strip_prefix(THINK_OPEN).unwrap_or(body);
    match body.find(THINK_CLOSE) {
        Some(idx) => &body[idx + THINK_CLOSE.len()..],
        None => text,
    }
}
