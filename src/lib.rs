//! # Somnia
//!
//! Dream interpretation service: a chat-formatted causal language model behind
//! a small HTTP API, with a keyword analyzer that answers when no model is loaded.
//!
//! ## Pipeline
//!
//! ```text
//! text -> PromptBuilder -> ChatTemplateEngine -> TextCodec::encode
//!      -> GenerationRunner (TokenSampler over GenerativeModel logits)
//!      -> ResponseDecoder (skip special tokens, strip reasoning) -> answer
//! ```
//!
//! ## Example
//!
//! ```rust
//! use somnia::interpreter::{DreamInterpreter, Source};
//!
//! let interpreter = DreamInterpreter::fallback_only();
//! let result = interpreter.interpret("我梦见一条蛇在追我").unwrap();
//! assert_eq!(result.source, Source::Fallback);
//! assert!(result.text.starts_with("梦境解析："));
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)] // u128 -> u64 for elapsed millis
#![allow(clippy::cast_precision_loss)] // usize -> f64 for tokens/s
#![allow(clippy::must_use_candidate)] // Not all methods need #[must_use]
#![allow(clippy::doc_markdown)] // Allow technical terms without backticks
#![allow(clippy::uninlined_format_args)] // Prefer explicit format args
#![allow(clippy::missing_panics_doc)] // Allow missing Panics doc sections
#![allow(clippy::float_cmp)] // Allow float comparisons in tests

/// HTTP API (axum)
pub mod api;
/// Chat template formatting (HuggingFace Jinja, DeepSeek, ChatML, raw)
pub mod chat_template;
/// CLI command implementations (extracted for testability)
pub mod cli;
/// Environment-driven service configuration
pub mod config;
/// Response decoding and reasoning-block removal
pub mod decode;
pub mod error;
/// Keyword-based dream analysis used when no model is loaded
pub mod fallback;
pub mod generate;
/// Interpreter orchestration and inference logs
pub mod interpreter;
/// Model resolution, placement and loading
pub mod model;
/// Dream prompt construction
pub mod prompt;
/// SHA-256 verification of model files
pub mod verify;

// Re-exports for convenience
pub use error::{Result, SomniaError};
pub use interpreter::{DreamInterpreter, Interpretation, InterpreterMode, Source};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with("0."));
        assert!(VERSION.contains('.'));
    }
}
