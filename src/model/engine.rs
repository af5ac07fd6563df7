//! The loaded model handle
//!
//! Everything except the model itself is immutable after loading. The model
//! carries a KV cache, so it sits behind a mutex and generation calls run one
//! at a time.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;

use crate::chat_template::{ChatTemplateEngine, TemplateFormat};
use crate::decode::{ResponseDecoder, TextCodec};
use crate::error::{Result, SomniaError};
use crate::generate::{GenerationConfig, GenerationRunner, GenerativeModel};
use crate::interpreter::InferenceLog;
use crate::prompt::PromptBuilder;

/// Description of a loaded model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineInfo {
    /// Registry identifier
    pub model_id: String,
    /// Device and precision label, e.g. `cuda:bf16`
    pub device: String,
    /// Chat template in use
    pub template: TemplateFormat,
    /// Vocabulary size
    pub vocab_size: usize,
    /// Sampling defaults
    pub generation: GenerationConfig,
    /// Steps taken while loading
    pub load_steps: Vec<String>,
}

/// Tokenizer, template and model bundled for request handling
pub struct ModelEngine {
    info: EngineInfo,
    codec: Arc<dyn TextCodec>,
    prompt: PromptBuilder,
    decoder: ResponseDecoder,
    runner: GenerationRunner,
    model: Mutex<Box<dyn GenerativeModel>>,
}

impl std::fmt::Debug for ModelEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEngine")
            .field("info", &self.info)
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

impl ModelEngine {
    /// Assemble an engine from loaded parts
    #[must_use]
    pub fn new(
        model_id: impl Into<String>,
        device: impl Into<String>,
        codec: Arc<dyn TextCodec>,
        template: Arc<dyn ChatTemplateEngine>,
        generation: GenerationConfig,
        model: Box<dyn GenerativeModel>,
    ) -> Self {
        let info = EngineInfo {
            model_id: model_id.into(),
            device: device.into(),
            template: template.format(),
            vocab_size: model.vocab_size(),
            generation: generation.clone(),
            load_steps: Vec::new(),
        };
        Self {
            info,
            codec,
            prompt: PromptBuilder::new(template),
            decoder: ResponseDecoder::new(),
            runner: GenerationRunner::new(generation),
            model: Mutex::new(model),
        }
    }

    /// Attach the loading steps
    #[must_use]
    pub fn with_load_steps(mut self, steps: Vec<String>) -> Self {
        self.info.load_steps = steps;
        self
    }

    /// Model description
    #[must_use]
    pub fn info(&self) -> &EngineInfo {
        &self.info
    }

    /// Build the prompt, generate and decode
    ///
    /// # Errors
    ///
    /// Returns template, tokenizer or inference failures; a poisoned model
    /// lock is reported as [`SomniaError::InferenceError`].
    pub fn interpret(&self, text: &str, log: &mut InferenceLog) -> Result<String> {
        log.step("Building input template");
        let prompt = self.prompt.build(text)?;
        log.step(format!("Input template length: {} chars", prompt.chars().count()));

        log.step("Tokenizing input");
        let input_ids = self.codec.encode(&prompt)?;
        log.step(format!("Input tokens: {}", input_ids.len()));

        let config = self.runner.config();
        log.step(format!(
            "Generation parameters: max_new_tokens={}, temperature={}, top_p={}",
            config.max_new_tokens, config.temperature, config.top_p
        ));

        let start = Instant::now();
        let generated = {
            let mut model = self
                .model
                .lock()
                .map_err(|_| SomniaError::InferenceError("Model mutex poisoned".to_string()))?;
            self.runner.run(model.as_mut(), &input_ids)?
        };
        let secs = start.elapsed().as_secs_f64();
        let new_tokens = generated.len().saturating_sub(input_ids.len());
        log.step(format!("Output tokens: {new_tokens}"));
        log.step(format!("Generation time: {secs:.2}s"));
        if secs > 0.0 {
            log.step(format!("Generation speed: {:.2} tokens/s", new_tokens as f64 / secs));
        }

        log.step("Decoding output");
        let text = self.decoder.decode(self.codec.as_ref(), &generated, input_ids.len())?;
        log.step(format!("Response length: {} chars", text.chars().count()));
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_helpers::{failing_engine, scripted_engine};

    #[test]
    fn test_interpret_returns_decoded_reply() {
        let engine = scripted_engine("这个梦反映了您对变化的焦虑。");
        let mut log = InferenceLog::new();
        let text = engine.interpret("梦见蛇", &mut log).expect("interpret");
        assert_eq!(text, "这个梦反映了您对变化的焦虑。");
        assert!(log.steps().iter().any(|s| s.starts_with("Input tokens:")));
        assert!(log.steps().iter().any(|s| s == "Output tokens: 15"));
    }

    #[test]
    fn test_interpret_is_repeatable() {
        let engine = scripted_engine("好梦");
        let a = engine.interpret("a", &mut InferenceLog::new()).expect("first");
        let b = engine.interpret("b", &mut InferenceLog::new()).expect("second");
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_reply_is_empty_string() {
        let engine = scripted_engine("");
        let text = engine.interpret("梦", &mut InferenceLog::new()).expect("interpret");
        assert_eq!(text, "");
    }

    #[test]
    fn test_forward_failure_surfaces() {
        let engine = failing_engine();
        let err = engine
            .interpret("梦", &mut InferenceLog::new())
            .expect_err("fails");
        assert!(matches!(err, SomniaError::InferenceError(_)));
    }

    #[test]
    fn test_info() {
        let engine = scripted_engine("ab").with_load_steps(vec!["Tokenizer loaded".into()]);
        let info = engine.info();
        assert_eq!(info.model_id, "test/scripted");
        assert_eq!(info.template, TemplateFormat::ChatML);
        assert_eq!(info.vocab_size, 4);
        assert_eq!(info.load_steps.len(), 1);
    }
}
