//! One-shot model loading
//!
//! Resolves the snapshot, picks a device, then loads the tokenizer, chat
//! template and weights. Any failure aborts the load; there are no retries.
//! Must run off the async workers because the registry resolver blocks.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use super::codec::{CandleQwen2, TokenizerCodec};
use super::device::Placement;
use super::engine::ModelEngine;
use super::resolve::{default_chain, ResolverChain};
use crate::chat_template::{
    create_template, detect_format_from_name, ChatTemplateEngine, HuggingFaceTemplate,
    TemplateFormat,
};
use crate::config::ServiceConfig;
use crate::error::{Result, SomniaError};

/// `eos_token_id` as a single id or a list of ids
///
/// ```
/// use somnia::model::loader::eos_ids_from_json;
///
/// let ids = eos_ids_from_json(&serde_json::json!({"eos_token_id": [151643, 151645]}));
/// assert_eq!(ids, vec![151643, 151645]);
/// ```
#[must_use]
pub fn eos_ids_from_json(value: &Value) -> Vec<u32> {
    match value.get("eos_token_id") {
        Some(Value::Number(n)) => n.as_u64().map(|id| id as u32).into_iter().collect(),
        Some(Value::Array(ids)) => ids
            .iter()
            .filter_map(Value::as_u64)
            .map(|id| id as u32)
            .collect(),
        _ => Vec::new(),
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| SomniaError::ModelLoad {
        reason: format!("Invalid JSON in {}: {e}", path.display()),
    })
}

/// Template from `tokenizer_config.json`, else the built-in one for the model family
///
/// # Errors
///
/// Returns an I/O error if the config file exists but cannot be read.
pub fn load_template(
    tokenizer_config: Option<&Path>,
    model_id: &str,
) -> Result<Arc<dyn ChatTemplateEngine>> {
    if let Some(path) = tokenizer_config {
        let json = std::fs::read_to_string(path)?;
        match HuggingFaceTemplate::from_json(&json) {
            Ok(template) => return Ok(Arc::new(template)),
            Err(e) => warn!(error = %e, "Ignoring tokenizer chat template"),
        }
    }
    let format = match detect_format_from_name(model_id) {
        TemplateFormat::Raw | TemplateFormat::HuggingFace => TemplateFormat::ChatML,
        other => other,
    };
    Ok(Arc::from(create_template(format)))
}

/// Builds a [`ModelEngine`] from configuration
#[derive(Debug)]
pub struct ModelLoader {
    config: ServiceConfig,
    chain: ResolverChain,
}

impl ModelLoader {
    /// Loader using the default resolver chain
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        let chain = default_chain(&config);
        Self { config, chain }
    }

    /// Loader using a custom resolver chain
    #[must_use]
    pub fn with_chain(config: ServiceConfig, chain: ResolverChain) -> Self {
        Self { config, chain }
    }

    /// Load everything
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::ModelLoad`] (or an I/O error) on the first failure.
    pub fn load(&self) -> Result<ModelEngine> {
        let model_id = self.config.model_id.as_str();
        let mut steps = Vec::new();
        let mut step = |msg: String| {
            info!("{msg}");
            steps.push(msg);
        };

        step(format!("Resolving model {model_id}"));
        let files = self.chain.resolve(model_id)?;
        step(format!("Model files at {}", files.root.display()));

        let placement = Placement::detect(self.config.force_cpu);
        step(format!("Placement: {}", placement.label()));

        let codec = TokenizerCodec::from_file(&files.tokenizer)?;
        step("Tokenizer loaded".to_string());

        let template = load_template(files.tokenizer_config.as_deref(), model_id)?;
        step(format!("Chat template: {:?}", template.format()));

        let config_json = read_json(&files.config)?;
        let model_config = CandleQwen2::parse_config(&config_json.to_string())?;
        step(format!(
            "Model config: vocab_size={}, layers={}, hidden_size={}",
            model_config.vocab_size, model_config.num_hidden_layers, model_config.hidden_size
        ));

        let mut eos: BTreeSet<u32> = eos_ids_from_json(&config_json).into_iter().collect();
        if let Some(path) = &files.generation_config {
            eos.extend(eos_ids_from_json(&read_json(path)?));
        }
        if let Some(id) = template
            .special_tokens()
            .eos_token
            .as_deref()
            .and_then(|t| codec.token_id(t))
        {
            eos.insert(id);
        }
        if eos.is_empty() {
            return Err(SomniaError::ModelLoad {
                reason: "No end-of-sequence token id found".to_string(),
            });
        }
        step(format!("End-of-sequence ids: {eos:?}"));

        let model = CandleQwen2::load(&model_config, &files.weights, &placement)?;
        step(format!("Weights loaded from {} file(s)", files.weights.len()));

        let generation = self
            .config
            .generation
            .clone()
            .with_eos_token_ids(eos.into_iter().collect());
        Ok(ModelEngine::new(
            model_id,
            placement.label(),
            Arc::new(codec),
            template,
            generation,
            Box::new(model),
        )
        .with_load_steps(steps))
    }
}
