//! Chat Template Engine for Model-Specific Formatting
//!
//! Turns role-tagged messages into the exact prompt string a chat model was
//! fine-tuned on.
//!
//! # Supported Formats
//!
//! - **HuggingFace**: the Jinja2 `chat_template` shipped in `tokenizer_config.json`
//! - **DeepSeek**: DeepSeek-R1 distills (`<｜User｜>{content}<｜Assistant｜>`)
//! - **ChatML**: Qwen2 family (`<|im_start|>role\ncontent<|im_end|>`)
//! - **Raw**: no markup, contents concatenated
//!
//! The HuggingFace engine is preferred whenever the model directory has a
//! template; the built-in formats cover snapshots that lack one.
//!
//! # Example
//!
//! ```
//! use somnia::chat_template::{ChatMessage, ChatMLTemplate, ChatTemplateEngine};
//!
//! let template = ChatMLTemplate::new();
//! let messages = vec![ChatMessage::user("昨晚我梦见了蛇")];
//! let output = template.format_conversation(&messages).expect("render");
//! assert!(output.ends_with("<|im_start|>assistant\n"));
//! ```

use minijinja::{context, Environment, Error as JinjaError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::SomniaError;

/// Maximum template size in bytes (100KB)
pub const MAX_TEMPLATE_SIZE: usize = 100 * 1024;

/// Maximum recursion depth for templates
pub const MAX_RECURSION_DEPTH: usize = 100;

/// Chat message structure
///
/// # Example
///
/// ```
/// use somnia::chat_template::ChatMessage;
///
/// let msg = ChatMessage::user("梦见考试");
/// assert_eq!(msg.role, "user");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Role: "system", "user" or "assistant"
    pub role: String,
    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a new chat message
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Template format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    /// Jinja2 template from `tokenizer_config.json`
    HuggingFace,
    /// DeepSeek-R1 distill format
    DeepSeek,
    /// ChatML format (Qwen2)
    ChatML,
    /// Raw fallback - no template
    #[default]
    Raw,
}

/// Special tokens used in chat templates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialTokens {
    /// Beginning of sequence token
    pub bos_token: Option<String>,
    /// End of sequence token
    pub eos_token: Option<String>,
}

/// Chat template engine trait
pub trait ChatTemplateEngine: Send + Sync {
    /// Render a complete conversation followed by the assistant generation prompt
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::FormatError`] if rendering fails.
    fn format_conversation(&self, messages: &[ChatMessage]) -> Result<String, SomniaError>;

    /// Special tokens for this template
    fn special_tokens(&self) -> &SpecialTokens;

    /// Template format
    fn format(&self) -> TemplateFormat;
}

// ============================================================================
// HuggingFace Template (Jinja2-based)
// ============================================================================

/// Token entries in `tokenizer_config.json` are either plain strings or
/// `AddedToken` objects
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenEntry {
    Plain(String),
    Added { content: String },
}

impl TokenEntry {
    fn into_content(self) -> String {
        match self {
            Self::Plain(s) | Self::Added { content: s } => s,
        }
    }
}

/// HuggingFace tokenizer_config.json structure
#[derive(Debug, Deserialize)]
struct TokenizerConfig {
    chat_template: Option<String>,
    bos_token: Option<TokenEntry>,
    eos_token: Option<TokenEntry>,
    #[serde(flatten)]
    #[allow(dead_code)]
    extra: HashMap<String, serde_json::Value>,
}

/// Jinja2-based Chat Template Engine
pub struct HuggingFaceTemplate {
    env: Environment<'static>,
    special_tokens: SpecialTokens,
}

impl std::fmt::Debug for HuggingFaceTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceTemplate")
            .field("special_tokens", &self.special_tokens)
            .finish_non_exhaustive()
    }
}

fn raise_exception(message: String) -> Result<String, JinjaError> {
    Err(JinjaError::new(ErrorKind::InvalidOperation, message))
}

impl HuggingFaceTemplate {
    /// Compile a Jinja2 chat template
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::FormatError`] if the template is oversized or
    /// does not parse.
    pub fn new(template_str: String, special_tokens: SpecialTokens) -> Result<Self, SomniaError> {
        if template_str.len() > MAX_TEMPLATE_SIZE {
            return Err(SomniaError::FormatError {
                reason: format!(
                    "Template is {} bytes, limit is {MAX_TEMPLATE_SIZE}",
                    template_str.len()
                ),
            });
        }

        let mut env = Environment::new();
        env.set_recursion_limit(MAX_RECURSION_DEPTH);
        // HF templates call Python string methods (`.strip()`, `.split()`)
        env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
        env.add_function("raise_exception", raise_exception);
        env.add_template_owned("chat", template_str)
            .map_err(|e| SomniaError::FormatError {
                reason: format!("Invalid template syntax: {e}"),
            })?;

        Ok(Self {
            env,
            special_tokens,
        })
    }

    /// Create from tokenizer_config.json content
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::FormatError`] if the JSON is invalid or has no
    /// `chat_template`.
    pub fn from_json(json: &str) -> Result<Self, SomniaError> {
        let config: TokenizerConfig =
            serde_json::from_str(json).map_err(|e| SomniaError::FormatError {
                reason: format!("Invalid tokenizer config: {e}"),
            })?;

        let template_str = config
            .chat_template
            .ok_or_else(|| SomniaError::FormatError {
                reason: "No 'chat_template' found in config".to_string(),
            })?;

        let special_tokens = SpecialTokens {
            bos_token: config.bos_token.map(TokenEntry::into_content),
            eos_token: config.eos_token.map(TokenEntry::into_content),
        };

        Self::new(template_str, special_tokens)
    }
}

impl ChatTemplateEngine for HuggingFaceTemplate {
    fn format_conversation(&self, messages: &[ChatMessage]) -> Result<String, SomniaError> {
        let tmpl = self
            .env
            .get_template("chat")
            .map_err(|e| SomniaError::FormatError {
                reason: format!("Template error: {e}"),
            })?;

        let bos = self.special_tokens.bos_token.as_deref().unwrap_or("");
        let eos = self.special_tokens.eos_token.as_deref().unwrap_or("");

        tmpl.render(context!(
            messages => messages,
            add_generation_prompt => true,
            bos_token => bos,
            eos_token => eos
        ))
        .map_err(|e| SomniaError::FormatError {
            reason: format!("Render error: {e}"),
        })
    }

    fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }

    fn format(&self) -> TemplateFormat {
        TemplateFormat::HuggingFace
    }
}

// ============================================================================
// Format-Specific Implementations
// ============================================================================

/// DeepSeek-R1 distill template
///
/// Format: `{bos}{system}<｜User｜>{user}<｜Assistant｜><think>\n`
#[derive(Debug, Clone)]
pub struct DeepSeekTemplate {
    special_tokens: SpecialTokens,
}

impl DeepSeekTemplate {
    /// Create a new DeepSeek template with default tokens
    #[must_use]
    pub fn new() -> Self {
        Self {
            special_tokens: SpecialTokens {
                bos_token: Some("<｜begin▁of▁sentence｜>".to_string()),
                eos_token: Some("<｜end▁of▁sentence｜>".to_string()),
            },
        }
    }
}

impl Default for DeepSeekTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatTemplateEngine for DeepSeekTemplate {
    fn format_conversation(&self, messages: &[ChatMessage]) -> Result<String, SomniaError> {
        let bos = self.special_tokens.bos_token.as_deref().unwrap_or("");
        let eos = self.special_tokens.eos_token.as_deref().unwrap_or("");
        let mut result = String::from(bos);

        // System prompts are emitted first regardless of position
        for msg in messages.iter().filter(|m| m.role == "system") {
            result.push_str(&msg.content);
        }
        for msg in messages {
            match msg.role.as_str() {
                "user" => {
                    result.push_str("<｜User｜>");
                    result.push_str(&msg.content);
                },
                "assistant" => {
                    result.push_str("<｜Assistant｜>");
                    result.push_str(&msg.content);
                    result.push_str(eos);
                },
                _ => {},
            }
        }
        result.push_str("<｜Assistant｜><think>\n");

        Ok(result)
    }

    fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }

    fn format(&self) -> TemplateFormat {
        TemplateFormat::DeepSeek
    }
}

/// ChatML Template (Qwen2)
///
/// Format: `<|im_start|>{role}\n{content}<|im_end|>\n`
#[derive(Debug, Clone)]
pub struct ChatMLTemplate {
    special_tokens: SpecialTokens,
}

impl ChatMLTemplate {
    /// Create a new ChatML template with default tokens
    #[must_use]
    pub fn new() -> Self {
        Self {
            special_tokens: SpecialTokens {
                bos_token: None,
                eos_token: Some("<|im_end|>".to_string()),
            },
        }
    }
}

impl Default for ChatMLTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatTemplateEngine for ChatMLTemplate {
    fn format_conversation(&self, messages: &[ChatMessage]) -> Result<String, SomniaError> {
        use std::fmt::Write;
        let mut result = String::new();

        for msg in messages {
            let _ = write!(
                result,
                "<|im_start|>{}\n{}<|im_end|>\n",
                msg.role, msg.content
            );
        }
        result.push_str("<|im_start|>assistant\n");

        Ok(result)
    }

    fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }

    fn format(&self) -> TemplateFormat {
        TemplateFormat::ChatML
    }
}

/// Raw Template (no formatting)
#[derive(Debug, Clone, Default)]
pub struct RawTemplate {
    special_tokens: SpecialTokens,
}

impl RawTemplate {
    /// Create a new raw template
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatTemplateEngine for RawTemplate {
    fn format_conversation(&self, messages: &[ChatMessage]) -> Result<String, SomniaError> {
        Ok(messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }

    fn format(&self) -> TemplateFormat {
        TemplateFormat::Raw
    }
}

// ============================================================================
// Auto-Detection
// ============================================================================

/// Pick a built-in format from a model name or path
///
/// ```
/// use somnia::chat_template::{detect_format_from_name, TemplateFormat};
///
/// assert_eq!(
///     detect_format_from_name("deepseek-ai/DeepSeek-R1-Distill-Qwen-7B"),
///     TemplateFormat::DeepSeek
/// );
/// assert_eq!(detect_format_from_name("Qwen/Qwen2-0.5B-Instruct"), TemplateFormat::ChatML);
/// ```
#[must_use]
pub fn detect_format_from_name(model_name: &str) -> TemplateFormat {
    let name_lower = model_name.to_lowercase();
    if name_lower.contains("deepseek") {
        TemplateFormat::DeepSeek
    } else if name_lower.contains("qwen") {
        TemplateFormat::ChatML
    } else {
        TemplateFormat::Raw
    }
}

/// Instantiate a built-in template
///
/// `HuggingFace` has no built-in body and yields the raw template.
#[must_use]
pub fn create_template(format: TemplateFormat) -> Box<dyn ChatTemplateEngine> {
    match format {
        TemplateFormat::DeepSeek => Box::new(DeepSeekTemplate::new()),
        TemplateFormat::ChatML => Box::new(ChatMLTemplate::new()),
        TemplateFormat::HuggingFace | TemplateFormat::Raw => Box::new(RawTemplate::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QWEN_TEMPLATE: &str = "{% for message in messages %}<|im_start|>{{ message['role'] }}\n{{ message['content'] }}<|im_end|>\n{% endfor %}{% if add_generation_prompt %}<|im_start|>assistant\n{% endif %}";

    #[test]
    fn test_chatml_conversation() {
        let out = ChatMLTemplate::new()
            .format_conversation(&[ChatMessage::system("你是解梦师"), ChatMessage::user("蛇")])
            .expect("render");
        assert_eq!(
            out,
            "<|im_start|>system\n你是解梦师<|im_end|>\n<|im_start|>user\n蛇<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_deepseek_conversation() {
        let out = DeepSeekTemplate::new()
            .format_conversation(&[ChatMessage::user("梦见考试")])
            .expect("render");
        assert_eq!(
            out,
            "<｜begin▁of▁sentence｜><｜User｜>梦见考试<｜Assistant｜><think>\n"
        );
    }

    #[test]
    fn test_deepseek_system_first() {
        let out = DeepSeekTemplate::new()
            .format_conversation(&[ChatMessage::user("u"), ChatMessage::system("s")])
            .expect("render");
        assert!(out.starts_with("<｜begin▁of▁sentence｜>s<｜User｜>u"));
    }

    #[test]
    fn test_raw_joins_contents() {
        let out = RawTemplate::new()
            .format_conversation(&[ChatMessage::system("a"), ChatMessage::user("b")])
            .expect("render");
        assert_eq!(out, "a\nb");
    }

    #[test]
    fn test_huggingface_matches_chatml() {
        let template =
            HuggingFaceTemplate::new(QWEN_TEMPLATE.to_string(), SpecialTokens::default())
                .expect("compile");
        let messages = [ChatMessage::user("梦见飞")];
        assert_eq!(
            template.format_conversation(&messages).expect("render"),
            ChatMLTemplate::new()
                .format_conversation(&messages)
                .expect("render")
        );
        assert_eq!(template.format(), TemplateFormat::HuggingFace);
    }

    #[test]
    fn test_from_json_with_added_token_objects() {
        let json = serde_json::json!({
            "chat_template": "{{ bos_token }}{% for m in messages %}{{ m['content'].strip() }}{% endfor %}",
            "bos_token": {"content": "<s>", "lstrip": false},
            "eos_token": "</s>",
            "model_max_length": 16384
        })
        .to_string();
        let template = HuggingFaceTemplate::from_json(&json).expect("parse");
        assert_eq!(template.special_tokens().bos_token.as_deref(), Some("<s>"));
        assert_eq!(template.special_tokens().eos_token.as_deref(), Some("</s>"));
        let out = template
            .format_conversation(&[ChatMessage::user("  梦  ")])
            .expect("render");
        assert_eq!(out, "<s>梦");
    }

    #[test]
    fn test_from_json_without_template() {
        let err = HuggingFaceTemplate::from_json(r#"{"bos_token": "<s>"}"#).expect_err("missing");
        assert!(err.to_string().contains("chat_template"));
    }

    #[test]
    fn test_invalid_syntax_rejected() {
        let err = HuggingFaceTemplate::new("{% for %}".to_string(), SpecialTokens::default())
            .expect_err("bad syntax");
        assert!(matches!(err, SomniaError::FormatError { .. }));
    }

    #[test]
    fn test_oversized_template_rejected() {
        let big = "x".repeat(MAX_TEMPLATE_SIZE + 1);
        assert!(HuggingFaceTemplate::new(big, SpecialTokens::default()).is_err());
    }

    #[test]
    fn test_raise_exception_surfaces_as_render_error() {
        let template = HuggingFaceTemplate::new(
            "{{ raise_exception('roles must alternate') }}".to_string(),
            SpecialTokens::default(),
        )
        .expect("compile");
        let err = template
            .format_conversation(&[ChatMessage::user("x")])
            .expect_err("raises");
        assert!(err.to_string().contains("roles must alternate"));
    }

    #[test]
    fn test_detect_and_create() {
        assert_eq!(detect_format_from_name("some/llama"), TemplateFormat::Raw);
        assert_eq!(
            create_template(TemplateFormat::ChatML).format(),
            TemplateFormat::ChatML
        );
        assert_eq!(
            create_template(TemplateFormat::DeepSeek).format(),
            TemplateFormat::DeepSeek
        );
    }
}
