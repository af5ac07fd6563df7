//! Prompt construction for dream interpretation requests
//!
//! Wraps the caller's dream description in a fixed instruction and renders it
//! through the model's chat template, ending with the assistant generation
//! prompt.

use std::sync::Arc;

use crate::chat_template::{ChatMessage, ChatTemplateEngine};
use crate::error::Result;

/// Instruction placed before the dream text
pub const DREAM_INSTRUCTION: &str = "请帮我详细解析这个梦境，并给出心理学建议：";

/// Builds a template-formatted prompt from raw dream text
#[derive(Clone)]
pub struct PromptBuilder {
    template: Arc<dyn ChatTemplateEngine>,
    system: Option<String>,
}

impl std::fmt::Debug for PromptBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptBuilder")
            .field("format", &self.template.format())
            .field("system", &self.system)
            .finish()
    }
}

impl PromptBuilder {
    /// Create a builder over a chat template
    #[must_use]
    pub fn new(template: Arc<dyn ChatTemplateEngine>) -> Self {
        Self {
            template,
            system: None,
        }
    }

    /// Prepend a system message to every prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// The user message for `text`
    #[must_use]
    pub fn user_message(text: &str) -> ChatMessage {
        ChatMessage::user(format!("{DREAM_INSTRUCTION}\n{text}"))
    }

    /// Messages passed to the template
    #[must_use]
    pub fn messages(&self, text: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(Self::user_message(text));
        messages
    }

    /// Render the prompt string for `text`
    ///
    /// # Errors
    ///
    /// Returns [`crate::SomniaError::FormatError`] if the template fails to render.
    pub fn build(&self, text: &str) -> Result<String> {
        self.template.format_conversation(&self.messages(text))
    }
}
