//! API Request/Response Types

use serde::{Deserialize, Serialize};

use crate::interpreter::{InterpreterMode, Source};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests
    pub status: String,
    /// Whether the language model is loaded
    pub model_loaded: bool,
    /// Interpreter mode: "model", "fallback" or "unavailable"
    pub mode: InterpreterMode,
    /// Service version
    pub version: String,
    /// Loaded model identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Interpret request
#[derive(Debug, Serialize, Deserialize)]
pub struct InterpretRequest {
    /// Dream description
    #[serde(default)]
    pub text: Option<String>,
}

/// Interpret response
#[derive(Debug, Serialize, Deserialize)]
pub struct InterpretResponse {
    /// Interpretation text
    pub interpretation: String,
    /// "model" or "fallback"
    pub source: Source,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}
