//! Error types for Somnia
//!
//! One error enum covers model loading, request validation, inference and
//! the auxiliary tooling. Every variant maps to exactly one HTTP status via
//! [`SomniaError::status_code`]; nothing is retried.

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for Somnia operations
pub type Result<T> = std::result::Result<T, SomniaError>;

/// Error type for all Somnia operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SomniaError {
    /// Model or tokenizer could not be loaded (absorbed at startup)
    #[error("Model load failed: {reason}")]
    ModelLoad {
        /// Why loading failed
        reason: String,
    },

    /// Caller supplied missing or empty input
    #[error("{0}")]
    Validation(String),

    /// No model and no fallback are available
    #[error("{0}")]
    Unavailable(String),

    /// Forward pass, sampling or tensor conversion failed
    #[error("Inference failed: {0}")]
    InferenceError(String),

    /// Tokenizer encode/decode failed
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Chat template could not be parsed or rendered
    #[error("Format error: {reason}")]
    FormatError {
        /// Details about the format failure
        reason: String,
    },

    /// Filesystem access failed
    #[error("I/O error: {message}")]
    IoError {
        /// Error message
        message: String,
    },

    /// Configuration value is out of range or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation could not be carried out in this environment
    #[error("Unsupported operation '{operation}': {reason}")]
    UnsupportedOperation {
        /// Operation name
        operation: String,
        /// Why it is unsupported
        reason: String,
    },
}

impl SomniaError {
    /// HTTP status the façade reports for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for SomniaError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError {
            message: e.to_string(),
        }
    }
}
