//! HTTP API for dream interpretation
//!
//! ## Endpoints
//!
//! - `GET /` - Interactive page
//! - `GET /health` - Liveness and model status
//! - `POST /interpret` - Interpret a dream description
//!
//! ## Example
//!
//! ```rust,ignore
//! use somnia::api::{create_router, AppState};
//!
//! let state = AppState::new(Arc::new(interpreter));
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, error, warn};

use crate::interpreter::{DreamInterpreter, EMPTY_TEXT_MESSAGE};

mod html;
mod types;

pub use html::INDEX_HTML;
pub use types::{ErrorResponse, HealthResponse, InterpretRequest, InterpretResponse};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    interpreter: Arc<DreamInterpreter>,
}

impl AppState {
    /// State over a shared interpreter
    #[must_use]
    pub fn new(interpreter: Arc<DreamInterpreter>) -> Self {
        Self { interpreter }
    }

    /// State answering from the keyword analyzer only
    #[must_use]
    pub fn demo() -> Self {
        Self::new(Arc::new(DreamInterpreter::fallback_only()))
    }

    /// The interpreter
    #[must_use]
    pub fn interpreter(&self) -> &Arc<DreamInterpreter> {
        &self.interpreter
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/interpret", post(interpret_handler))
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check handler
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let interpreter = &state.interpreter;
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: interpreter.model_loaded(),
        mode: interpreter.mode(),
        version: crate::VERSION.to_string(),
        model: interpreter.engine_info().map(|info| info.model_id.clone()),
    })
}

/// Interpret handler
///
/// Body problems are answered with 400 before the interpreter is touched.
/// Generation runs on the blocking pool.
async fn interpret_handler(
    State(state): State<AppState>,
    payload: Result<Json<InterpretRequest>, JsonRejection>,
) -> Result<Json<InterpretResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| {
        debug!(error = %e, "Rejected request body");
        error_response(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e.body_text()))
    })?;

    let text = request
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, EMPTY_TEXT_MESSAGE))?;

    let interpreter = Arc::clone(&state.interpreter);
    let result = tokio::task::spawn_blocking(move || interpreter.interpret(&text))
        .await
        .map_err(|e| {
            error!(error = %e, "Interpretation task panicked");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Interpretation task failed: {e}"),
            )
        })?;

    match result {
        Ok(interpretation) => Ok(Json(InterpretResponse {
            interpretation: interpretation.text,
            source: interpretation.source,
        })),
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
                error!(error = %e, "Interpretation failed");
            } else {
                warn!(error = %e, status = status.as_u16(), "Interpretation rejected");
            }
            Err(error_response(status, e.to_string()))
        },
    }
}

#[cfg(test)]
pub(crate) mod test_helpers;

#[cfg(test)]
mod tests;
