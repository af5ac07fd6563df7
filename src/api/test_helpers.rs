//! Test helper functions for api tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::util::ServiceExt;

use super::*;

/// Router over a given interpreter
pub fn create_test_app(interpreter: DreamInterpreter) -> Router {
    create_router(AppState::new(Arc::new(interpreter)))
}

/// Router answering from the keyword analyzer
pub fn create_fallback_app() -> Router {
    create_router(AppState::demo())
}

/// Send a request and parse the JSON response body
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.expect("test");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("test");
    let json = serde_json::from_slice(&body).expect("test");
    (status, json)
}

/// POST a raw body to `/interpret`
pub async fn post_interpret(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/interpret")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("test");
    send(app, request).await
}
