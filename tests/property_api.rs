//! Property-based tests for the HTTP API
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use proptest::prelude::*;
use somnia::api::{create_router, AppState};
use somnia::fallback::FallbackAnalyzer;
use tower::util::ServiceExt;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

async fn post_interpret(app: Router, body: String) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/interpret")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Non-blank text always gets the analyzer's answer in fallback mode
    #[test]
    fn test_fallback_answers_any_text(text in "\\PC{1,80}") {
        prop_assume!(!text.trim().is_empty());
        let body = serde_json::json!({ "text": text }).to_string();
        let (status, json) = runtime().block_on(post_interpret(create_router(AppState::demo()), body));
        prop_assert_eq!(status, StatusCode::OK);
        prop_assert_eq!(json["source"].as_str(), Some("fallback"));
        let expected = FallbackAnalyzer::new().analyze(&text);
        prop_assert_eq!(json["interpretation"].as_str(), Some(expected.as_str()));
    }

    /// Whitespace-only text is a 400 regardless of length
    #[test]
    fn test_blank_text_is_bad_request(text in "[ \\t\\n\\r]{0,20}") {
        let body = serde_json::json!({ "text": text }).to_string();
        let (status, json) = runtime().block_on(post_interpret(create_router(AppState::demo()), body));
        prop_assert_eq!(status, StatusCode::BAD_REQUEST);
        prop_assert_eq!(json["error"].as_str(), Some("No text provided"));
    }
}
