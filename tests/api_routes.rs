//! Health and telemetry routes through the router

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use voicerag_gateway::{ServerConfig, routes, state::AppState};

async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let app = routes::create_app_router(state);
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_on_root_and_health_paths() {
    let state = AppState::new(ServerConfig::default()).unwrap();

    for uri in ["/", "/health"] {
        let (status, body) = get_json(state.clone(), uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "OK", "tools": 5}));
    }
}

#[tokio::test]
async fn test_health_counts_knowledge_tools_when_search_configured() {
    let mut config = ServerConfig::default();
    config.search.endpoint = Some("http://127.0.0.1:9".to_string());
    config.search.index = Some("kb".to_string());
    config.search.api_key = Some("search-key".to_string());
    let state = AppState::new(config).unwrap();

    let (_, body) = get_json(state, "/health").await;
    assert_eq!(body["tools"], 7);
}

#[tokio::test]
async fn test_telemetry_window_and_stats() {
    let mut config = ServerConfig::default();
    config.telemetry_ui_limit = 10;
    let state = AppState::new(config).unwrap();

    for i in 0..12 {
        state.telemetry.record_tool_call(
            "get_policies",
            &json!({"call": i}),
            Duration::from_millis(4),
            10,
            None,
        );
    }
    state
        .telemetry
        .record_model_call("text-embedding-3-large", "embedding_generation", Duration::from_millis(20), Some(5));

    let (status, body) = get_json(state, "/api/telemetry").await;
    assert_eq!(status, StatusCode::OK);

    let tool_calls = body["tool_calls"].as_array().unwrap();
    assert_eq!(tool_calls.len(), 10);
    assert_eq!(tool_calls[0]["args"], json!({"call": 2}));
    assert_eq!(tool_calls[9]["args"], json!({"call": 11}));
    assert!(tool_calls[0].get("error").is_none());

    assert_eq!(body["model_calls"][0]["tokens_used"], 5);
    assert_eq!(body["stats"]["total_tool_calls"], 12);
    assert_eq!(body["stats"]["total_model_calls"], 1);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let state = AppState::new(ServerConfig::default()).unwrap();
    let app = routes::create_app_router(state);
    let response = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
