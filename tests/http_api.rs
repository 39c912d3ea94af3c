//! HTTP router end to end via `tower::ServiceExt::oneshot`.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{harness, Harness, HarnessBuilder};
use conductor::adapters::http::api_router;
use conductor::bootstrap::register_builtin_capabilities;
use conductor::ports::ProviderError;

fn app(h: &Harness) -> Router {
    api_router(h.orchestrator.clone(), Duration::from_secs(30))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn post_messages_returns_reply_and_metadata() {
    let h = harness();

    let (status, body) = send(
        app(&h),
        post(
            "/messages",
            json!({"caller_id": "alice", "session_id": "s-1", "message": "hello"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "echo: hello");
    assert_eq!(body["metadata"]["persona"], "assistant");
    assert_eq!(body["metadata"]["routing"]["fallback_used"], false);
    assert!(body["conversation_id"].as_str().is_some());
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let h = harness();
    let response = app(&h).oneshot(get("/health/providers")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn unknown_caller_is_404_with_code() {
    let h = harness();

    let (status, body) = send(
        app(&h),
        post(
            "/messages",
            json!({"caller_id": "ghost", "session_id": "s-1", "message": "hello"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "USER_NOT_FOUND");
}

#[tokio::test]
async fn malformed_conversation_id_is_400() {
    let h = harness();

    let (status, body) = send(
        app(&h),
        post(
            "/messages",
            json!({
                "caller_id": "alice",
                "session_id": "s-1",
                "message": "hello",
                "conversation_id": "nope"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "conversation_id");
}

#[tokio::test]
async fn disallowed_task_for_target_persona_is_403() {
    let h = harness();

    let (status, body) = send(
        app(&h),
        post(
            "/messages",
            json!({
                "caller_id": "alice",
                "session_id": "s-1",
                "message": "write me a parser",
                "task": "coding",
                "persona": "coach"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "TASK_NOT_ALLOWED");
}

#[tokio::test]
async fn exhausted_providers_are_503() {
    let failing = |m: conductor::adapters::ai::MockProviderAdapter| {
        m.always_failing(ProviderError::Unavailable {
            message: "down".into(),
        })
    };
    let h = HarnessBuilder::new()
        .openai(failing)
        .anthropic(failing)
        .local(failing)
        .build();

    let (status, body) = send(
        app(&h),
        post(
            "/messages",
            json!({"caller_id": "alice", "session_id": "s-1", "message": "hello"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn events_endpoint_invokes_capabilities_and_refuses_chat() {
    let h = harness();
    register_builtin_capabilities(&h.registry).unwrap();

    let (status, body) = send(
        app(&h),
        post(
            "/events",
            json!({
                "kind": "capability_invocation",
                "caller_id": "alice",
                "session_id": "s-1",
                "payload": {"name": "word_count", "parameters": {"text": "a b c d"}}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["capability"]["success"], true);
    assert_eq!(body["capability"]["output"]["words"], 4);

    let (status, _) = send(
        app(&h),
        post(
            "/events",
            json!({
                "kind": "chat",
                "caller_id": "alice",
                "session_id": "s-1",
                "payload": {"message": "hi"}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_capability_event_is_404() {
    let h = harness();

    let (status, body) = send(
        app(&h),
        post(
            "/events",
            json!({
                "kind": "capability_invocation",
                "caller_id": "alice",
                "session_id": "s-1",
                "payload": {"name": "missing"}
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CAPABILITY_NOT_FOUND");
}

#[tokio::test]
async fn capability_search_filters_by_query() {
    let h = harness();
    register_builtin_capabilities(&h.registry).unwrap();

    let (status, body) = send(app(&h), get("/capabilities?q=clock")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["capabilities"][0]["name"], "current_time");

    let (_, all) = send(app(&h), get("/capabilities")).await;
    assert_eq!(all["total"], 3);
}

#[tokio::test]
async fn provider_health_lists_every_adapter() {
    let h = harness();
    send(
        app(&h),
        post(
            "/messages",
            json!({"caller_id": "alice", "session_id": "s-1", "message": "hello"}),
        ),
    )
    .await;

    let (status, body) = send(app(&h), get("/health/providers")).await;

    assert_eq!(status, StatusCode::OK);
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 3);
    assert_eq!(providers[0]["name"], "anthropic");
    let openai = providers.iter().find(|p| p["name"] == "openai").unwrap();
    assert_eq!(openai["circuit"]["status"], "closed");
}
