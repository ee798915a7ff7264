//! End-to-end tests of the HTTP surface: invocation streaming, resume,
//! status codes, and auth.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use aw_domain::config::Config;
use aw_domain::delta::{BoxStream, ModelDelta};
use aw_domain::event::{AgentEvent, EventPayload};
use aw_gateway::api;
use aw_gateway::runtime::coordinator::SessionCoordinator;
use aw_gateway::runtime::source::{AgentSource, EchoSource, TurnRequest};
use aw_gateway::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A source whose stream never completes — keeps a turn active.
struct StallSource;

#[async_trait]
impl AgentSource for StallSource {
    async fn stream_turn(
        &self,
        _request: TurnRequest,
    ) -> aw_domain::Result<BoxStream<'static, aw_domain::Result<ModelDelta>>> {
        Ok(Box::pin(futures_util::stream::pending()))
    }
}

fn build_app(
    source: Arc<dyn AgentSource>,
    api_token: Option<&str>,
) -> (axum::Router, Arc<SessionCoordinator>) {
    // Heartbeats off so finite streams close without keep-alive noise.
    let mut config = Config::default();
    config.sse.heartbeat_interval_ms = 0;
    let config = Arc::new(config);

    let coordinator = SessionCoordinator::new(&config);
    let state = AppState {
        config,
        coordinator: coordinator.clone(),
        source,
        api_token_hash: api_token.map(|t| Sha256::digest(t.as_bytes()).to_vec()),
    };
    (api::router(state.clone()).with_state(state), coordinator)
}

fn invoke_request(path: &str, session: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(session) = session {
        builder = builder.header("x-session-id", session);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn ping_reports_healthy() {
    let (app, _) = build_app(Arc::new(EchoSource), None);
    let response = app
        .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "Healthy");
    assert!(body["time_of_last_update"].is_i64());
}

#[tokio::test]
async fn ping_reports_busy_during_turn() {
    let (app, coordinator) = build_app(Arc::new(StallSource), None);
    let response = app
        .clone()
        .oneshot(invoke_request("/invocations", Some("ctx"), r#"{"prompt":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ping = app
        .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_str(&body_text(ping).await).unwrap();
    assert_eq!(body["status"], "HealthyBusy");

    coordinator.shutdown();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Invocation validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn missing_session_header_is_400() {
    let (app, _) = build_app(Arc::new(EchoSource), None);
    let response = app
        .oneshot(invoke_request("/invocations", None, r#"{"prompt":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_body_is_400() {
    let (app, _) = build_app(Arc::new(EchoSource), None);
    for body in ["not json", r#"{"prompt": ""}"#, r#"{"prompt": 42}"#, "{}"] {
        let response = app
            .clone()
            .oneshot(invoke_request("/invocations", Some("ctx"), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }
}

#[tokio::test]
async fn concurrent_turn_is_409() {
    let (app, coordinator) = build_app(Arc::new(StallSource), None);

    let first = app
        .clone()
        .oneshot(invoke_request("/invocations", Some("ctx"), r#"{"prompt":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .clone()
        .oneshot(invoke_request("/invocations", Some("ctx"), r#"{"prompt":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    // A different session is admitted.
    let other = app
        .oneshot(invoke_request("/invocations", Some("other"), r#"{"prompt":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);

    coordinator.shutdown();
}

#[tokio::test]
async fn draining_server_is_503() {
    let (app, coordinator) = build_app(Arc::new(EchoSource), None);
    coordinator.shutdown();

    let response = app
        .oneshot(invoke_request("/invocations", Some("ctx"), r#"{"prompt":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn invocation_streams_full_turn() {
    let (app, _) = build_app(Arc::new(EchoSource), None);
    let response = app
        .oneshot(invoke_request(
            "/invocations",
            Some("ctx-1"),
            r#"{"prompt":"hello there"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );

    let body = body_text(response).await;
    assert!(body.contains("event: task-created"));
    assert!(body.contains("event: task-status"));
    assert!(body.contains("event: thought-stream"));
    assert!(body.contains("event: content-delta"));
    assert!(body.contains("event: content-complete"));
    assert!(body.contains("event: llm-usage"));
    assert!(body.contains("event: task-complete"));
    // IDs carry the session prefix.
    assert!(body.contains("id: ctx-1-1"));
    // Internal events never reach external subscribers.
    assert!(!body.contains("internal:trace"));
}

#[tokio::test]
async fn invocation_singular_alias_works() {
    let (app, _) = build_app(Arc::new(EchoSource), None);
    let response = app
        .oneshot(invoke_request("/invocation", Some("ctx"), r#"{"prompt":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn reconnect_replays_events_after_last_event_id() {
    let (app, coordinator) = build_app(Arc::new(EchoSource), None);

    // A finished turn sits in the buffer: three deltas plus terminal.
    for text in ["a", "b", "c"] {
        coordinator.emit(AgentEvent::new(
            "ctx-1",
            "task-1",
            EventPayload::ContentDelta { delta: text.into() },
        ));
    }
    coordinator.emit(AgentEvent::new("ctx-1", "task-1", EventPayload::TaskComplete));

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "application/json")
        .header("x-session-id", "ctx-1")
        .header("last-event-id", "ctx-1-1")
        .body(Body::from(r#"{"prompt":"hi"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    // Replay starts strictly after the resume point, in order.
    assert!(!body.contains("id: ctx-1-1\n"));
    let pos2 = body.find("id: ctx-1-2").unwrap();
    let pos3 = body.find("id: ctx-1-3").unwrap();
    let pos4 = body.find("id: ctx-1-4").unwrap();
    assert!(pos2 < pos3 && pos3 < pos4);
    // No new turn was started for the resume.
    assert_eq!(coordinator.buffer().get_all("ctx-1").len(), 4);
}

#[tokio::test]
async fn unknown_last_event_id_starts_fresh_turn() {
    let (app, coordinator) = build_app(Arc::new(EchoSource), None);

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header("content-type", "application/json")
        .header("x-session-id", "ctx")
        .header("last-event-id", "bogus-99")
        .body(Body::from(r#"{"prompt":"hi"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    assert!(body.contains("event: task-created"));
    assert!(body.contains("event: task-complete"));
    assert!(!coordinator.buffer().get_all("ctx").is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn auth_missing_token_is_401_wrong_is_403() {
    let (app, _) = build_app(Arc::new(EchoSource), Some("secret"));

    let missing = app
        .clone()
        .oneshot(invoke_request("/invocations", Some("ctx"), r#"{"prompt":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let mut request = invoke_request("/invocations", Some("ctx"), r#"{"prompt":"hi"}"#);
    request
        .headers_mut()
        .insert("authorization", "Bearer wrong".parse().unwrap());
    let wrong = app.clone().oneshot(request).await.unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let mut request = invoke_request("/invocations", Some("ctx"), r#"{"prompt":"hi"}"#);
    request
        .headers_mut()
        .insert("authorization", "Bearer secret".parse().unwrap());
    let ok = app.clone().oneshot(request).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    // Ping stays public.
    let ping = app
        .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ping.status(), StatusCode::OK);
}
