use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chat_relay::config::{AppConfig, UpstreamConfig};
use chat_relay::relay::MAX_UPSTREAM_ERROR_BODY_BYTES;
use chat_relay::routing::dispatch_request;
use chat_relay::state::AppState;
use serde_json::{json, Value};

const CHAT_URI: &str = "/api/v1/ai-playground/chat";

#[derive(Clone, Default)]
struct Seen {
    authorization: Arc<Mutex<Option<String>>>,
    body: Arc<Mutex<Option<Value>>>,
}

/// Start a mock completions endpoint that records the request and replies with
/// `status`, `content_type` and `body`.
async fn start_upstream(
    status: StatusCode,
    content_type: &'static str,
    body: &'static str,
) -> (String, Seen, tokio::task::JoinHandle<()>) {
    let seen = Seen::default();
    let recorder = seen.clone();
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move |headers: HeaderMap, Json(request): Json<Value>| {
            let recorder = recorder.clone();
            async move {
                *recorder.authorization.lock().unwrap() = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                *recorder.body.lock().unwrap() = Some(request);
                (status, [("content-type", content_type)], body).into_response()
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/v1"), seen, server)
}

fn build_state_with(base_url: String, body_limit_bytes: Option<usize>) -> Arc<AppState> {
    let mut config = AppConfig {
        upstream: UpstreamConfig {
            base_url,
            ..UpstreamConfig::default()
        },
        ..AppConfig::default()
    };
    if let Some(limit) = body_limit_bytes {
        config.server.body_limit_bytes = limit;
    }
    Arc::new(AppState::from_config(config).expect("build state"))
}

fn build_state(base_url: String) -> Arc<AppState> {
    build_state_with(base_url, None)
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(CHAT_URI)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("serialize request")))
        .expect("build request")
}

async fn read_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body")
        .to_vec()
}

async fn read_json(response: Response) -> Value {
    serde_json::from_slice(&read_body(response).await).expect("json payload")
}

const HAPPY_STREAM: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}\n\n\
data: [DONE]\n\n";

#[tokio::test]
async fn test_streaming_relay_emits_start_chunks_end() {
    let (base_url, seen, server) =
        start_upstream(StatusCode::OK, "text/event-stream", HAPPY_STREAM).await;
    let state = build_state(base_url);

    let request = chat_request(json!({
        "userMessage": "hi",
        "userInstruction": "be terse",
        "modelApi": "key",
        "stream": true
    }));
    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["cache-control"], "no-cache, no-transform");
    assert_eq!(response.headers()["x-accel-buffering"], "no");

    let body = String::from_utf8(read_body(response).await).expect("utf8 body");
    assert_eq!(
        body,
        "event: start\ndata: {}\n\n\
         event: chunk\ndata: {\"content\":\"Hi\"}\n\n\
         event: chunk\ndata: {\"content\":\"!\"}\n\n\
         event: end\ndata: {}\n\n"
    );

    assert_eq!(
        seen.authorization.lock().unwrap().as_deref(),
        Some("Bearer key")
    );
    let upstream_body = seen.body.lock().unwrap().clone().expect("upstream body");
    assert_eq!(upstream_body["model"], "deepseek-chat");
    assert_eq!(upstream_body["stream"], true);
    assert_eq!(upstream_body["messages"][0]["role"], "system");
    assert_eq!(upstream_body["messages"][0]["content"], "be terse");
    assert_eq!(upstream_body["messages"][1]["role"], "user");
    assert_eq!(upstream_body["messages"][1]["content"], "hi");
    assert!(upstream_body.get("temperature").is_none());
    assert!(upstream_body.get("top_p").is_none());
    assert!(upstream_body.get("max_tokens").is_none());

    server.abort();
}

#[tokio::test]
async fn test_streaming_relay_skips_malformed_and_omits_end_without_sentinel() {
    let (base_url, _seen, server) = start_upstream(
        StatusCode::OK,
        "text/event-stream",
        ": heartbeat\n\
data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\
data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\
data: {broken\n\
data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
    )
    .await;
    let state = build_state(base_url);

    let request = chat_request(json!({
        "userMessage": "hi",
        "modelApi": "key",
        "modelName": "custom-model",
        "temperature": 0.5,
        "stream": true
    }));
    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);

    let body = String::from_utf8(read_body(response).await).expect("utf8 body");
    assert_eq!(
        body,
        "event: start\ndata: {}\n\n\
         event: chunk\ndata: {\"content\":\"a\"}\n\n\
         event: chunk\ndata: {\"content\":\"b\"}\n\n"
    );

    server.abort();
}

#[tokio::test]
async fn test_non_streaming_relay_returns_ai_response() {
    let (base_url, seen, server) = start_upstream(
        StatusCode::OK,
        "application/json",
        r#"{"choices":[{"message":{"content":"Hi!"}}]}"#,
    )
    .await;
    let state = build_state(base_url);

    let request = chat_request(json!({
        "userMessage": "hi",
        "userInstruction": "be terse",
        "modelApi": "key",
        "modelName": "custom-model",
        "temperature": 0.7,
        "topP": 0.9,
        "maxTokens": 64,
        "stream": false
    }));
    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({"aiResponse": "Hi!"}));

    let upstream_body = seen.body.lock().unwrap().clone().expect("upstream body");
    assert_eq!(upstream_body["model"], "custom-model");
    assert_eq!(upstream_body["stream"], false);
    assert_eq!(upstream_body["temperature"], 0.7);
    assert_eq!(upstream_body["top_p"], 0.9);
    assert_eq!(upstream_body["max_tokens"], 64);

    server.abort();
}

#[tokio::test]
async fn test_non_streaming_missing_content_is_empty_answer() {
    let (base_url, _seen, server) = start_upstream(
        StatusCode::OK,
        "application/json",
        r#"{"choices":[{"finish_reason":"length"}]}"#,
    )
    .await;
    let state = build_state(base_url);

    let request = chat_request(json!({"userMessage": "hi", "modelApi": "key"}));
    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({"aiResponse": ""}));

    server.abort();
}

#[tokio::test]
async fn test_non_streaming_invalid_upstream_body() {
    let (base_url, _seen, server) =
        start_upstream(StatusCode::OK, "text/plain", "definitely not json").await;
    let state = build_state(base_url);

    let request = chat_request(json!({"userMessage": "hi", "modelApi": "key"}));
    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        read_json(response).await,
        json!({"success": false, "message": "Failed to parse AI response"})
    );

    server.abort();
}

#[tokio::test]
async fn test_upstream_json_error_is_forwarded_before_stream_commit() {
    let (base_url, _seen, server) = start_upstream(
        StatusCode::UNAUTHORIZED,
        "application/json",
        r#"{"error":{"message":"Authentication Fails","type":"authentication_error"}}"#,
    )
    .await;
    let state = build_state(base_url);

    let request = chat_request(json!({"userMessage": "hi", "modelApi": "bad", "stream": true}));
    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["content-type"], "application/json");

    let envelope = read_json(response).await;
    assert_eq!(envelope["success"], false);
    let forwarded: Value =
        serde_json::from_str(envelope["message"].as_str().expect("message")).expect("json");
    assert_eq!(forwarded["error"]["message"], "Authentication Fails");

    server.abort();
}

#[tokio::test]
async fn test_upstream_non_json_error_is_gateway_error() {
    let (base_url, _seen, server) = start_upstream(
        StatusCode::SERVICE_UNAVAILABLE,
        "text/html",
        "<html>maintenance</html>",
    )
    .await;
    let state = build_state(base_url);

    let request = chat_request(json!({"userMessage": "hi", "modelApi": "key"}));
    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        read_json(response).await,
        json!({
            "success": false,
            "message": "Error from AI service: 503 Service Unavailable"
        })
    );

    server.abort();
}

#[tokio::test]
async fn test_oversized_upstream_error_body_is_gateway_error() {
    let message = "x".repeat(MAX_UPSTREAM_ERROR_BODY_BYTES + 1);
    let body = json!({"error": {"message": message}}).to_string();
    let (base_url, _seen, server) = start_upstream(
        StatusCode::TOO_MANY_REQUESTS,
        "application/json",
        Box::leak(body.into_boxed_str()),
    )
    .await;
    let state = build_state(base_url);

    let request = chat_request(json!({"userMessage": "hi", "modelApi": "key", "stream": true}));
    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        read_json(response).await,
        json!({
            "success": false,
            "message": "Error from AI service: 429 Too Many Requests"
        })
    );

    server.abort();
}

#[tokio::test]
async fn test_unreachable_upstream() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let state = build_state(format!("http://{addr}/v1"));

    let request = chat_request(json!({"userMessage": "hi", "modelApi": "key", "stream": true}));
    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        read_json(response).await,
        json!({"success": false, "message": "Failed to communicate with AI service"})
    );
}

#[tokio::test]
async fn test_client_input_errors() {
    let state = build_state("http://127.0.0.1:9/v1".to_string());

    let missing_key = chat_request(json!({"userMessage": "hi", "modelApi": "  "}));
    let response = dispatch_request(Arc::clone(&state), missing_key)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        read_json(response).await,
        json!({"success": false, "message": "API key is required"})
    );

    let malformed = Request::builder()
        .method("POST")
        .uri(CHAT_URI)
        .header("content-type", "application/json")
        .body(Body::from("{\"userMessage\":"))
        .expect("build request");
    let response = dispatch_request(state, malformed).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        read_json(response).await,
        json!({"success": false, "message": "Invalid request body"})
    );
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let state = build_state_with("http://127.0.0.1:9/v1".to_string(), Some(64));
    let request = chat_request(json!({"userMessage": "x".repeat(256), "modelApi": "key"}));
    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let envelope = read_json(response).await;
    assert_eq!(envelope["success"], false);
}

#[tokio::test]
async fn test_health_and_unknown_routes() {
    let state = build_state("http://127.0.0.1:9/v1".to_string());

    let health = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .expect("build request");
    let response = dispatch_request(Arc::clone(&state), health)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["status"], "chat-relay is running");
    assert_eq!(payload["config"]["chat_route"], CHAT_URI);

    let wrong_method = Request::builder()
        .method("GET")
        .uri(CHAT_URI)
        .body(Body::empty())
        .expect("build request");
    let response = dispatch_request(Arc::clone(&state), wrong_method)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let unknown = Request::builder()
        .method("POST")
        .uri("/api/v1/other")
        .body(Body::empty())
        .expect("build request");
    let response = dispatch_request(state, unknown).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
