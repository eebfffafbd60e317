//! Integration tests for the relay endpoint
//!
//! The router is driven in-process with a stub model standing in for the
//! hosted vision service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use image_insights::model::{CachePolicy, ModelError, ModelRequest, Role, VisionModel};
use image_insights::{router, AppState};

const BOUNDARY: &str = "insights-test-boundary";

/// Fails the first `failures` calls, then answers with `reply`.
struct StubModel {
    reply: String,
    failures: usize,
    calls: AtomicUsize,
    seen: Mutex<Vec<ModelRequest>>,
}

impl StubModel {
    fn answering(reply: &str) -> Arc<Self> {
        Self::failing_first(0, reply)
    }

    fn failing_first(failures: usize, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            failures,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn run(&self, request: ModelRequest) -> Result<String, ModelError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request);
        if n < self.failures {
            return Err(ModelError::Status {
                status: 502,
                body: "upstream exploded".into(),
            });
        }
        Ok(self.reply.clone())
    }
}

enum FormPart<'a> {
    File(&'a str, &'a str, &'a [u8]),
    Text(&'a str, &'a str),
}

fn multipart_body(parts: &[FormPart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            FormPart::File(name, mime, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"upload.png\"\r\nContent-Type: {mime}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            FormPart::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn app(model: Arc<StubModel>) -> Router {
    let cache = CachePolicy {
        enabled: true,
        ttl: Duration::from_secs(600),
    };
    router(AppState::new(model, cache), true)
}

async fn post(app: &Router, parts: &[FormPart<'_>]) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/insights")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

const IMAGE: &[u8] = b"\x89PNG\r\n\x1a\nnot-really-a-png";

#[tokio::test]
async fn test_insights_variant_relays_image_and_parameters() {
    let model = StubModel::answering("A red bicycle leaning on a wall.");
    let app = app(model.clone());

    let (status, body) = post(
        &app,
        &[
            FormPart::File("image", "image/png", IMAGE),
            FormPart::Text("language", "spanish"),
            FormPart::Text("length", "long"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["insights"], "A red bicycle leaning on a wall.");
    assert_eq!(model.calls(), 1);

    let seen = model.seen.lock().unwrap();
    let request = &seen[0];
    assert_eq!(request.image, IMAGE);
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].role, Role::System);
    assert!(request.messages[1].content.contains("Spanish"));
    assert!(request.messages[1].content.contains("long"));
    assert_eq!(request.decoding.max_tokens, 512);
    assert_eq!(request.decoding.temperature, 0.0);
    assert_eq!(request.cache.ttl, Duration::from_secs(600));
    assert!(request.cache.enabled);
}

#[tokio::test]
async fn test_question_variant_passes_question_verbatim() {
    let model = StubModel::answering("It is blue.");
    let app = app(model.clone());

    let (status, body) = post(
        &app,
        &[
            FormPart::Text("question", "What color is the sky here?"),
            FormPart::File("image", "image/jpeg", IMAGE),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["insights"], "It is blue.");

    let seen = model.seen.lock().unwrap();
    assert_eq!(seen[0].messages[1].content, "What color is the sky here?");
    assert_eq!(seen[0].decoding.max_tokens, 1024);
}

#[tokio::test]
async fn test_question_wins_over_language_fields() {
    let model = StubModel::answering("ok");
    let app = app(model.clone());

    let (status, _) = post(
        &app,
        &[
            FormPart::File("image", "image/png", IMAGE),
            FormPart::Text("language", "thai"),
            FormPart::Text("length", "short"),
            FormPart::Text("question", "How many cats?"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(model.seen.lock().unwrap()[0].decoding.max_tokens, 1024);
}

#[tokio::test]
async fn test_model_failure_returns_500_and_server_keeps_serving() {
    let model = StubModel::failing_first(1, "recovered");
    let app = app(model.clone());
    let parts = [
        FormPart::File("image", "image/png", IMAGE),
        FormPart::Text("language", "english"),
        FormPart::Text("length", "short"),
    ];

    let (status, body) = post(&app, &parts).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    // upstream detail stays in the server log
    assert!(!body["error"].as_str().unwrap().contains("exploded"));

    let (status, body) = post(&app, &parts).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["insights"], "recovered");
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_malformed_uploads_never_reach_the_model() {
    let model = StubModel::answering("unused");
    let app = app(model.clone());

    let cases: Vec<Vec<FormPart<'_>>> = vec![
        // no image
        vec![
            FormPart::Text("language", "english"),
            FormPart::Text("length", "short"),
        ],
        // empty image
        vec![
            FormPart::File("image", "image/png", b""),
            FormPart::Text("language", "english"),
            FormPart::Text("length", "short"),
        ],
        // unknown language
        vec![
            FormPart::File("image", "image/png", IMAGE),
            FormPart::Text("language", "latin"),
            FormPart::Text("length", "short"),
        ],
        // missing length
        vec![
            FormPart::File("image", "image/png", IMAGE),
            FormPart::Text("language", "french"),
        ],
        // blank question
        vec![
            FormPart::File("image", "image/png", IMAGE),
            FormPart::Text("question", "   "),
        ],
    ];

    for parts in &cases {
        let (status, body) = post(&app, parts).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.get("error").is_some());
        assert!(body.get("insights").is_none());
    }
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_non_multipart_body_is_a_server_error() {
    let model = StubModel::answering("unused");
    let app = app(model.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/api/insights")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from("garbage without any boundary"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_wrong_content_type_is_a_server_error() {
    let model = StubModel::answering("unused");
    let app = app(model.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/api/insights")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"language\":\"english\"}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_health_and_index_page() {
    let app = app(StubModel::answering("unused"));

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"OK");

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("/api/insights"));
    assert!(html.contains("accept=\"image/*\""));
}
