//! Router tests driven with `tower::ServiceExt::oneshot` against a stub model.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tower::ServiceExt;
use vision_relay::{
    InvocationError, InvocationRequest, InvocationResult, Settings, VisionEngine, VisionModel,
    config::{DashScopeSettings, RateLimitSettings, ServerSettings},
    engine::{EXTRACT_TEXT_PROMPT, MATH_PROBLEM_PROMPT},
    server,
};

enum Reply {
    Text(&'static str),
    ByPrompt,
    Fail(Option<&'static str>),
}

struct StubModel {
    reply: Reply,
    calls: Mutex<Vec<InvocationRequest>>,
}

#[async_trait]
impl VisionModel for StubModel {
    fn model_id(&self) -> &str {
        "stub-vl"
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationResult, InvocationError> {
        let content = match &self.reply {
            Reply::Text(text) => text.to_string(),
            Reply::ByPrompt if request.prompt() == MATH_PROBLEM_PROMPT => "structured".to_string(),
            Reply::ByPrompt if request.prompt() == EXTRACT_TEXT_PROMPT => "transcribed".to_string(),
            Reply::ByPrompt => request.prompt().to_string(),
            Reply::Fail(code) => {
                return Err(InvocationError::new(
                    "remote said no",
                    code.map(str::to_string),
                    Some(json!({ "error": { "message": "remote said no" } })),
                ));
            }
        };
        self.calls.lock().unwrap().push(request);

        Ok(InvocationResult {
            content,
            model: "stub-vl-0001".to_string(),
            usage: Some(json!({ "total_tokens": 3 })),
            raw_response: json!({ "id": "stub" }),
        })
    }
}

fn settings(max_requests: u32) -> Settings {
    Settings {
        dashscope: DashScopeSettings {
            api_key: String::new(),
            base_url: "http://unused".to_string(),
            vision_model: "stub-vl".to_string(),
            request_timeout: None,
        },
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
        },
        cors_origins: vec!["http://localhost:3000".to_string()],
        rate_limit: RateLimitSettings {
            window: Duration::from_secs(60),
            max_requests,
        },
    }
}

fn app_with(reply: Reply, max_requests: u32) -> (Router, Arc<VisionEngine<StubModel>>) {
    let engine = Arc::new(VisionEngine::new(StubModel {
        reply,
        calls: Mutex::new(Vec::new()),
    }));
    (server::router(engine.clone(), &settings(max_requests)), engine)
}

fn app(reply: Reply) -> Router {
    app_with(reply, 100).0
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn analyze_returns_result_envelope() {
    let (status, body) = send(
        app(Reply::Text("a red square")),
        post_json(
            "/api/vision/analyze",
            json!({ "image": "https://a.example/x.png", "prompt": "describe" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": true,
            "data": {
                "content": "a red square",
                "model": "stub-vl-0001",
                "usage": { "total_tokens": 3 },
                "rawResponse": { "id": "stub" }
            }
        })
    );
}

#[tokio::test]
async fn analyze_accepts_image_list_and_options() {
    let (app, engine) = app_with(Reply::Text("ok"), 100);
    let (status, _) = send(
        app,
        post_json(
            "/api/vision/analyze",
            json!({
                "image": ["https://a.example/1.png", "QUJD"],
                "prompt": "compare",
                "options": { "max_tokens": 32 }
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let calls = engine.model().calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].image_urls().collect::<Vec<_>>(),
        vec!["https://a.example/1.png", "data:image/jpeg;base64,QUJD"]
    );
    assert_eq!(calls[0].options()["max_tokens"], 32);
}

#[tokio::test]
async fn analyze_requires_image_then_prompt() {
    let (status, body) = send(
        app(Reply::Text("unused")),
        post_json("/api/vision/analyze", json!({ "prompt": "describe" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "success": false,
            "error": "Image is required. Provide image URL or base64 string."
        })
    );

    let (status, body) = send(
        app(Reply::Text("unused")),
        post_json("/api/vision/analyze", json!({ "image": "QUJD", "prompt": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Prompt is required.");
}

#[tokio::test]
async fn empty_image_list_is_a_client_error() {
    let (status, body) = send(
        app(Reply::Text("unused")),
        post_json("/api/vision/analyze", json!({ "image": [], "prompt": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_IMAGES");
}

#[tokio::test]
async fn invalid_image_is_a_client_error() {
    let (status, body) = send(
        app(Reply::Text("unused")),
        post_json(
            "/api/vision/analyze",
            json!({ "image": "ftp://a.example/x.png", "prompt": "hi" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "success": false,
            "error": "Invalid image input format. Expected URL or base64 string.",
            "code": "INVALID_IMAGE_FORMAT"
        })
    );
}

#[tokio::test]
async fn unknown_remote_failure_is_a_server_error() {
    let (status, body) = send(
        app(Reply::Fail(None)),
        post_json("/api/vision/analyze", json!({ "image": "QUJD", "prompt": "hi" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "success": false, "error": "remote said no", "code": "UNKNOWN_ERROR" })
    );
}

#[tokio::test]
async fn classified_remote_failure_is_a_client_error() {
    for uri in [
        "/api/vision/analyze",
        "/api/vision/extract-text",
        "/api/vision/analyze-math",
    ] {
        let (status, body) = send(
            app(Reply::Fail(Some("RATE_LIMITED"))),
            post_json(uri, json!({ "image": "QUJD", "prompt": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["code"], "RATE_LIMITED", "{uri}");
    }
}

#[tokio::test]
async fn extract_text_returns_text_and_preview() {
    let image = "A".repeat(150);
    let (status, body) = send(
        app(Reply::Text("第一行\n第二行")),
        post_json("/api/vision/extract-text", json!({ "image": image })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["text"], "第一行\n第二行");
    assert_eq!(body["data"]["image"], format!("{}...", "A".repeat(100)));
}

#[tokio::test]
async fn extract_text_requires_image() {
    let (status, body) = send(
        app(Reply::Text("unused")),
        post_json("/api/vision/extract-text", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Image is required.");
}

#[tokio::test]
async fn analyze_math_merges_both_invocations() {
    let (app, engine) = app_with(Reply::ByPrompt, 100);
    let (status, body) = send(
        app,
        post_json("/api/vision/analyze-math", json!({ "image": "https://a.example/q.png" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["content"], "structured");
    assert_eq!(body["data"]["extractedText"], "transcribed");
    assert_eq!(body["data"]["model"], "stub-vl-0001");
    assert_eq!(engine.model().calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_json_uses_error_envelope() {
    let req = Request::builder()
        .method("POST")
        .uri("/api/vision/analyze")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let (status, body) = send(app(Reply::Text("unused")), req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn health_endpoints() {
    let (status, body) = send(app(Reply::Text("unused")), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "Math Notes API");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["timestamp"].as_str().is_some_and(|t| t.ends_with('Z')));

    let (status, body) = send(app(Reply::Text("unused")), get("/api/vision/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "Vision API");
    assert!(body.get("version").is_none());
}

#[tokio::test]
async fn root_lists_endpoints() {
    let (status, body) = send(app(Reply::Text("unused")), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["endpoints"]["vision"]["analyzeMath"],
        "POST /api/vision/analyze-math"
    );
}

#[tokio::test]
async fn unknown_route_is_404_envelope() {
    let (status, body) = send(app(Reply::Text("unused")), get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({ "success": false, "error": "Route GET /nope not found" })
    );
}

#[tokio::test]
async fn security_headers_are_set() {
    let response = app(Reply::Text("unused")).oneshot(get("/health")).await.unwrap();
    let headers = response.headers();
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
}

#[tokio::test]
async fn api_routes_are_rate_limited() {
    let (app, _) = app_with(Reply::Text("ok"), 2);

    for expected_remaining in ["1", "0"] {
        let response = app.clone().oneshot(get("/api/vision/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["ratelimit-remaining"], expected_remaining);
    }

    let (status, body) = send(app.clone(), get("/api/vision/health")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body["error"],
        "Too many requests from this IP, please try again later."
    );

    // unknown api paths are counted too
    let (status, _) = send(app.clone(), get("/api/unknown")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // top-level routes are outside the limiter
    let (status, _) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_api_route_counts_against_the_limit() {
    let (app, _) = app_with(Reply::Text("ok"), 1);

    let response = app.clone().oneshot(get("/api/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["ratelimit-remaining"], "0");

    let (status, _) = send(app.clone(), get("/api/vision/health")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn unknown_api_route_reports_full_path() {
    let (status, body) = send(app(Reply::Text("unused")), get("/api/vision/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Route GET /api/vision/nope not found");
}

#[tokio::test]
async fn missing_usage_is_left_out_of_the_envelope() {
    let engine = Arc::new(VisionEngine::new(NoUsageModel));
    let app = server::router(engine, &settings(100));
    let (status, body) = send(
        app,
        post_json("/api/vision/analyze", json!({ "image": "QUJD", "prompt": "hi" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].get("usage").is_none());
}

struct NoUsageModel;

#[async_trait]
impl VisionModel for NoUsageModel {
    fn model_id(&self) -> &str {
        "stub-vl"
    }

    async fn invoke(&self, _request: InvocationRequest) -> Result<InvocationResult, InvocationError> {
        Ok(InvocationResult {
            content: "ok".to_string(),
            model: "stub-vl".to_string(),
            usage: None,
            raw_response: json!({ "choices": [] }),
        })
    }
}
