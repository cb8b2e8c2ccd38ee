//! HTTP boundary for the vision engine.
//!
//! Validates request bodies, calls the engine and maps [`VisionError`]s onto
//! status codes: `UNKNOWN_ERROR` becomes a 500, every other code a 400.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, OriginalUri, State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
};

use crate::{
    config::Settings,
    engine::VisionEngine,
    error::VisionError,
    model::VisionModel,
    request::ImageInput,
};

pub mod messages;
pub mod middleware;

use messages::{
    AnalyzeRequest, ErrorEnvelope, ExtractTextResponse, HealthResponse, ImageRequest,
    SuccessEnvelope, image_preview,
};
use middleware::RateLimiter;

pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const SERVICE_NAME: &str = "Math Notes API";

/// Builds the full application router.
pub fn router<M: VisionModel + 'static>(
    engine: Arc<VisionEngine<M>>,
    settings: &Settings,
) -> Router {
    let limiter = Arc::new(RateLimiter::new(&settings.rate_limit));

    // unknown /api paths are answered inside the limiter so they still count
    let api = Router::new()
        .nest("/vision", vision_routes(engine))
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit,
        ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api", api)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&settings.cors_origins))
        .layer(security_header(header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .layer(security_header(header::X_FRAME_OPTIONS, "SAMEORIGIN"))
        .layer(security_header(header::REFERRER_POLICY, "no-referrer"))
        .layer(security_header(header::X_DNS_PREFETCH_CONTROL, "off"))
        .layer(axum::middleware::from_fn(middleware::log_requests))
}

/// The `/api/vision` routes on their own, without the outer middleware.
pub fn vision_routes<M: VisionModel + 'static>(engine: Arc<VisionEngine<M>>) -> Router {
    Router::new()
        .route("/health", get(vision_health))
        .route("/analyze", post(analyze::<M>))
        .route("/extract-text", post(extract_text::<M>))
        .route("/analyze-math", post(analyze_math::<M>))
        .with_state(engine)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorEnvelope::new(message, None)),
    )
        .into_response()
}

fn error_response(err: &VisionError, fallback: &str) -> Response {
    let status = if err.is_server_error() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_REQUEST
    };

    let message = err.to_string();
    let message = if message.is_empty() {
        fallback.to_string()
    } else {
        message
    };

    (
        status,
        Json(ErrorEnvelope::new(message, Some(err.code().to_string()))),
    )
        .into_response()
}

fn rejection_response(rejection: JsonRejection) -> Response {
    log::debug!("rejected request body: {rejection}");
    (
        rejection.status(),
        Json(ErrorEnvelope::new(rejection.body_text(), None)),
    )
        .into_response()
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "Math Notes API Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "vision": {
                "analyze": "POST /api/vision/analyze",
                "extractText": "POST /api/vision/extract-text",
                "analyzeMath": "POST /api/vision/analyze-math",
                "health": "GET /api/vision/health"
            }
        }
    }))
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        success: true,
        service: SERVICE_NAME.to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        status: "healthy".to_string(),
        timestamp: timestamp(),
    })
}

async fn vision_health() -> impl IntoResponse {
    Json(HealthResponse {
        success: true,
        service: "Vision API".to_string(),
        version: None,
        status: "healthy".to_string(),
        timestamp: timestamp(),
    })
}

async fn not_found(method: Method, OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorEnvelope::new(
            format!("Route {} {} not found", method, uri.path()),
            None,
        )),
    )
}

async fn analyze<M: VisionModel + 'static>(
    State(engine): State<Arc<VisionEngine<M>>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    let Some(image) = payload.image.filter(|image| !image.is_empty()) else {
        return bad_request("Image is required. Provide image URL or base64 string.");
    };
    let Some(prompt) = payload.prompt.filter(|prompt| !prompt.is_empty()) else {
        return bad_request("Prompt is required.");
    };

    match engine
        .analyze(&image, &prompt, payload.options.unwrap_or_default())
        .await
    {
        Ok(result) => Json(SuccessEnvelope::new(result)).into_response(),
        Err(err) => {
            log::debug!("analyze image error: {err}");
            error_response(&err, "Failed to analyze image")
        }
    }
}

async fn extract_text<M: VisionModel + 'static>(
    State(engine): State<Arc<VisionEngine<M>>>,
    payload: Result<Json<ImageRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    let Some(image) = payload.image.filter(|image| !image.is_empty()) else {
        return bad_request("Image is required.");
    };

    let preview = image_preview(&image);
    match engine.extract_text(&ImageInput::Single(image)).await {
        Ok(text) => Json(SuccessEnvelope::new(ExtractTextResponse {
            text,
            image: preview,
        }))
        .into_response(),
        Err(err) => {
            log::debug!("extract text error: {err}");
            error_response(&err, "Failed to extract text")
        }
    }
}

async fn analyze_math<M: VisionModel + 'static>(
    State(engine): State<Arc<VisionEngine<M>>>,
    payload: Result<Json<ImageRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    let Some(image) = payload.image.filter(|image| !image.is_empty()) else {
        return bad_request("Image is required.");
    };

    match engine.analyze_math(&ImageInput::Single(image)).await {
        Ok(result) => Json(SuccessEnvelope::new(result)).into_response(),
        Err(err) => {
            log::debug!("analyze math problem error: {err}");
            error_response(&err, "Failed to analyze math problem")
        }
    }
}
