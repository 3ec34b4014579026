//! Request logging, panic recovery and CORS

use std::any::Any;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any as AnyOrigin, CorsLayer};
use uuid::Uuid;

use crate::observability::Event;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wraps `router` in the host's middleware stack, outermost first:
/// request log, panic recovery, CORS.
pub fn with_middleware(router: Router, cors_origins: &[String]) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(request_logger))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(cors_layer(cors_origins)),
    )
}

/// Logs one `HTTP_REQUEST` line per request and tags the response with a
/// request id.
pub async fn request_logger(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    Event::HttpRequest.emit(&[
        ("method", &method),
        ("path", &path),
        ("status", response.status().as_str()),
        ("latency_ms", &start.elapsed().as_millis().to_string()),
        ("request_id", &request_id),
    ]);
    response
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    Event::HttpPanic.emit(&[("panic", &detail)]);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
        .into_response()
}

/// Any origin when `origins` is empty, else exactly the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(AnyOrigin).allow_headers(AnyOrigin);
    if origins.is_empty() {
        layer.allow_origin(AnyOrigin)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|s| s.parse().ok()).collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
