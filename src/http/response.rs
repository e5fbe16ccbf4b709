//! HTTP response building helpers
//!
//! Every handler returns `HandlerResult`; errors become `{"error": message}`
//! through `error_response`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::AppError;

pub type HttpResponse = Response<Full<Bytes>>;

/// Result type alias for handlers
pub type HandlerResult = Result<HttpResponse, AppError>;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

pub fn ok<T: Serialize>(body: &T) -> HttpResponse {
    json_response(StatusCode::OK, body)
}

pub fn created<T: Serialize>(body: &T) -> HttpResponse {
    json_response(StatusCode::CREATED, body)
}

pub fn no_content() -> HttpResponse {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

pub fn not_found(path: &str) -> HttpResponse {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": format!("No route for {}", path) }),
    )
}

pub fn method_not_allowed() -> HttpResponse {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method not allowed" }),
    )
}

/// Binary body with the given content type
pub fn binary_response(content_type: &str, body: Vec<u8>) -> HttpResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Convert an `AppError` to its HTTP response
pub fn error_response(err: AppError) -> HttpResponse {
    let status = err.status_code();
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    }
    json_response(status, &serde_json::json!({ "error": err.public_message() }))
}

/// CORS preflight answer
pub fn preflight() -> HttpResponse {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(header::ACCESS_CONTROL_MAX_AGE, "86400")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Stamp CORS headers onto any response
pub fn with_cors(mut response: HttpResponse, origin: &str) -> HttpResponse {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    if origin != "*" {
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_status() {
        let resp = error_response(AppError::NotFound("Animal 3 not found".into()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = error_response(AppError::PayloadTooLarge("too big".into()));
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_cors_headers() {
        let resp = with_cors(preflight(), "https://app.example.com");
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://app.example.com"
        );
        assert_eq!(resp.headers().get(header::VARY).unwrap(), "Origin");

        let resp = with_cors(ok(&serde_json::json!({"ok": true})), "*");
        assert_eq!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert!(resp.headers().get(header::VARY).is_none());
    }
}
