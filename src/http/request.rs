//! Request parsing helpers: bounded bodies, JSON/form decoding, query
//! strings, path ids and bearer authentication.

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap};
use hyper::{Request, Uri};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::auth::{extract_token_from_header, AuthUser};
use crate::error::AppError;
use crate::services::Services;

/// Largest JSON body accepted outside sync and photo uploads
pub const JSON_BODY_LIMIT: usize = 1024 * 1024;

/// Sync batches carry whole rows, so they get more room
pub const SYNC_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Run blocking service work off the async runtime
pub async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Collect a request body, failing with 413 past `limit` bytes
pub async fn read_body(req: Request<Incoming>, limit: usize) -> Result<(HeaderMap, Bytes), AppError> {
    let (parts, body) = req.into_parts();
    let too_large = || AppError::PayloadTooLarge(format!("request body exceeds {} bytes", limit));

    let declared = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(too_large());
    }

    let collected = Limited::new(body, limit).collect().await.map_err(|e| {
        if e.downcast_ref::<LengthLimitError>().is_some() {
            too_large()
        } else {
            AppError::InvalidInput(format!("Failed to read body: {}", e))
        }
    })?;
    Ok((parts.headers, collected.to_bytes()))
}

pub fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

pub fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(bytes).map_err(|e| AppError::InvalidInput(format!("Invalid JSON: {}", e)))
}

/// Decode JSON, or form-urlencoded when the client says so
pub fn parse_json_or_form<T: DeserializeOwned>(headers: &HeaderMap, bytes: &[u8]) -> Result<T, AppError> {
    if content_type(headers).starts_with("application/x-www-form-urlencoded") {
        serde_urlencoded::from_bytes(bytes).map_err(|e| AppError::InvalidInput(format!("Invalid form: {}", e)))
    } else {
        parse_json(bytes)
    }
}

/// A partial update body must be a JSON object
pub fn parse_patch(bytes: &[u8]) -> Result<Map<String, Value>, AppError> {
    match parse_json::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::InvalidInput("update body must be a JSON object".into())),
    }
}

pub fn parse_query<T: DeserializeOwned>(uri: &Uri) -> Result<T, AppError> {
    serde_urlencoded::from_str(uri.query().unwrap_or(""))
        .map_err(|e| AppError::InvalidInput(format!("Invalid query string: {}", e)))
}

pub fn parse_id(segment: &str) -> Result<i64, AppError> {
    segment
        .parse::<i64>()
        .map_err(|_| AppError::InvalidInput(format!("'{}' is not a valid id", segment)))
}

/// Resolve the bearer token on a request to the calling user
pub async fn authenticate(services: &Services, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let header_value = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = extract_token_from_header(header_value)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))?
        .to_string();
    let auth = std::sync::Arc::clone(&services.auth);
    blocking(move || auth.authenticate(&token)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::health_records::HealthQuery;
    use crate::services::auth_service::LoginRequest;
    use hyper::header::HeaderValue;

    #[test]
    fn test_parse_query_defaults_and_numbers() {
        let uri: Uri = "/api/v1/health-records?animal_id=4&product=ivo&limit=20".parse().unwrap();
        let query: HealthQuery = parse_query(&uri).unwrap();
        assert_eq!(query.animal_id, Some(4));
        assert_eq!(query.product.as_deref(), Some("ivo"));
        assert_eq!(query.limit, 20);
        assert_eq!(query.skip, 0);

        let uri: Uri = "/api/v1/health-records".parse().unwrap();
        let query: HealthQuery = parse_query(&uri).unwrap();
        assert_eq!(query.limit, 100);

        let uri: Uri = "/api/v1/health-records?animal_id=abc".parse().unwrap();
        assert!(parse_query::<HealthQuery>(&uri).is_err());
    }

    #[test]
    fn test_form_login() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let login: LoginRequest =
            parse_json_or_form(&headers, b"username=ana%40example.com&password=secreto1").unwrap();
        assert_eq!(login.email, "ana@example.com");

        let json: LoginRequest =
            parse_json_or_form(&HeaderMap::new(), br#"{"email":"b@x.co","password":"p"}"#).unwrap();
        assert_eq!(json.email, "b@x.co");
    }

    #[test]
    fn test_parse_patch_and_id() {
        assert!(parse_patch(br#"{"name":"Lola"}"#).is_ok());
        assert!(matches!(parse_patch(b"[1,2]"), Err(AppError::InvalidInput(_))));
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(parse_id("x1").is_err());
    }
}
