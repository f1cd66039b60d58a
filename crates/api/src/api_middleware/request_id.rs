//! # Request ID Middleware
//!
//! Generates or extracts a request identifier for distributed tracing and
//! log correlation, and echoes it back on the response.
//!
//! Recognized inbound headers (priority order): `x-request-id`,
//! `x-correlation-id`, `x-trace-id`, `request-id`. A fresh UUID is
//! generated when none is present or none validates.

use axum::{
    extract::Request,
    http::{header::HeaderValue, HeaderName, StatusCode},
    middleware::Next,
    response::Response,
};
use std::str::FromStr;
use tracing::{debug, Span};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id attached to a request's extensions by [`request_id_middleware`].
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub async fn request_id_middleware(mut request: Request, next: Next) -> Result<Response, StatusCode> {
    let request_id = extract_or_generate_request_id(&request);
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let span = Span::current();
    span.record("request_id", &request_id);

    let mut response = next.run(request).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(HeaderName::from_str(REQUEST_ID_HEADER).unwrap(), header_value);
    }

    debug!(request_id = %request_id, status = %response.status(), "request completed");
    Ok(response)
}

fn extract_or_generate_request_id(request: &Request) -> String {
    const CANDIDATE_HEADERS: &[&str] = &[REQUEST_ID_HEADER, "x-correlation-id", "x-trace-id", "request-id"];

    for header_name in CANDIDATE_HEADERS {
        if let Some(value) = request.headers().get(*header_name) {
            if let Ok(id_str) = value.to_str() {
                if is_valid_request_id(id_str) {
                    return id_str.to_string();
                }
            }
        }
    }

    Uuid::new_v4().to_string()
}

fn is_valid_request_id(id: &str) -> bool {
    if Uuid::from_str(id).is_ok() {
        return true;
    }
    id.len() <= 128 && id.len() >= 8 && id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

/// Extension trait for reading the request id back out of a request.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl RequestIdExt for Request {
    fn request_id(&self) -> Option<&str> {
        self.extensions().get::<RequestId>().map(|id| id.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn generates_a_request_id_when_none_is_supplied() {
        let app = Router::new()
            .route("/", get(|| async { "OK" }))
            .layer(axum::middleware::from_fn(request_id_middleware));

        let response = app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let request_id = response.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap();
        assert!(is_valid_request_id(request_id));
    }

    #[tokio::test]
    async fn preserves_an_existing_valid_request_id() {
        let existing_id = "test-request-id-12345";
        let app = Router::new()
            .route("/", get(|| async { "OK" }))
            .layer(axum::middleware::from_fn(request_id_middleware));

        let response = app
            .oneshot(Request::builder().uri("/").header(REQUEST_ID_HEADER, existing_id).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let returned_id = response.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap();
        assert_eq!(returned_id, existing_id);
    }

    #[test]
    fn validates_uuids_and_reasonable_alphanumeric_ids() {
        assert!(is_valid_request_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_valid_request_id("test-request-123"));
        assert!(!is_valid_request_id("abc"));
        assert!(!is_valid_request_id("test@request.id"));
    }
}
