//! # Security Headers Middleware
//!
//! Adds the fixed set of response headers the churn API serves on every
//! route: HSTS, a locked-down CSP, clickjacking/MIME-sniffing protection,
//! and a conservative `Permissions-Policy`. There is no per-environment
//! variant — the API has no browser-facing dev mode, so one policy covers
//! every deployment.

use axum::{extract::Request, http::header, http::HeaderValue, middleware::Next, response::Response};
use tracing::debug;

const HSTS: &str = "max-age=31536000; includeSubDomains; preload";
const CSP: &str = "default-src 'self'; script-src 'self'; style-src 'self'; img-src 'self' data: https:; font-src 'self'; connect-src 'self'; frame-ancestors 'none'; base-uri 'self'; form-action 'self'";
const PERMISSIONS_POLICY: &str =
    "accelerometer=(), camera=(), geolocation=(), gyroscope=(), magnetometer=(), microphone=(), payment=(), usb=()";

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS));
    headers.insert(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("strict-origin-when-cross-origin"));
    headers.insert("permissions-policy", HeaderValue::from_static(PERMISSIONS_POLICY));
    headers.insert("x-xss-protection", HeaderValue::from_static("1; mode=block"));
    headers.remove(header::SERVER);

    debug!("added security headers to response");
    response
}
