//! `GET /metrics` — intentionally unimplemented. Telemetry export is out
//! of scope; the registry still records counters internally for any
//! future scrape endpoint.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "error": {
                "code": "NOT_IMPLEMENTED",
                "message": "metrics export is not exposed by this service",
            }
        })),
    )
}
