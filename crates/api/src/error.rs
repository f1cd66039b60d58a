use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use churn_core::Error;
use serde_json::json;
use std::env;
use tracing::{error, warn};

/// API error wrapper: renders a `churn_core::Error` as an HTTP response,
/// logging at a level derived from the status code and, in production,
/// collapsing 5xx bodies down to a generic message plus the error id.
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    request_id: Option<String>,
    environment: String,
}

impl ApiError {
    pub fn new(error: Error) -> Self {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        Self { error, request_id: None, environment }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }

    fn log_error(&self) {
        let status_code = StatusCode::from_u16(self.error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match status_code.as_u16() {
            500..=599 => {
                error!(
                    error_code = ?self.error.code,
                    error_id = %self.error.context.error_id,
                    request_id = ?self.request_id,
                    "internal error: {}",
                    self.error
                );
            }
            400..=499 => {
                warn!(
                    error_code = ?self.error.code,
                    request_id = ?self.request_id,
                    "client error: {}",
                    self.error
                );
            }
            _ => {
                tracing::info!(error_code = ?self.error.code, request_id = ?self.request_id, "{}", self.error);
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::new(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = StatusCode::from_u16(self.error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.log_error();

        let mut body = self.error.to_api_response();
        if let Some(request_id) = &self.request_id {
            if let Some(error_obj) = body.get_mut("error") {
                error_obj["request_id"] = json!(request_id);
            }
        }

        if self.environment == "production" && status_code.is_server_error() {
            body = json!({
                "error": {
                    "code": self.error.code,
                    "message": "An internal error occurred. Please try again later.",
                    "error_id": self.error.context.error_id,
                    "request_id": self.request_id,
                }
            });
        }

        (status_code, Json(body)).into_response()
    }
}
