//! Convenience constructors tying `ApiError` to the request id the
//! request-id middleware attaches to each request's extensions.

use crate::api_middleware::RequestId;
use crate::error::ApiError;
use churn_core::Error;

pub fn create_api_error(error: Error) -> ApiError {
    ApiError::new(error)
}

/// Attaches the request id the middleware stashed in the request's
/// extensions, when the handler picked it up via an `Extension<RequestId>`
/// extractor.
pub fn create_api_error_with_request_id(error: Error, request_id: Option<&RequestId>) -> ApiError {
    let mut api_error = ApiError::new(error);
    if let Some(request_id) = request_id {
        api_error = api_error.with_request_id(request_id.0.clone());
    }
    api_error
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_core::ErrorCode;

    #[test]
    fn create_api_error_preserves_debug_message() {
        let error = Error::new(ErrorCode::ValidationFailed, "bad input");
        let api_error = create_api_error(error);
        assert!(format!("{api_error:?}").contains("bad input"));
    }
}
