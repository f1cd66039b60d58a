use serde::{Deserialize, Serialize};

/// Standardized error codes for the churn platform.
///
/// Business-agnostic technical categories, grouped the way the rest of the
/// platform groups its feature families: general, storage, network, model,
/// validation, resource, workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // General (1000-1999)
    InternalError = 1000,
    ConfigurationError = 1001,
    ServiceUnavailable = 1002,
    Timeout = 1003,

    // Storage / KV store (2000-2999)
    KvStoreConnectionError = 2000,
    KvStoreWriteError = 2001,
    KvStoreReadError = 2002,

    // Network & downstream collaborators (3000-3999)
    StorefrontUnavailable = 3000,
    LlmUnavailable = 3001,
    LlmTruncated = 3002,
    EmbeddingServiceUnavailable = 3003,

    // Model (4000-4999)
    ModelMissing = 4000,
    ModelInferenceError = 4001,

    // Validation (5000-5999)
    ValidationFailed = 5000,
    InvalidInput = 5001,

    // Resource (6000-6999)
    NotFound = 6000,
    IndexNotReady = 6001,

    // Workflow (7000-7999)
    WorkflowStepError = 7000,
    CheckpointWriteFailed = 7001,
}

impl ErrorCode {
    /// HTTP status this error code renders as at the API boundary.
    pub fn http_status(&self) -> u16 {
        use ErrorCode::*;
        match self {
            InternalError | ConfigurationError | ModelInferenceError | WorkflowStepError => 500,
            ServiceUnavailable | StorefrontUnavailable | LlmUnavailable
            | EmbeddingServiceUnavailable | IndexNotReady => 503,
            Timeout => 504,
            KvStoreConnectionError | KvStoreWriteError | KvStoreReadError => 500,
            LlmTruncated | CheckpointWriteFailed => 500,
            ModelMissing => 500,
            ValidationFailed | InvalidInput => 400,
            NotFound => 404,
        }
    }

    /// Coarse category, used for metrics labels and log grouping.
    pub fn category(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            InternalError | ConfigurationError | ServiceUnavailable | Timeout => "system",
            KvStoreConnectionError | KvStoreWriteError | KvStoreReadError => "storage",
            StorefrontUnavailable | LlmUnavailable | LlmTruncated | EmbeddingServiceUnavailable => {
                "network"
            }
            ModelMissing | ModelInferenceError => "model",
            ValidationFailed | InvalidInput => "validation",
            NotFound | IndexNotReady => "resource",
            WorkflowStepError | CheckpointWriteFailed => "workflow",
        }
    }

    /// Whether callers may safely retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::KvStoreConnectionError
                | ErrorCode::StorefrontUnavailable
                | ErrorCode::LlmUnavailable
                | ErrorCode::EmbeddingServiceUnavailable
                | ErrorCode::ServiceUnavailable
                | ErrorCode::Timeout
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
