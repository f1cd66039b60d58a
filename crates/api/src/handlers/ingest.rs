//! `POST /ingest/{family}` — upsert a partial feature record into the
//! feature store (C2).

use crate::api_middleware::RequestId;
use crate::error::ApiError;
use crate::error_handler::create_api_error_with_request_id;
use crate::state::AppState;
use axum::{extract::Extension, extract::Path, extract::State, response::IntoResponse, Json};
use churn_core::{Error, ErrorCode};
use churn_features::FeatureFamily;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub fields: Value,
}

#[utoipa::path(
    post,
    path = "/ingest/{family}",
    request_body = Object,
    responses((status = 200, description = "Feature record upserted", body = Object), (status = 400, description = "Unknown family or missing user_id")),
    tag = "features"
)]
pub async fn ingest_family(
    State(state): State<AppState>,
    Path(family): Path<String>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let family = FeatureFamily::from_str(&family).map_err(|e| {
        create_api_error_with_request_id(
            Error::new(ErrorCode::InvalidInput, "unknown feature family").with_details(e),
            Some(&request_id),
        )
    })?;

    if request.user_id.trim().is_empty() {
        return Err(Error::new(ErrorCode::ValidationFailed, "user_id is required").into());
    }

    let mut fields = request.fields;
    if let Value::Object(map) = &mut fields {
        map.remove("user_id");
    }

    state.features.ingest(&request.user_id, family, fields).await?;

    Ok(Json(json!({"status": "ok", "user_id": request.user_id, "family": family.as_str()})))
}
