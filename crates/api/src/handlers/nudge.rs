//! `GET /nudge/rules`, `GET /nudge/rules/{id}`, `GET /nudge/test/{user_id}`
//! — introspection over the static rule table plus a matcher simulator.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use churn_core::error::ErrorCode;
use churn_nudge::NUDGE_RULES;
use serde::Deserialize;
use serde_json::json;

#[utoipa::path(
    get,
    path = "/nudge/rules",
    responses((status = 200, description = "Full nudge rule table", body = Object)),
    tag = "nudge"
)]
pub async fn list_rules() -> impl IntoResponse {
    Json(json!({ "rules": NUDGE_RULES.as_slice() }))
}

#[utoipa::path(
    get,
    path = "/nudge/rules/{id}",
    responses(
        (status = 200, description = "A single nudge rule", body = Object),
        (status = 404, description = "No rule with that id"),
    ),
    tag = "nudge"
)]
pub async fn get_rule(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let rule = NUDGE_RULES
        .iter()
        .find(|r| r.rule_id == id)
        .ok_or_else(|| churn_core::Error::new(ErrorCode::NotFound, "no nudge rule with that id"))?;

    Ok(Json(json!(rule)))
}

#[derive(Debug, Deserialize)]
pub struct NudgeTestParams {
    pub churn_probability: f64,
    #[serde(default)]
    pub churn_reasons: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/nudge/test/{user_id}",
    responses((status = 200, description = "Simulated rule match for the given probability and reasons", body = Object)),
    tag = "nudge"
)]
pub async fn test_match(
    State(_state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<NudgeTestParams>,
) -> impl IntoResponse {
    let matched = churn_nudge::find_matching_rule(params.churn_probability, &params.churn_reasons);

    Json(json!({
        "user_id": user_id,
        "churn_probability": params.churn_probability,
        "churn_reasons": params.churn_reasons,
        "rule_matched": matched.map(|r| r.rule_id),
    }))
}
