//! `POST /predict/{user_id}` — run the prediction workflow end-to-end.
//! `POST /predict/test` — diagnostic variant exposing per-step timings.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{extract::Path, extract::State, response::IntoResponse, Json};
use churn_core::utils::now_utc_iso;
use churn_core::{Error, ErrorCode};
use serde::Deserialize;
use serde_json::json;

#[utoipa::path(
    post,
    path = "/predict/{user_id}",
    responses(
        (status = 200, description = "Churn prediction and any triggered nudges", body = Object),
        (status = 404, description = "No features on record for user"),
    ),
    tag = "prediction"
)]
pub async fn predict(State(state): State<AppState>, Path(user_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.prediction_workflow.run(&user_id).await?;
    let prediction = outcome.state.churn_prediction.ok_or_else(|| {
        Error::new(ErrorCode::NotFound, "no features on record for user")
    })?;

    state.metrics.record_prediction(prediction.risk_segment.as_str());
    if let Some(outcome) = &outcome.state.nudge_outcome {
        if outcome.rule_matched != "none" {
            state.metrics.record_nudge(&outcome.rule_matched);
        }
    }

    Ok(Json(json!({
        "user_id": outcome.state.user_id,
        "churn_probability": prediction.churn_probability,
        "risk_segment": prediction.risk_segment.as_str(),
        "churn_reasons": prediction.churn_reasons,
        "confidence_score": prediction.confidence_score,
        "features_retrieved": outcome.state.user_features,
        "feature_freshness": outcome.state.feature_freshness,
        "prediction_timestamp": now_utc_iso(),
        "nudges_triggered": outcome.state.nudge_outcome.as_ref().map(|o| &o.nudges_triggered),
        "nudge_rule_matched": outcome.state.nudge_outcome.as_ref().map(|o| &o.rule_matched),
    })))
}

#[derive(Debug, Deserialize)]
pub struct PredictTestRequest {
    pub user_id: String,
}

#[utoipa::path(
    post,
    path = "/predict/test",
    request_body = Object,
    responses((status = 200, description = "Step timings and message trail", body = Object)),
    tag = "prediction"
)]
pub async fn predict_test(
    State(state): State<AppState>,
    Json(request): Json<PredictTestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.prediction_workflow.run(&request.user_id).await?;

    Ok(Json(json!({
        "user_id": outcome.state.user_id,
        "current_step": outcome.state.current_step,
        "completed": outcome.state.completed,
        "error": outcome.state.error,
        "messages": outcome.state.messages,
        "timings_ms": {
            "retrieve_features": outcome.timings.retrieve_features_ms,
            "predict_churn": outcome.timings.predict_churn_ms,
            "decide_nudge": outcome.timings.decide_nudge_ms,
            "generate_nudge": outcome.timings.generate_nudge_ms,
        },
    })))
}
