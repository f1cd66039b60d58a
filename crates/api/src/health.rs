//! Liveness and workflow-configuration introspection endpoints.
//!
//! `/health` never depends on downstream collaborators — it answers
//! immediately so load balancers can use it for liveness. `/agent/status`
//! reports the configuration and readiness of the workflow runtime: the
//! two orchestration flags, whether the product index has been built, and
//! whether the KV store currently answers.

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is alive", body = Object)),
    tag = "health"
)]
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "churn-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[utoipa::path(
    get,
    path = "/agent/status",
    responses((status = 200, description = "Workflow configuration and readiness", body = Object)),
    tag = "health"
)]
pub async fn agent_status(State(state): State<AppState>) -> impl IntoResponse {
    let kv_reachable = state.kv.get("user_features", "__healthcheck__").await.is_ok();
    let product_count = state.index.product_count().await.unwrap_or(0);

    Json(json!({
        "use_workflow_orchestration": state.config.workflow.use_workflow_orchestration,
        "use_value_store": state.config.workflow.use_value_store,
        "kv_store_reachable": kv_reachable,
        "product_index_ready": state.index_ready(),
        "indexed_product_count": product_count,
        // The scorer is only ever constructed around a successfully loaded
        // model artifact, so reaching this handler implies it is loaded.
        "model_loaded": true,
    }))
}
