//! `POST /recommendations/index`, `POST /recommendations/{user_id}`,
//! `GET /recommendations/{user_id}`, `GET /recommendations/status`.
//!
//! `POST /recommendations/{user_id}` races the workflow against a
//! cart-load budget: if the workflow hasn't finished by the budget, the
//! handler hands the remainder to a detached task and answers `202` so
//! the storefront can fall back to polling the `GET` endpoint, mirroring
//! the cart page's own best-effort wait.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{extract::Path, extract::State, http::StatusCode, response::IntoResponse, Json};
use churn_catalog::Product;
use churn_core::error::ErrorCode;
use churn_features::CartItemRef;
use churn_workflows::{missing_index_error, read_cached};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize, Default)]
pub struct IndexRequest {
    #[serde(default)]
    pub products: Option<Vec<Product>>,
}

#[utoipa::path(
    post,
    path = "/recommendations/index",
    request_body = Object,
    responses((status = 200, description = "Catalog indexed", body = Object)),
    tag = "recommendations"
)]
pub async fn reindex(State(state): State<AppState>, Json(request): Json<IndexRequest>) -> Result<impl IntoResponse, ApiError> {
    let products = match request.products {
        Some(products) => products,
        None => fetch_storefront_catalog(&state).await?,
    };

    let indexed = state.index.index_products(&products).await?;
    state.mark_index_ready();

    Ok(Json(json!({"status": "ok", "indexed_count": indexed})))
}

async fn fetch_storefront_catalog(state: &AppState) -> Result<Vec<Product>, ApiError> {
    let url = format!("{}/api/products?limit=1000", state.config.storefront.api_url);
    let http = reqwest::Client::new();
    let response = http
        .get(&url)
        .timeout(Duration::from_secs(state.config.storefront.timeout_seconds))
        .send()
        .await
        .map_err(|e| churn_core::Error::new(ErrorCode::StorefrontUnavailable, "failed to reach storefront catalog").with_details(e.to_string()))?;

    if !response.status().is_success() {
        return Err(churn_core::Error::new(ErrorCode::StorefrontUnavailable, format!("storefront returned status {}", response.status())).into());
    }

    response
        .json::<Vec<Product>>()
        .await
        .map_err(|e| churn_core::Error::new(ErrorCode::StorefrontUnavailable, "storefront catalog response was not valid JSON").with_details(e.to_string()).into())
}

#[derive(Debug, Deserialize, Default)]
pub struct RecommendationsRequest {
    #[serde(default)]
    pub cart_items: Vec<CartItemRef>,
}

#[utoipa::path(
    post,
    path = "/recommendations/{user_id}",
    request_body = Object,
    responses(
        (status = 200, description = "Ranked, discounted recommendations", body = Object),
        (status = 202, description = "Still computing, poll the GET endpoint", body = Object),
        (status = 503, description = "Product index not yet built"),
    ),
    tag = "recommendations"
)]
pub async fn generate(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<RecommendationsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.index_ready() {
        return Err(missing_index_error().into());
    }

    let budget = Duration::from_millis(state.config.server.cart_load_budget_ms);
    let workflow = state.recommendations_workflow.clone();
    let task_user_id = user_id.clone();
    let task_cart_items = request.cart_items.clone();

    let handle = tokio::spawn(async move { workflow.run(&task_user_id, task_cart_items).await });

    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(Ok(state))) => {
            if let Some(record) = state.record {
                Ok((StatusCode::OK, Json(json!({
                    "user_id": record.user_id,
                    "recommendations": record.recommendations,
                    "churn_risk": record.churn_risk,
                    "churn_probability": record.churn_probability,
                    "generated_at": record.generated_at,
                    "source": "generated",
                }))))
            } else {
                Err(churn_core::Error::new(ErrorCode::NotFound, "no features on record for user")
                    .with_details(state.error.unwrap_or_default())
                    .into())
            }
        }
        Ok(Ok(Err(e))) => Err(e.into()),
        Ok(Err(join_err)) => Err(churn_core::Error::new(ErrorCode::InternalError, "recommendations task panicked").with_details(join_err.to_string()).into()),
        Err(_) => {
            warn!(user_id, "recommendations still computing past cart-load budget, detaching");
            Ok((StatusCode::ACCEPTED, Json(json!({"status": "processing", "user_id": user_id}))))
        }
    }
}

#[utoipa::path(
    get,
    path = "/recommendations/{user_id}",
    responses(
        (status = 200, description = "Cached recommendations", body = Object),
        (status = 404, description = "Nothing cached yet for this user"),
    ),
    tag = "recommendations"
)]
pub async fn get_cached(State(state): State<AppState>, Path(user_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let record = read_cached(&*state.value_store, &user_id)
        .await?
        .ok_or_else(|| churn_core::Error::new(ErrorCode::NotFound, "no cached recommendations for user"))?;

    Ok(Json(json!({
        "user_id": record.user_id,
        "recommendations": record.recommendations,
        "churn_risk": record.churn_risk,
        "churn_probability": record.churn_probability,
        "generated_at": record.generated_at,
        "source": "cached",
    })))
}

#[utoipa::path(
    get,
    path = "/recommendations/status",
    responses((status = 200, description = "Indexing and vector-store readiness", body = Object)),
    tag = "recommendations"
)]
pub async fn status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let product_count = state.index.product_count().await?;
    Ok(Json(json!({
        "index_ready": state.index_ready(),
        "indexed_product_count": product_count,
    })))
}
