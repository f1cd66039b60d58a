//! `POST /messages/custom` — generate (and optionally persist) a
//! personalized message outside the nudge-trigger flow.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use churn_nudge::persistence::persist_message;
use churn_nudge::{messages::to_record, MessageContext};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CustomMessageRequest {
    pub user_id: String,
    pub churn_probability: f64,
    #[serde(default)]
    pub churn_reasons: Vec<String>,
    #[serde(default)]
    pub user_features: Option<Value>,
    #[serde(default)]
    pub persist: bool,
}

#[utoipa::path(
    post,
    path = "/messages/custom",
    request_body = Object,
    responses((status = 200, description = "Generated message", body = Object)),
    tag = "messages"
)]
pub async fn generate_custom_message(
    State(state): State<AppState>,
    Json(request): Json<CustomMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let context = context_from_features(request.user_features.as_ref());
    let seed = (request.churn_probability * 1000.0) as usize + request.churn_reasons.len();

    let content = state
        .nudge
        .message_generator()
        .generate(&context, &request.churn_reasons, seed)
        .await?;

    let message_id = format!("msg_{}", &Uuid::new_v4().simple().to_string()[..8]);

    if request.persist {
        let record = to_record(
            &message_id,
            &request.user_id,
            &content,
            request.churn_probability,
            &request.churn_reasons,
            request.user_features.clone(),
            "sms",
            "custom",
            None,
        );
        persist_message(state.nudge.kv(), &request.user_id, &message_id, record).await?;
    }

    Ok(Json(json!({
        "user_id": request.user_id,
        "message_id": message_id,
        "content": content,
        "persisted": request.persist,
    })))
}

fn context_from_features(features: Option<&Value>) -> MessageContext {
    let mut context = MessageContext::default();
    let Some(Value::Object(map)) = features else {
        return context;
    };
    context.name = map.get("name").and_then(|v| v.as_str()).map(String::from);
    context.age = map.get("age").and_then(|v| v.as_i64());
    context.cart_item_name = map.get("cart_item_name").and_then(|v| v.as_str()).map(String::from);
    context.loyalty_tier = map.get("loyalty_tier").and_then(|v| v.as_str()).map(String::from);
    context.orders_6m = map.get("orders_6m").and_then(|v| v.as_i64());
    context.avg_order_val = map.get("avg_order_val").and_then(|v| v.as_f64());
    context.days_last_purch = map.get("days_last_purch").and_then(|v| v.as_i64());
    context
}
