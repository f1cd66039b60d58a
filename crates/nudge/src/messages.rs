//! Personalized SMS-style message generation via an LLM client, with
//! rotating prompt templates branched on churn reason and persistence of
//! the generated message.

use churn_core::error::{Error, ErrorCode, Result};
use churn_core::utils::now_utc_iso;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub cart_item_name: Option<String>,
    pub loyalty_tier: Option<String>,
    pub orders_6m: Option<i64>,
    pub avg_order_val: Option<f64>,
    pub days_last_purch: Option<i64>,
}

impl MessageContext {
    /// `first-time | occasional | frequent`, derived from recent order count.
    pub fn customer_type(&self) -> &'static str {
        match self.orders_6m.unwrap_or(0) {
            0 => "first-time",
            1..=3 => "occasional",
            _ => "frequent",
        }
    }
}

const CART_TEMPLATES: &[&str] = &[
    "Remind the customer about the item still in their cart and encourage them to complete the purchase.",
    "Nudge the customer to finish checking out the product they left behind, warmly and briefly.",
    "Let the customer know their cart is waiting and invite them back to finish up.",
];

const GENERAL_TEMPLATES: &[&str] = &[
    "Re-engage the customer with a friendly check-in that invites them back to browse.",
    "Write a warm note encouraging the customer to come back and see what's new.",
    "Send a brief, upbeat message inviting the customer to return and explore the store.",
];

fn pick_template(churn_reasons: &[String], seed: usize) -> &'static str {
    let is_cart_related = churn_reasons
        .iter()
        .any(|r| r.to_lowercase().contains("cart") || r.to_lowercase().contains("abandon"));
    let templates = if is_cart_related { CART_TEMPLATES } else { GENERAL_TEMPLATES };
    templates[seed % templates.len()]
}

fn age_bracket(age: Option<i64>) -> &'static str {
    match age {
        Some(a) if a < 25 => "casual and energetic",
        Some(a) if a < 45 => "friendly and direct",
        Some(_) => "warm and respectful",
        None => "friendly and neutral",
    }
}

fn build_prompt(context: &MessageContext, churn_reasons: &[String], seed: usize) -> String {
    let instruction = pick_template(churn_reasons, seed);
    let name = context.name.as_deref().unwrap_or("the customer");
    let cart_item = context.cart_item_name.as_deref().unwrap_or("their recent item");
    let tone = age_bracket(context.age);

    format!(
        "{instruction} Use the name \"{name}\" naturally. Mention the product \"{cart_item}\" specifically. \
         Customer type: {customer_type}. Tone: {tone}. Hard rules: at most 160 characters, no mention of \
         discounts or coupons, exactly one call-to-action, no repeated phrases.",
        customer_type = context.customer_type(),
    )
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

pub struct MessageGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl MessageGenerator {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String, model: String) -> Self {
        Self { client, base_url, api_key, model }
    }

    /// Generates a ≤160-char personalized message; an empty or
    /// over-length completion is treated as a generation failure, not
    /// silently truncated.
    pub async fn generate(&self, context: &MessageContext, churn_reasons: &[String], seed: usize) -> Result<String> {
        let prompt = build_prompt(context, churn_reasons, seed);
        let temperature = 0.7 + (seed % 3) as f64 * 0.1;

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: &prompt }],
            temperature,
            max_tokens: 10_000,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| Error::new(ErrorCode::LlmUnavailable, "LLM request failed").with_details(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::new(ErrorCode::LlmUnavailable, format!("LLM returned status {}", response.status())));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::new(ErrorCode::LlmUnavailable, "LLM response was not valid JSON").with_details(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(Error::new(ErrorCode::LlmTruncated, "LLM returned an empty message"));
        }
        if content.chars().count() > 160 {
            return Err(Error::new(ErrorCode::LlmTruncated, "LLM message exceeded the 160 character cap"));
        }

        Ok(content)
    }
}

/// `generated`, never advanced by this crate — the read receipt is
/// recorded by whatever surface shows the message to the user.
pub const MESSAGE_STATUS_GENERATED: &str = "generated";
pub const MESSAGE_STATUS_READ: &str = "read";

/// A persisted custom message record, as stored under
/// `custom_user_messages` (keys `{user_id}_{message_id}`, wrapped in a
/// `data` bin, shortened field names per the KV bin-name convention).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message_id: String,
    pub user_id: String,
    pub content: String,
    #[serde(rename = "churn_prob")]
    pub churn_probability: f64,
    pub churn_reasons: Vec<String>,
    #[serde(rename = "user_ftrs", skip_serializing_if = "Option::is_none")]
    pub user_features: Option<Value>,
    pub generated_at: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<String>,
    pub channel: String,
    pub nudge_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
}

#[allow(clippy::too_many_arguments)]
pub fn to_record(
    message_id: &str,
    user_id: &str,
    content: &str,
    churn_probability: f64,
    churn_reasons: &[String],
    user_features: Option<Value>,
    channel: &str,
    nudge_type: &str,
    coupon_code: Option<&str>,
) -> Value {
    serde_json::to_value(StoredMessage {
        message_id: message_id.to_string(),
        user_id: user_id.to_string(),
        content: content.to_string(),
        churn_probability,
        churn_reasons: churn_reasons.to_vec(),
        user_features,
        generated_at: now_utc_iso(),
        status: MESSAGE_STATUS_GENERATED.to_string(),
        read_at: None,
        channel: channel.to_string(),
        nudge_type: nudge_type.to_string(),
        coupon_code: coupon_code.map(String::from),
    })
    .expect("StoredMessage always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_related_reason_selects_cart_template() {
        let prompt = build_prompt(&MessageContext::default(), &["CART_ABANDONMENT".to_string()], 0);
        assert!(prompt.starts_with(CART_TEMPLATES[0]));
    }

    #[test]
    fn non_cart_reason_selects_general_template() {
        let prompt = build_prompt(&MessageContext::default(), &["INACTIVITY".to_string()], 0);
        assert!(prompt.starts_with(GENERAL_TEMPLATES[0]));
    }

    #[test]
    fn customer_type_derivation_follows_order_count() {
        let mut ctx = MessageContext::default();
        ctx.orders_6m = Some(0);
        assert_eq!(ctx.customer_type(), "first-time");
        ctx.orders_6m = Some(2);
        assert_eq!(ctx.customer_type(), "occasional");
        ctx.orders_6m = Some(8);
        assert_eq!(ctx.customer_type(), "frequent");
    }

    #[test]
    fn prompt_never_mentions_discounts() {
        let prompt = build_prompt(&MessageContext::default(), &[], 1);
        assert!(!prompt.to_lowercase().contains("% off"));
    }

    #[test]
    fn to_record_starts_generated_with_no_read_receipt() {
        let record = to_record("msg_1", "u1", "hi there", 0.6, &["CART_ABANDONMENT".to_string()], None, "sms", "rule_2", None);
        let stored: StoredMessage = serde_json::from_value(record).unwrap();
        assert_eq!(stored.status, MESSAGE_STATUS_GENERATED);
        assert!(stored.read_at.is_none());
        assert_eq!(stored.channel, "sms");
        assert_eq!(stored.nudge_type, "rule_2");
        assert!(stored.coupon_code.is_none());
    }

    #[test]
    fn to_record_carries_the_coupon_code_when_given() {
        let record = to_record("msg_2", "u1", "hi there", 0.9, &[], None, "sms", "high_risk_inactive_user", Some("WELCOME20"));
        let stored: StoredMessage = serde_json::from_value(record).unwrap();
        assert_eq!(stored.coupon_code, Some("WELCOME20".to_string()));
    }
}
