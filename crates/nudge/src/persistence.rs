//! KV persistence for nudges, coupons, and custom messages, per the
//! wrapped-record conventions for `user_nudges`, `coupons`,
//! `user_coupons`, and `custom_user_messages`.

use crate::coupons::{build_catalog_coupon, UserCoupon};
use crate::rules::{NudgeAction, NudgeRule};
use churn_core::error::Result;
use churn_core::kv_store::KvStore;
use churn_core::utils::now_utc_iso;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const USER_NUDGES: &str = "user_nudges";
const COUPONS: &str = "coupons";
const USER_COUPONS: &str = "user_coupons";
const CUSTOM_USER_MESSAGES: &str = "custom_user_messages";

/// A persisted nudge record, as stored under `user_nudges` (keys
/// `{user_id}_{nudge_id}`, wrapped in a `data` bin).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NudgeRecord {
    pub nudge_id: String,
    pub user_id: String,
    pub message: String,
    pub channel: String,
    pub nudge_type: String,
    pub coupon_code: Option<String>,
    pub discount_value: Option<f64>,
    pub discount_type: Option<String>,
    pub status: String,
    pub sent_at: String,
}

/// Writes one `user_nudges` record per executed nudge, and — when the
/// action is a discount coupon — a `coupons` record plus a
/// `user_coupons` link record with a 7-day validity window.
pub async fn persist_nudge(
    kv: &Arc<dyn KvStore>,
    user_id: &str,
    rule: &NudgeRule,
    action: &NudgeAction,
    coupon_id: Option<&str>,
    churn_probability: f64,
) -> Result<String> {
    let nudge_id = format!("nudge_{}", &Uuid::new_v4().simple().to_string()[..8]);

    let (discount_value, discount_type) = if let Some(coupon_id) = coupon_id {
        match build_catalog_coupon(coupon_id) {
            Ok(coupon) => (Some(coupon.discount_value), Some(format!("{:?}", coupon.discount_type).to_lowercase())),
            Err(_) => (None, None),
        }
    } else {
        (None, None)
    };

    let record = NudgeRecord {
        nudge_id: nudge_id.clone(),
        user_id: user_id.to_string(),
        message: action.content_template.clone(),
        channel: action.channel.clone(),
        nudge_type: rule.rule_id.to_string(),
        coupon_code: coupon_id.map(String::from),
        discount_value,
        discount_type,
        status: "sent".to_string(),
        sent_at: now_utc_iso(),
    };

    kv.put(USER_NUDGES, &format!("{user_id}_{nudge_id}"), json!({ "data": record })).await?;

    if let Some(coupon_id) = coupon_id {
        persist_coupon(kv, user_id, coupon_id, &nudge_id, churn_probability).await?;
    }

    Ok(nudge_id)
}

/// Idempotent: assigning the same `(user_id, coupon_id)` twice overwrites
/// the same `user_coupons` link key rather than appending a duplicate
/// record, upholding the "at most one `available` record per
/// `(user_id, coupon_id)`" invariant.
async fn persist_coupon(kv: &Arc<dyn KvStore>, user_id: &str, coupon_id: &str, nudge_id: &str, churn_score: f64) -> Result<()> {
    let coupon = build_catalog_coupon(coupon_id)?;
    kv.put(COUPONS, coupon_id, json!({ "data": coupon })).await?;

    let link = UserCoupon::new_from_nudge(user_id, coupon_id, nudge_id, churn_score);
    let link_id = format!("{user_id}_{coupon_id}");
    kv.put(USER_COUPONS, &link_id, json!({ "data": link })).await.map(|_| ())
}

pub async fn persist_message(kv: &Arc<dyn KvStore>, user_id: &str, message_id: &str, record: Value) -> Result<()> {
    kv.put(CUSTOM_USER_MESSAGES, &format!("{user_id}_{message_id}"), json!({ "data": record }))
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_core::kv_store::InMemoryKvStore;

    #[tokio::test]
    async fn persist_nudge_writes_coupon_and_link_records() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let rule = &crate::rules::NUDGE_RULES[0];
        let action = &rule.nudges[0];

        let nudge_id = persist_nudge(&kv, "u1", rule, action, Some("WELCOME_BACK20"), 0.75).await.unwrap();

        assert!(kv.exists(USER_NUDGES, &format!("u1_{nudge_id}")).await.unwrap());
        assert!(kv.exists(COUPONS, "WELCOME_BACK20").await.unwrap());
        assert!(kv.exists(USER_COUPONS, "u1_WELCOME_BACK20").await.unwrap());
    }

    #[tokio::test]
    async fn persist_nudge_without_coupon_skips_coupon_records() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let rule = &crate::rules::NUDGE_RULES[1];
        let action = &rule.nudges[0];

        persist_nudge(&kv, "u2", rule, action, None, 0.2).await.unwrap();
        assert_eq!(kv.count(COUPONS).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reassigning_the_same_coupon_is_idempotent() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let rule = &crate::rules::NUDGE_RULES[0];
        let action = &rule.nudges[0];

        persist_nudge(&kv, "u3", rule, action, Some("WELCOME_BACK20"), 0.75).await.unwrap();
        persist_nudge(&kv, "u3", rule, action, Some("WELCOME_BACK20"), 0.75).await.unwrap();

        assert_eq!(kv.count(USER_COUPONS).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn persisted_nudge_record_carries_discount_fields_from_the_catalog() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let rule = &crate::rules::NUDGE_RULES[0];
        let action = &rule.nudges[0];

        let nudge_id = persist_nudge(&kv, "u4", rule, action, Some("SAVE20"), 0.55).await.unwrap();
        let stored = kv.get(USER_NUDGES, &format!("u4_{nudge_id}")).await.unwrap().unwrap();
        let record: NudgeRecord = serde_json::from_value(stored["data"].clone()).unwrap();

        assert_eq!(record.coupon_code, Some("SAVE20".to_string()));
        assert_eq!(record.discount_value, Some(20.0));
        assert_eq!(record.discount_type, Some("fixed".to_string()));
    }
}
