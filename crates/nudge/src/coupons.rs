//! Coupon selection and assignment via the storefront collaborator's
//! internal assignment endpoint, plus the typed `Coupon`/`UserCoupon`
//! records persisted alongside each assignment.

use churn_core::error::{Error, ErrorCode, Result};
use churn_core::utils::now_utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
    FreeShipping,
}

/// A coupon definition. Invariants (`valid_from <= valid_until`,
/// `usage_count <= usage_limit` when a limit is set) are enforced in
/// [`Coupon::new`] rather than left to callers to uphold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub coupon_id: String,
    pub code: String,
    pub name: String,
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub min_order_val: f64,
    pub max_discount: Option<f64>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
    pub valid_from: String,
    pub valid_until: String,
    pub is_active: bool,
    pub applicable_categories: Vec<String>,
    pub applicable_products: Vec<String>,
}

#[allow(clippy::too_many_arguments)]
impl Coupon {
    pub fn new(
        coupon_id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        discount_type: DiscountType,
        discount_value: f64,
        min_order_val: f64,
        max_discount: Option<f64>,
        usage_limit: Option<u32>,
        valid_from: chrono::DateTime<chrono::Utc>,
        valid_until: chrono::DateTime<chrono::Utc>,
        applicable_categories: Vec<String>,
        applicable_products: Vec<String>,
    ) -> Result<Self> {
        if valid_from > valid_until {
            return Err(Error::new(ErrorCode::ValidationFailed, "coupon valid_from must not be after valid_until"));
        }

        Ok(Self {
            coupon_id: coupon_id.into(),
            code: code.into(),
            name: name.into(),
            description: description.into(),
            discount_type,
            discount_value,
            min_order_val,
            max_discount,
            usage_limit,
            usage_count: 0,
            valid_from: valid_from.to_rfc3339(),
            valid_until: valid_until.to_rfc3339(),
            is_active: true,
            applicable_categories,
            applicable_products,
        })
    }

    /// `false` once `usage_count` has reached `usage_limit` (when set).
    pub fn has_remaining_uses(&self) -> bool {
        match self.usage_limit {
            Some(limit) => self.usage_count < limit,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponSource {
    Nudge,
    General,
    Promotion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserCouponStatus {
    Available,
    Used,
    Expired,
}

/// An assignment of a coupon to a user. A user has at most one
/// `available` record per `coupon_id`; [`crate::persistence::persist_coupon`]
/// upholds this by writing to a link key derived from `(user_id,
/// coupon_id)` rather than a freshly generated id, so re-assignment
/// overwrites rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCoupon {
    pub user_coupon_id: String,
    pub user_id: String,
    pub coupon_id: String,
    pub source: CouponSource,
    pub nudge_id: Option<String>,
    pub churn_score: Option<f64>,
    pub status: UserCouponStatus,
    pub assigned_at: String,
    pub used_at: Option<String>,
    pub order_id: Option<String>,
}

impl UserCoupon {
    pub fn new_from_nudge(user_id: &str, coupon_id: &str, nudge_id: &str, churn_score: f64) -> Self {
        Self {
            user_coupon_id: format!("uc_{}", &Uuid::new_v4().simple().to_string()[..8]),
            user_id: user_id.to_string(),
            coupon_id: coupon_id.to_string(),
            source: CouponSource::Nudge,
            nudge_id: Some(nudge_id.to_string()),
            churn_score: Some(churn_score),
            status: UserCouponStatus::Available,
            assigned_at: now_utc().to_rfc3339(),
            used_at: None,
            order_id: None,
        }
    }
}

/// Keyword -> coupon code buckets, reproduced verbatim from the coupon
/// selection logic, checked in keyword-table order and scored by number
/// of matching reasons.
const COUPON_KEYWORDS: &[(&str, &str)] = &[
    ("price", "SUMMER25"),
    ("expensive", "SUMMER25"),
    ("cost", "SUMMER25"),
    ("discount", "SUMMER25"),
    ("inactive", "WELCOME_BACK20"),
    ("login", "WELCOME_BACK20"),
    ("engagement", "WELCOME_BACK20"),
    ("session", "WELCOME_BACK20"),
    ("purchase", "SAVE20"),
    ("order", "SAVE20"),
    ("buying", "SAVE20"),
    ("transaction", "SAVE20"),
    ("shipping", "FREESHIP"),
    ("delivery", "FREESHIP"),
    ("fulfillment", "FREESHIP"),
    ("electronics", "ELECTRONICS15"),
    ("tech", "ELECTRONICS15"),
    ("device", "ELECTRONICS15"),
];

/// Selects the coupon with the most keyword matches across all reasons;
/// falls back to a probability-tiered default when no keyword matches.
pub fn select_coupon(churn_reasons: &[String], churn_probability: f64) -> String {
    let reasons_lower: Vec<String> = churn_reasons.iter().map(|r| r.to_lowercase()).collect();

    let mut scores: std::collections::HashMap<&str, u32> = std::collections::HashMap::new();
    for reason in &reasons_lower {
        for (keyword, coupon) in COUPON_KEYWORDS {
            if reason.contains(keyword) {
                *scores.entry(coupon).or_insert(0) += 1;
            }
        }
    }

    if let Some((coupon, _)) = scores.into_iter().max_by_key(|(_, score)| *score) {
        return coupon.to_string();
    }

    if churn_probability >= 0.9 {
        "SUMMER25".to_string()
    } else if churn_probability >= 0.7 {
        "WELCOME_BACK20".to_string()
    } else if churn_probability >= 0.5 {
        "SAVE20".to_string()
    } else {
        "WELCOME10".to_string()
    }
}

/// The fixed coupon catalog `select_coupon` draws codes from, as a
/// typed [`Coupon`] builder: discount shape per code, reproduced from
/// the selection comments in the source nudge engine (`SUMMER25` = 25%
/// off, `WELCOME_BACK20`/`ELECTRONICS15` = 20%/15% off,
/// `SAVE20` = $20 off orders over $100, `FREESHIP` = free shipping,
/// `WELCOME10` = 10% off, `WELCOME20` = the 20%-off coupon pinned
/// directly on `high_risk_inactive_user`'s rule table entry rather than
/// resolved through `select_coupon`). Every catalog coupon is valid for
/// 7 days from assignment.
pub fn build_catalog_coupon(code: &str) -> Result<Coupon> {
    let now = now_utc();
    let valid_until = now + chrono::Duration::days(7);

    let (name, description, discount_type, discount_value, min_order_val, max_discount) = match code {
        "SUMMER25" => ("Summer Sale", "25% off your order", DiscountType::Percentage, 25.0, 0.0, Some(50.0)),
        "WELCOME_BACK20" => ("Welcome Back", "20% off to welcome you back", DiscountType::Percentage, 20.0, 0.0, Some(40.0)),
        "SAVE20" => ("Save $20", "$20 off orders over $100", DiscountType::Fixed, 20.0, 100.0, None),
        "FREESHIP" => ("Free Shipping", "Free shipping on your next order", DiscountType::FreeShipping, 0.0, 0.0, None),
        "ELECTRONICS15" => ("Electronics Discount", "15% off electronics", DiscountType::Percentage, 15.0, 0.0, Some(30.0)),
        "WELCOME10" => ("Welcome", "10% off your next order", DiscountType::Percentage, 10.0, 0.0, Some(20.0)),
        "WELCOME20" => ("Welcome Back Offer", "20% off your next order", DiscountType::Percentage, 20.0, 0.0, Some(40.0)),
        other => {
            return Err(Error::new(ErrorCode::NotFound, "unknown coupon code").with_details(other.to_string()));
        }
    };

    Coupon::new(code, code, name, description, discount_type, discount_value, min_order_val, max_discount, Some(1), now, valid_until, vec![], vec![])
}

#[derive(Debug, Serialize)]
struct AssignmentRequest<'a> {
    user_id: &'a str,
    coupon_id: &'a str,
    nudge_id: &'a str,
    churn_score: f64,
}

#[derive(Debug, Deserialize)]
struct AssignmentResponse {
    #[serde(default)]
    duplicate: bool,
}

/// Assigns a coupon to the user via the storefront's internal API.
/// Returns `Ok(true)` if a new assignment was created, `Ok(false)` if
/// the storefront reported it as a duplicate; propagates the error on
/// any non-200 response or transport failure.
pub async fn assign_discount_coupon(
    client: &reqwest::Client,
    storefront_api_url: &str,
    user_id: &str,
    churn_reasons: &[String],
    churn_probability: f64,
) -> Result<bool> {
    let coupon_id = select_coupon(churn_reasons, churn_probability);
    let nudge_id = format!("nudge_{}", &Uuid::new_v4().simple().to_string()[..8]);

    let url = format!("{storefront_api_url}/api/coupons/internal/assign-nudge-coupon");
    let request = AssignmentRequest {
        user_id,
        coupon_id: &coupon_id,
        nudge_id: &nudge_id,
        churn_score: churn_probability,
    };

    let response = client
        .post(&url)
        .query(&[
            ("user_id", request.user_id),
            ("coupon_id", request.coupon_id),
            ("nudge_id", request.nudge_id),
        ])
        .query(&[("churn_score", request.churn_score)])
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| Error::new(ErrorCode::StorefrontUnavailable, "coupon assignment request failed").with_details(e.to_string()))?;

    if !response.status().is_success() {
        return Err(Error::new(
            ErrorCode::StorefrontUnavailable,
            format!("coupon assignment returned status {}", response.status()),
        ));
    }

    let body: AssignmentResponse = response.json().await.unwrap_or(AssignmentResponse { duplicate: false });
    Ok(!body.duplicate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_keyword_selects_summer25() {
        let coupon = select_coupon(&["HIGH_PRICE_SENSITIVITY".to_string()], 0.5);
        assert_eq!(coupon, "SUMMER25");
    }

    #[test]
    fn no_keyword_match_falls_back_to_probability_tier() {
        assert_eq!(select_coupon(&[], 0.95), "SUMMER25");
        assert_eq!(select_coupon(&[], 0.75), "WELCOME_BACK20");
        assert_eq!(select_coupon(&[], 0.55), "SAVE20");
        assert_eq!(select_coupon(&[], 0.1), "WELCOME10");
    }

    #[test]
    fn coupon_new_rejects_valid_from_after_valid_until() {
        let now = now_utc();
        let earlier = now - chrono::Duration::days(1);
        let result = Coupon::new(
            "c1", "CODE", "name", "desc", DiscountType::Percentage, 10.0, 0.0, None, None, now, earlier, vec![], vec![],
        );
        assert!(result.is_err());
    }

    #[test]
    fn coupon_has_remaining_uses_respects_usage_limit() {
        let now = now_utc();
        let mut coupon = Coupon::new(
            "c2", "CODE", "name", "desc", DiscountType::Fixed, 20.0, 0.0, None, Some(1), now, now + chrono::Duration::days(1), vec![], vec![],
        )
        .unwrap();
        assert!(coupon.has_remaining_uses());
        coupon.usage_count = 1;
        assert!(!coupon.has_remaining_uses());
    }

    #[test]
    fn build_catalog_coupon_resolves_every_selectable_code() {
        for code in ["SUMMER25", "WELCOME_BACK20", "SAVE20", "FREESHIP", "ELECTRONICS15", "WELCOME10", "WELCOME20"] {
            let coupon = build_catalog_coupon(code).unwrap();
            assert_eq!(coupon.code, code);
        }
        assert!(build_catalog_coupon("NOT_A_CODE").is_err());
    }

    #[test]
    fn most_frequent_keyword_match_wins() {
        let coupon = select_coupon(
            &["shipping delay".to_string(), "delivery problem".to_string(), "price too high".to_string()],
            0.6,
        );
        assert_eq!(coupon, "FREESHIP");
    }
}
