//! Turns a merged [`FlatFeatureMap`] into the fixed 36-slot vector the
//! scoring model expects. The slot layout, categorical encodings and
//! indices are the model's contract: any change here requires retraining,
//! so they are frozen constants rather than something data-driven.

use crate::model::{FeatureFamily, FeatureValue, FlatFeatureMap};
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const VECTOR_LEN: usize = 36;

/// `feature name -> slot index` for plain numeric/boolean features.
static FEATURE_MAPPING: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    HashMap::from([
        ("acc_age_days", 0),
        ("member_dur", 1),
        ("days_last_login", 7),
        ("days_last_purch", 8),
        ("sess_7d", 9),
        ("sess_30d", 10),
        ("avg_sess_dur", 11),
        ("ctr_10_sess", 12),
        ("cart_abandon", 13),
        ("wishlist_ratio", 14),
        ("content_engage", 15),
        ("avg_order_val", 16),
        ("orders_6m", 17),
        ("purch_freq_90d", 18),
        ("last_hv_purch", 19),
        ("refund_rate", 20),
        ("discount_dep", 22),
        ("push_open_rate", 23),
        ("email_ctr", 24),
        ("inapp_ctr", 25),
        ("promo_resp_time", 26),
        ("tickets_90d", 28),
        ("avg_ticket_res", 29),
        ("csat_score", 30),
        ("refund_req", 31),
        ("curr_sess_clk", 32),
        ("checkout_time", 33),
        ("cart_no_buy", 34),
        ("bounce_flag", 35),
    ])
});

/// `categorical feature name -> (slot index, value -> code)`.
static CATEGORICAL: Lazy<HashMap<&'static str, (usize, HashMap<&'static str, f64>)>> = Lazy::new(|| {
    HashMap::from([
        (
            "loyalty_tier",
            (2, HashMap::from([("bronze", 1.0), ("silver", 2.0), ("gold", 3.0), ("platinum", 4.0)])),
        ),
        (
            "geo_location",
            (
                3,
                HashMap::from([("US-CA", 1.0), ("US-NY", 2.0), ("US-TX", 3.0), ("UK", 4.0), ("DE", 5.0)]),
            ),
        ),
        (
            "device_type",
            (4, HashMap::from([("mobile", 1.0), ("desktop", 2.0), ("tablet", 3.0)])),
        ),
        (
            "pref_payment",
            (5, HashMap::from([("credit", 1.0), ("debit", 2.0), ("paypal", 3.0), ("crypto", 4.0)])),
        ),
        (
            "lang_pref",
            (6, HashMap::from([("en", 1.0), ("es", 2.0), ("fr", 3.0), ("de", 4.0)])),
        ),
        (
            "sub_pay_status",
            (21, HashMap::from([("active", 1.0), ("inactive", 2.0), ("cancelled", 3.0)])),
        ),
        (
            "retention_resp",
            (27, HashMap::from([("positive", 1.0), ("negative", 2.0), ("neutral", 3.0)])),
        ),
    ])
});

/// Ordered column names, for diagnostics and the attribution explainer
/// (which needs to map a slot index back to a human name).
pub static FEATURE_COLUMNS: Lazy<[&'static str; VECTOR_LEN]> = Lazy::new(|| {
    [
        "acc_age_days",
        "member_dur",
        "loyalty_enc",
        "geo_loc_enc",
        "device_type_enc",
        "pref_pay_enc",
        "lang_pref_enc",
        "days_last_login",
        "days_last_purch",
        "sess_7d",
        "sess_30d",
        "avg_sess_dur",
        "ctr_10_sess",
        "cart_abandon",
        "wishlist_ratio",
        "content_engage",
        "avg_order_val",
        "orders_6m",
        "purch_freq_90d",
        "last_hv_purch",
        "refund_rate",
        "sub_pay_enc",
        "discount_dep",
        "push_open_rate",
        "email_ctr",
        "inapp_ctr",
        "promo_resp_time",
        "retention_enc",
        "tickets_90d",
        "avg_ticket_res",
        "csat_score",
        "refund_req",
        "curr_sess_clk",
        "checkout_time",
        "cart_no_buy",
        "bounce_flag",
    ]
});

/// Builds the fixed-length vector from a merged feature map. Unknown keys
/// are ignored; missing numeric features default to `0.0`; unknown
/// categorical values encode to `0.0` (the "no category" code), matching
/// the platform's original training-time convention.
pub fn vectorize(features: &FlatFeatureMap) -> [f64; VECTOR_LEN] {
    let mut vector = [0.0f64; VECTOR_LEN];

    for (name, value) in features {
        if let Some(&slot) = FEATURE_MAPPING.get(name.as_str()) {
            if let Some(n) = value.as_f64() {
                vector[slot] = n;
            }
            continue;
        }
        if let Some((slot, codes)) = CATEGORICAL.get(name.as_str()) {
            if let Some(text) = value.as_str() {
                vector[*slot] = codes.get(text).copied().unwrap_or(0.0);
            }
        }
    }

    vector
}

/// Whether `retrieve_all` returned enough to produce a non-trivial
/// prediction, per the platform's "insufficient feature coverage" edge
/// case: any family entirely absent still vectorizes (as zeros), but a
/// totally empty map is flagged separately by the caller.
pub fn has_any_signal(features: &FlatFeatureMap) -> bool {
    !features.is_empty()
}

/// Families represented in a feature map, used for the `/predict/test`
/// per-family coverage breakdown.
pub fn families_present(features: &FlatFeatureMap) -> Vec<FeatureFamily> {
    let mut present = Vec::new();
    for family in FeatureFamily::ALL {
        let belongs_to_family = |name: &str| -> bool {
            match family {
                FeatureFamily::Profile => matches!(
                    name,
                    "acc_age_days" | "member_dur" | "loyalty_tier" | "geo_location" | "device_type" | "pref_payment" | "lang_pref"
                ),
                FeatureFamily::Behavior => matches!(
                    name,
                    "days_last_login"
                        | "days_last_purch"
                        | "sess_7d"
                        | "sess_30d"
                        | "avg_sess_dur"
                        | "ctr_10_sess"
                        | "cart_abandon"
                        | "wishlist_ratio"
                        | "content_engage"
                ),
                FeatureFamily::Transactional => matches!(
                    name,
                    "avg_order_val"
                        | "orders_6m"
                        | "purch_freq_90d"
                        | "last_hv_purch"
                        | "refund_rate"
                        | "sub_pay_status"
                        | "discount_dep"
                        | "cat_spend_dist"
                ),
                FeatureFamily::Engagement => matches!(
                    name,
                    "push_open_rate" | "email_ctr" | "inapp_ctr" | "promo_resp_time" | "retention_resp"
                ),
                FeatureFamily::Support => matches!(name, "tickets_90d" | "avg_ticket_res" | "csat_score" | "refund_req"),
                FeatureFamily::Realtime => matches!(
                    name,
                    "curr_sess_clk"
                        | "checkout_time"
                        | "cart_no_buy"
                        | "bounce_flag"
                        | "cart_items"
                        | "abandon_count"
                        | "last_abandon_at"
                        | "cart_items_count"
                ),
            }
        };
        if features.keys().any(|k| belongs_to_family(k)) {
            present.push(family);
        }
    }
    present
}

pub fn feature_value_at(features: &FlatFeatureMap, slot: usize) -> Option<&FeatureValue> {
    let name = FEATURE_COLUMNS.get(slot)?;
    features.get(*name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, FeatureValue)]) -> FlatFeatureMap {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn vector_has_fixed_length() {
        let v = vectorize(&FlatFeatureMap::new());
        assert_eq!(v.len(), VECTOR_LEN);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn numeric_feature_lands_on_its_mapped_slot() {
        let features = map(&[("acc_age_days", FeatureValue::Number(365.0))]);
        let v = vectorize(&features);
        assert_eq!(v[0], 365.0);
    }

    #[test]
    fn known_categorical_encodes_to_its_code() {
        let features = map(&[("loyalty_tier", FeatureValue::Text("gold".to_string()))]);
        let v = vectorize(&features);
        assert_eq!(v[2], 3.0);
    }

    #[test]
    fn unknown_categorical_value_encodes_to_zero() {
        let features = map(&[("loyalty_tier", FeatureValue::Text("diamond".to_string()))]);
        let v = vectorize(&features);
        assert_eq!(v[2], 0.0);
    }

    #[test]
    fn unknown_feature_name_is_ignored() {
        let features = map(&[("totally_unknown_key", FeatureValue::Number(1.0))]);
        let v = vectorize(&features);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn boolean_feature_encodes_as_zero_or_one() {
        let features = map(&[("cart_no_buy", FeatureValue::Bool(true))]);
        let v = vectorize(&features);
        assert_eq!(v[34], 1.0);
    }

    #[test]
    fn families_present_detects_partial_coverage() {
        let features = map(&[("days_last_login", FeatureValue::Number(2.0))]);
        let present = families_present(&features);
        assert_eq!(present, vec![FeatureFamily::Behavior]);
    }
}
