//! Typed per-family feature records (for ingest-time validation) and a flat
//! `name -> value` view used only inside the vectorizer, per the platform's
//! "typed family structs + a merged view" design: sparse, heterogeneous
//! wire input on one side, a fixed numeric slot layout on the other.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The six closed-set feature families. Retrieval always merges them in
/// this fixed order, later families overriding earlier ones on name
/// collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureFamily {
    Profile,
    Behavior,
    Transactional,
    Engagement,
    Support,
    Realtime,
}

impl FeatureFamily {
    pub const ALL: [FeatureFamily; 6] = [
        FeatureFamily::Profile,
        FeatureFamily::Behavior,
        FeatureFamily::Transactional,
        FeatureFamily::Engagement,
        FeatureFamily::Support,
        FeatureFamily::Realtime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureFamily::Profile => "profile",
            FeatureFamily::Behavior => "behavior",
            FeatureFamily::Transactional => "transactional",
            FeatureFamily::Engagement => "engagement",
            FeatureFamily::Support => "support",
            FeatureFamily::Realtime => "realtime",
        }
    }
}

impl fmt::Display for FeatureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FeatureFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profile" => Ok(FeatureFamily::Profile),
            "behavior" => Ok(FeatureFamily::Behavior),
            "transactional" => Ok(FeatureFamily::Transactional),
            "engagement" => Ok(FeatureFamily::Engagement),
            "support" => Ok(FeatureFamily::Support),
            "realtime" => Ok(FeatureFamily::Realtime),
            other => Err(format!("unknown feature family: {other}")),
        }
    }
}

/// A compact product reference carried inside `realtime.cart_items`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartItemRef {
    pub product_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// A single feature value, heterogeneous enough to host every family's
/// wire fields without losing type information, the way `spec.md`'s
/// sparse `str -> scalar` ingest payloads are represented before
/// vectorization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Bool(bool),
    Text(String),
    CartItems(Vec<CartItemRef>),
    CategorySpend(HashMap<String, f64>),
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(n) => Some(*n),
            FeatureValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeatureValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Flat, merged view over all ingested families for one user, built by
/// `FeatureStore::retrieve_all` and consumed by the vectorizer and the
/// nudge engine's reason lookups. Intentionally "anything goes" is
/// avoided: values are always a `FeatureValue`, never an arbitrary JSON
/// blob.
pub type FlatFeatureMap = HashMap<String, FeatureValue>;

macro_rules! family_struct {
    ($name:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        pub struct $name {
            $(#[serde(default)] pub $field: Option<$ty>,)*
        }

        impl $name {
            pub fn to_flat(&self) -> FlatFeatureMap {
                let mut map = FlatFeatureMap::new();
                $(
                    if let Some(v) = &self.$field {
                        map.insert(stringify!($field).to_string(), FeatureValue::from(v.clone()));
                    }
                )*
                map
            }
        }
    };
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Number(v as f64)
    }
}
impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}
impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}
impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}
impl From<Vec<CartItemRef>> for FeatureValue {
    fn from(v: Vec<CartItemRef>) -> Self {
        FeatureValue::CartItems(v)
    }
}
impl From<HashMap<String, f64>> for FeatureValue {
    fn from(v: HashMap<String, f64>) -> Self {
        FeatureValue::CategorySpend(v)
    }
}

family_struct!(ProfileFeatures {
    acc_age_days: i64,
    member_dur: i64,
    loyalty_tier: String,
    geo_location: String,
    device_type: String,
    pref_payment: String,
    lang_pref: String,
});

family_struct!(BehaviorFeatures {
    days_last_login: i64,
    days_last_purch: i64,
    sess_7d: i64,
    sess_30d: i64,
    avg_sess_dur: f64,
    ctr_10_sess: f64,
    cart_abandon: f64,
    wishlist_ratio: f64,
    content_engage: f64,
});

family_struct!(TransactionalFeatures {
    avg_order_val: f64,
    orders_6m: i64,
    purch_freq_90d: f64,
    last_hv_purch: i64,
    refund_rate: f64,
    sub_pay_status: String,
    discount_dep: f64,
    cat_spend_dist: HashMap<String, f64>,
});

family_struct!(EngagementFeatures {
    push_open_rate: f64,
    email_ctr: f64,
    inapp_ctr: f64,
    promo_resp_time: f64,
    retention_resp: String,
});

family_struct!(SupportFeatures {
    tickets_90d: i64,
    avg_ticket_res: f64,
    csat_score: f64,
    refund_req: i64,
});

family_struct!(RealtimeFeatures {
    curr_sess_clk: i64,
    checkout_time: f64,
    cart_no_buy: bool,
    bounce_flag: bool,
    cart_items: Vec<CartItemRef>,
    abandon_count: i64,
    last_abandon_at: String,
    cart_items_count: i64,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_round_trips_to_flat_map() {
        let profile = ProfileFeatures {
            loyalty_tier: Some("bronze".to_string()),
            acc_age_days: Some(120),
            ..Default::default()
        };
        let flat = profile.to_flat();
        assert_eq!(flat.get("loyalty_tier").unwrap().as_str(), Some("bronze"));
        assert_eq!(flat.get("acc_age_days").unwrap().as_f64(), Some(120.0));
        assert!(flat.get("geo_location").is_none());
    }

    #[test]
    fn family_from_str_rejects_unknown_family() {
        assert!("unknown".parse::<FeatureFamily>().is_err());
        assert_eq!("profile".parse::<FeatureFamily>().unwrap(), FeatureFamily::Profile);
    }
}
