//! Feature store: ingests per-family partial updates and retrieves the
//! merged view for a user. Backed by `churn_core::KvStore`, one direct-bin
//! record per `(user_id, family)`.

use crate::model::{FeatureFamily, FlatFeatureMap};
use churn_core::error::Result;
use churn_core::kv_store::KvStore;
use churn_core::utils::{max_iso, now_utc_iso};
use serde_json::Value;
use std::sync::Arc;

const SET: &str = "user_features";

fn key(user_id: &str, family: FeatureFamily) -> String {
    format!("{user_id}_{family}")
}

/// Wraps a `KvStore` with the read-strip-merge-stamp-write ingest cycle
/// and the fixed-order six-family retrieval used by the scorer and the
/// nudge engine.
pub struct FeatureStore {
    kv: Arc<dyn KvStore>,
}

impl FeatureStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Merge `partial` into whatever is already stored for
    /// `(user_id, family)`, stamping `updated_at` on the merged record.
    /// Existing keys not present in `partial` are preserved.
    pub async fn ingest(&self, user_id: &str, family: FeatureFamily, partial: Value) -> Result<()> {
        let key = key(user_id, family);
        let existing = self.kv.get(SET, &key).await?;

        let mut merged = match existing {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };

        if let Value::Object(incoming) = partial {
            for (k, v) in incoming {
                merged.insert(k, v);
            }
        }
        merged.insert("updated_at".to_string(), Value::String(now_utc_iso()));

        self.kv.put(SET, &key, Value::Object(merged)).await.map(|_| ())
    }

    /// Read and flatten all six families for a user, in fixed family
    /// order (later families override earlier ones on name collision),
    /// along with the max `updated_at` seen across the families that
    /// exist.
    pub async fn retrieve_all(&self, user_id: &str) -> Result<(FlatFeatureMap, Option<String>)> {
        let mut merged = FlatFeatureMap::new();
        let mut newest: Option<String> = None;

        for family in FeatureFamily::ALL {
            let key = key(user_id, family);
            let record = self.kv.get(SET, &key).await?;
            let Some(Value::Object(map)) = record else {
                continue;
            };

            if let Some(Value::String(ts)) = map.get("updated_at") {
                newest = max_iso(newest.as_deref(), Some(ts));
            }

            for (k, v) in map {
                if k == "updated_at" {
                    continue;
                }
                if let Some(fv) = json_to_feature_value(&v) {
                    merged.insert(k, fv);
                }
            }
        }

        Ok((merged, newest))
    }
}

fn json_to_feature_value(v: &Value) -> Option<crate::model::FeatureValue> {
    use crate::model::FeatureValue;
    match v {
        Value::Number(n) => n.as_f64().map(FeatureValue::Number),
        Value::Bool(b) => Some(FeatureValue::Bool(*b)),
        Value::String(s) => Some(FeatureValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => serde_json::from_value(v.clone())
            .map(FeatureValue::CartItems)
            .ok()
            .or_else(|| serde_json::from_value(v.clone()).map(FeatureValue::CategorySpend).ok()),
        Value::Null => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_core::kv_store::InMemoryKvStore;
    use serde_json::json;

    #[tokio::test]
    async fn ingest_merges_rather_than_overwrites() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let store = FeatureStore::new(kv);

        store
            .ingest("u1", FeatureFamily::Profile, json!({"loyalty_tier": "gold"}))
            .await
            .unwrap();
        store
            .ingest("u1", FeatureFamily::Profile, json!({"acc_age_days": 42}))
            .await
            .unwrap();

        let (flat, _) = store.retrieve_all("u1").await.unwrap();
        assert_eq!(flat.get("loyalty_tier").unwrap().as_str(), Some("gold"));
        assert_eq!(flat.get("acc_age_days").unwrap().as_f64(), Some(42.0));
    }

    #[tokio::test]
    async fn retrieve_all_merges_across_families_in_fixed_order() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let store = FeatureStore::new(kv);

        store
            .ingest("u2", FeatureFamily::Behavior, json!({"days_last_login": 3}))
            .await
            .unwrap();
        store
            .ingest("u2", FeatureFamily::Realtime, json!({"abandon_count": 2}))
            .await
            .unwrap();

        let (flat, newest) = store.retrieve_all("u2").await.unwrap();
        assert_eq!(flat.get("days_last_login").unwrap().as_f64(), Some(3.0));
        assert_eq!(flat.get("abandon_count").unwrap().as_f64(), Some(2.0));
        assert!(newest.is_some());
    }

    #[tokio::test]
    async fn retrieve_all_on_unknown_user_is_empty_not_an_error() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let store = FeatureStore::new(kv);
        let (flat, newest) = store.retrieve_all("ghost").await.unwrap();
        assert!(flat.is_empty());
        assert!(newest.is_none());
    }
}
