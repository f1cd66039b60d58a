//! # KV Store Adapter
//!
//! Typed wrapper over a key-value database, exposing two storage
//! conventions that coexist in the platform's records:
//!
//! - **Direct bins**: the value's fields are stored as top-level bins
//!   (used by the feature store).
//! - **Wrapped**: the whole value is stored under one bin named `data`
//!   (used by catalog/coupon/message records, avoiding per-field name
//!   length limits).
//!
//! It also exposes a **value-store view** used by the workflow runtime and
//! product index: namespaced keys with optional vector indexing, where
//! `search` without a query does a lexical scan and with a query performs
//! k-NN cosine similarity over stored embeddings.
//!
//! [`InMemoryKvStore`] is the default test double; [`RedisKvStore`] is the
//! production backing store.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

/// Direct-bins / wrapped-`data`-bin convention over a KV database.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, set: &str, key: &str, value: Value) -> Result<bool>;
    async fn get(&self, set: &str, key: &str) -> Result<Option<Value>>;
    async fn delete(&self, set: &str, key: &str) -> Result<bool>;
    async fn scan(&self, set: &str, limit: Option<usize>) -> Result<Vec<Value>>;
    async fn query_by_field(&self, set: &str, field: &str, value: &Value) -> Result<Vec<Value>>;
    async fn exists(&self, set: &str, key: &str) -> Result<bool>;
    async fn count(&self, set: &str) -> Result<usize>;
}

/// A namespaced record in the value-store view, optionally carrying a
/// precomputed embedding for vector search.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValueStoreItem {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// A namespace is a tuple of path segments, e.g. `("products",)` or
/// `("user_recommendations",)`.
pub type Namespace = Vec<String>;

/// Namespaced KV convention with optional vector indexing, used by the
/// product index and the workflow checkpointer.
#[async_trait]
pub trait ValueStore: Send + Sync {
    /// Write `value` under `namespace`/`key`. When `index_fields` names
    /// fields whose concatenated text should be embedded, the caller is
    /// responsible for pre-computing `embedding` (the adapter itself has
    /// no notion of an embedding model — see `churn_catalog::EmbeddingEncoder`).
    async fn aput(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
        embedding: Option<Vec<f32>>,
    ) -> Result<()>;

    async fn aget(&self, namespace: &Namespace, key: &str) -> Result<Option<ValueStoreItem>>;

    /// Lexical scan (no `query_embedding`) or k-NN cosine similarity search
    /// (with `query_embedding`) over the namespace, returning up to `limit`
    /// items. Never errors when the index has fewer than `limit` items.
    async fn asearch(
        &self,
        namespace: &Namespace,
        query_embedding: Option<&[f32]>,
        limit: usize,
    ) -> Result<Vec<(ValueStoreItem, f32)>>;

    async fn adelete(&self, namespace: &Namespace, key: &str) -> Result<()>;
}

fn ns_key(namespace: &Namespace, key: &str) -> String {
    format!("{}::{}", namespace.join("/"), key)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// In-memory `KvStore` + `ValueStore`, backed by `DashMap` the way the
/// teacher's connection-pool cache is — safe to share across async tasks
/// without external locking. Used by unit tests and as a local fallback.
#[derive(Default, Clone)]
pub struct InMemoryKvStore {
    sets: Arc<DashMap<String, DashMap<String, Value>>>,
    value_store: Arc<DashMap<String, ValueStoreItem>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn put(&self, set: &str, key: &str, value: Value) -> Result<bool> {
        let bucket = self.sets.entry(set.to_string()).or_default();
        bucket.insert(key.to_string(), value);
        Ok(true)
    }

    async fn get(&self, set: &str, key: &str) -> Result<Option<Value>> {
        Ok(self
            .sets
            .get(set)
            .and_then(|bucket| bucket.get(key).map(|v| v.clone())))
    }

    async fn delete(&self, set: &str, key: &str) -> Result<bool> {
        Ok(self
            .sets
            .get(set)
            .map(|bucket| bucket.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn scan(&self, set: &str, limit: Option<usize>) -> Result<Vec<Value>> {
        let Some(bucket) = self.sets.get(set) else {
            return Ok(Vec::new());
        };
        let mut items: Vec<Value> = bucket.iter().map(|e| e.value().clone()).collect();
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn query_by_field(&self, set: &str, field: &str, value: &Value) -> Result<Vec<Value>> {
        let Some(bucket) = self.sets.get(set) else {
            return Ok(Vec::new());
        };
        Ok(bucket
            .iter()
            .filter(|e| e.value().get(field) == Some(value))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn exists(&self, set: &str, key: &str) -> Result<bool> {
        Ok(self
            .sets
            .get(set)
            .map(|bucket| bucket.contains_key(key))
            .unwrap_or(false))
    }

    async fn count(&self, set: &str) -> Result<usize> {
        Ok(self.sets.get(set).map(|bucket| bucket.len()).unwrap_or(0))
    }
}

#[async_trait]
impl ValueStore for InMemoryKvStore {
    async fn aput(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
        embedding: Option<Vec<f32>>,
    ) -> Result<()> {
        self.value_store.insert(
            ns_key(namespace, key),
            ValueStoreItem {
                key: key.to_string(),
                value,
                embedding,
            },
        );
        Ok(())
    }

    async fn aget(&self, namespace: &Namespace, key: &str) -> Result<Option<ValueStoreItem>> {
        Ok(self
            .value_store
            .get(&ns_key(namespace, key))
            .map(|v| v.clone()))
    }

    async fn asearch(
        &self,
        namespace: &Namespace,
        query_embedding: Option<&[f32]>,
        limit: usize,
    ) -> Result<Vec<(ValueStoreItem, f32)>> {
        let prefix = format!("{}::", namespace.join("/"));
        let mut matches: Vec<(ValueStoreItem, f32)> = self
            .value_store
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| {
                let item = e.value().clone();
                let score = match (query_embedding, &item.embedding) {
                    (Some(q), Some(emb)) => cosine_similarity(q, emb),
                    _ => 0.0,
                };
                (item, score)
            })
            .collect();

        if query_embedding.is_some() {
            matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        }
        matches.truncate(limit);
        Ok(matches)
    }

    async fn adelete(&self, namespace: &Namespace, key: &str) -> Result<()> {
        self.value_store.remove(&ns_key(namespace, key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryKvStore::new();
        store
            .put("user_features", "u1_profile", json!({"a": 1}))
            .await
            .unwrap();
        let got = store.get("user_features", "u1_profile").await.unwrap();
        assert_eq!(got, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn get_missing_key_returns_none_not_error() {
        let store = InMemoryKvStore::new();
        let got = store.get("user_features", "missing").await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn delete_then_exists_is_false() {
        let store = InMemoryKvStore::new();
        store.put("coupons", "c1", json!({"code": "X"})).await.unwrap();
        assert!(store.delete("coupons", "c1").await.unwrap());
        assert!(!store.exists("coupons", "c1").await.unwrap());
    }

    #[tokio::test]
    async fn value_store_search_without_query_is_lexical_scan() {
        let store = InMemoryKvStore::new();
        let ns = vec!["products".to_string()];
        store
            .aput(&ns, "p1", json!({"name": "Phone"}), Some(vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .aput(&ns, "p2", json!({"name": "Laptop"}), Some(vec![0.0, 1.0]))
            .await
            .unwrap();
        let results = store.asearch(&ns, None, 10).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn value_store_search_with_query_ranks_by_similarity() {
        let store = InMemoryKvStore::new();
        let ns = vec!["products".to_string()];
        store
            .aput(&ns, "p1", json!({"name": "Phone"}), Some(vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .aput(&ns, "p2", json!({"name": "Laptop"}), Some(vec![0.0, 1.0]))
            .await
            .unwrap();
        let results = store.asearch(&ns, Some(&[1.0, 0.0]), 10).await.unwrap();
        assert_eq!(results[0].0.key, "p1");
    }

    #[tokio::test]
    async fn value_store_search_never_errors_when_index_smaller_than_limit() {
        let store = InMemoryKvStore::new();
        let ns = vec!["products".to_string()];
        store
            .aput(&ns, "p1", json!({"name": "Phone"}), Some(vec![1.0, 0.0]))
            .await
            .unwrap();
        let results = store.asearch(&ns, Some(&[1.0, 0.0]), 50).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.5, 0.7071];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }
}
