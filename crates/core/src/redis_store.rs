//! Production [`KvStore`]/[`ValueStore`] backed by Redis, following the
//! same `redis::aio::ConnectionManager` pattern `erp-api` uses for its
//! cache connection: one shared, internally-reconnecting connection
//! manager per process.
//!
//! Direct-bins records are stored as Redis hashes (`HSET`/`HGETALL`);
//! wrapped `data`-bin records and value-store items are stored as single
//! JSON blobs (`SET`/`GET`) under a namespaced key, with set membership
//! tracked in a Redis set for `scan`/`asearch` lexical enumeration.

use crate::error::{Error, ErrorCode, Result};
use crate::kv_store::{cosine_similarity, KvStore, Namespace, ValueStore, ValueStoreItem};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::{error, warn};

#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisKvStore {
    pub async fn connect(redis_url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            namespace: namespace.into(),
        })
    }

    fn members_key(&self, set: &str) -> String {
        format!("{}:{}:__members", self.namespace, set)
    }

    fn hash_key(&self, set: &str, key: &str) -> String {
        format!("{}:{}:{}", self.namespace, set, key)
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn put(&self, set: &str, key: &str, value: Value) -> Result<bool> {
        let mut conn = self.conn.clone();
        let hkey = self.hash_key(set, key);
        let Value::Object(fields) = &value else {
            return Err(Error::validation("KV store record must be a JSON object"));
        };
        let pairs: Vec<(String, String)> = fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_string(v).unwrap_or_default()))
            .collect();
        let result: std::result::Result<(), redis::RedisError> = async {
            conn.hset_multiple::<_, _, _, ()>(&hkey, &pairs).await?;
            conn.sadd::<_, _, ()>(self.members_key(set), key).await?;
            Ok(())
        }
        .await;
        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(error = %e, set, key, "redis put failed");
                Err(Error::new(ErrorCode::KvStoreWriteError, "Redis write failed")
                    .with_details(e.to_string()))
            }
        }
    }

    async fn get(&self, set: &str, key: &str) -> Result<Option<Value>> {
        let mut conn = self.conn.clone();
        let hkey = self.hash_key(set, key);
        let raw: std::collections::HashMap<String, String> = match conn.hgetall(&hkey).await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, set, key, "redis get failed, treating as reconnect-on-next-op");
                return Ok(None);
            }
        };
        if raw.is_empty() {
            return Ok(None);
        }
        let mut obj = serde_json::Map::new();
        for (k, v) in raw {
            obj.insert(k, serde_json::from_str(&v).unwrap_or(Value::String(v)));
        }
        Ok(Some(Value::Object(obj)))
    }

    async fn delete(&self, set: &str, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let hkey = self.hash_key(set, key);
        let removed: i64 = conn.del(&hkey).await.unwrap_or(0);
        let _: std::result::Result<i64, _> = conn.srem(self.members_key(set), key).await;
        Ok(removed > 0)
    }

    async fn scan(&self, set: &str, limit: Option<usize>) -> Result<Vec<Value>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(self.members_key(set)).await.unwrap_or_default();
        let mut out = Vec::new();
        for key in members {
            if let Some(v) = self.get(set, &key).await? {
                out.push(v);
            }
            if let Some(limit) = limit {
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    async fn query_by_field(&self, set: &str, field: &str, value: &Value) -> Result<Vec<Value>> {
        let all = self.scan(set, None).await?;
        Ok(all
            .into_iter()
            .filter(|v| v.get(field) == Some(value))
            .collect())
    }

    async fn exists(&self, set: &str, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.sismember(self.members_key(set), key).await.unwrap_or(false);
        Ok(exists)
    }

    async fn count(&self, set: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let count: usize = conn.scard(self.members_key(set)).await.unwrap_or(0);
        Ok(count)
    }
}

fn vs_key(namespace: &Namespace, key: &str) -> String {
    format!("{}::{}", namespace.join("/"), key)
}

#[async_trait]
impl ValueStore for RedisKvStore {
    async fn aput(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
        embedding: Option<Vec<f32>>,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let item = ValueStoreItem {
            key: key.to_string(),
            value,
            embedding,
        };
        let blob = serde_json::to_string(&item)?;
        let storage_key = format!("{}:vs:{}", self.namespace, vs_key(namespace, key));
        let members_key = format!("{}:vs:{}:__members", self.namespace, namespace.join("/"));
        conn.set::<_, _, ()>(&storage_key, blob).await?;
        conn.sadd::<_, _, ()>(&members_key, key).await?;
        Ok(())
    }

    async fn aget(&self, namespace: &Namespace, key: &str) -> Result<Option<ValueStoreItem>> {
        let mut conn = self.conn.clone();
        let storage_key = format!("{}:vs:{}", self.namespace, vs_key(namespace, key));
        let raw: Option<String> = conn.get(&storage_key).await.unwrap_or(None);
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    async fn asearch(
        &self,
        namespace: &Namespace,
        query_embedding: Option<&[f32]>,
        limit: usize,
    ) -> Result<Vec<(ValueStoreItem, f32)>> {
        let mut conn = self.conn.clone();
        let members_key = format!("{}:vs:{}:__members", self.namespace, namespace.join("/"));
        let members: Vec<String> = conn.smembers(&members_key).await.unwrap_or_default();

        let mut results = Vec::new();
        for key in members {
            if let Some(item) = self.aget(namespace, &key).await? {
                let score = match (query_embedding, &item.embedding) {
                    (Some(q), Some(emb)) => cosine_similarity(q, emb),
                    _ => 0.0,
                };
                results.push((item, score));
            }
        }
        if query_embedding.is_some() {
            results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        }
        results.truncate(limit);
        Ok(results)
    }

    async fn adelete(&self, namespace: &Namespace, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let storage_key = format!("{}:vs:{}", self.namespace, vs_key(namespace, key));
        let members_key = format!("{}:vs:{}:__members", self.namespace, namespace.join("/"));
        conn.del::<_, ()>(&storage_key).await?;
        conn.srem::<_, _, ()>(&members_key, key).await?;
        Ok(())
    }
}
