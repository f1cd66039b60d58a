//! # Checkpointer
//!
//! Per-`(thread_id, checkpoint_ns)` persistence of workflow step state, so a
//! long-running workflow (prediction, recommendations) survives restarts and
//! is inspectable. Checkpoint writes are best-effort but synchronous: if the
//! backing store is unreachable the workflow proceeds in-memory and logs the
//! degradation (the workflow runtime, not this trait, decides that policy).

use crate::error::Result;
use crate::kv_store::{Namespace, ValueStore};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, thread_id: &str, checkpoint_ns: &str, step_index: u32, state: Value) -> Result<()>;
    async fn load_latest(&self, thread_id: &str, checkpoint_ns: &str) -> Result<Option<(u32, Value)>>;
}

/// Default checkpointer: stores one value-store record per
/// `(thread_id, checkpoint_ns)`, overwritten on every `save` with the
/// latest step index and state (the platform only ever resumes from the
/// most recent checkpoint, per the checkpointer contract).
pub struct KvCheckpointer {
    store: Arc<dyn ValueStore>,
}

impl KvCheckpointer {
    pub fn new(store: Arc<dyn ValueStore>) -> Self {
        Self { store }
    }

    fn key(thread_id: &str, checkpoint_ns: &str) -> String {
        format!("{thread_id}:{checkpoint_ns}")
    }

    fn namespace() -> Namespace {
        vec!["workflow_checkpoints".to_string()]
    }
}

#[async_trait]
impl Checkpointer for KvCheckpointer {
    async fn save(&self, thread_id: &str, checkpoint_ns: &str, step_index: u32, state: Value) -> Result<()> {
        let payload = serde_json::json!({ "step_index": step_index, "state": state });
        if let Err(e) = self
            .store
            .aput(&Self::namespace(), &Self::key(thread_id, checkpoint_ns), payload, None)
            .await
        {
            warn!(thread_id, checkpoint_ns, error = %e, "checkpoint write failed, continuing in-memory");
        }
        Ok(())
    }

    async fn load_latest(&self, thread_id: &str, checkpoint_ns: &str) -> Result<Option<(u32, Value)>> {
        let item = self
            .store
            .aget(&Self::namespace(), &Self::key(thread_id, checkpoint_ns))
            .await?;
        Ok(item.and_then(|item| {
            let step_index = item.value.get("step_index")?.as_u64()? as u32;
            let state = item.value.get("state")?.clone();
            Some((step_index, state))
        }))
    }
}

/// Pure in-memory checkpointer, required for deterministic unit tests.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    inner: dashmap::DashMap<String, (u32, Value)>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, thread_id: &str, checkpoint_ns: &str, step_index: u32, state: Value) -> Result<()> {
        self.inner
            .insert(format!("{thread_id}:{checkpoint_ns}"), (step_index, state));
        Ok(())
    }

    async fn load_latest(&self, thread_id: &str, checkpoint_ns: &str) -> Result<Option<(u32, Value)>> {
        Ok(self
            .inner
            .get(&format!("{thread_id}:{checkpoint_ns}"))
            .map(|v| v.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_checkpointer_round_trips_latest_state() {
        let checkpointer = InMemoryCheckpointer::new();
        checkpointer
            .save("predict_u1", "prediction", 0, json!({"current_step": "start"}))
            .await
            .unwrap();
        checkpointer
            .save("predict_u1", "prediction", 1, json!({"current_step": "features_retrieved"}))
            .await
            .unwrap();

        let (step, state) = checkpointer
            .load_latest("predict_u1", "prediction")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(step, 1);
        assert_eq!(state["current_step"], "features_retrieved");
    }

    #[tokio::test]
    async fn load_latest_on_unknown_thread_returns_none() {
        let checkpointer = InMemoryCheckpointer::new();
        assert!(checkpointer
            .load_latest("missing", "ns")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn kv_checkpointer_round_trips_via_value_store() {
        use crate::kv_store::InMemoryKvStore;
        let store: Arc<dyn ValueStore> = Arc::new(InMemoryKvStore::new());
        let checkpointer = KvCheckpointer::new(store);
        checkpointer
            .save("reco_u2", "recommendations", 3, json!({"cart_total": 99.5}))
            .await
            .unwrap();
        let (step, state) = checkpointer
            .load_latest("reco_u2", "recommendations")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(step, 3);
        assert_eq!(state["cart_total"], 99.5);
    }
}
