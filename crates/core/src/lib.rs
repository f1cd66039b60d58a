//! # Churn Platform Core
//!
//! Shared infrastructure for the churn-prevention platform: configuration,
//! structured errors, the KV store adapter (and its value-store view), the
//! workflow checkpointer, metrics, and small time utilities. Every other
//! crate in the workspace depends on this one and nothing else upward.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod kv_store;
pub mod metrics;
pub mod redis_store;
pub mod utils;

pub use checkpoint::{Checkpointer, InMemoryCheckpointer, KvCheckpointer};
pub use config::Config;
pub use error::{Error, ErrorCode, Result};
pub use kv_store::{InMemoryKvStore, KvStore, Namespace, ValueStore, ValueStoreItem};
pub use metrics::MetricsRegistry;
pub use redis_store::RedisKvStore;
