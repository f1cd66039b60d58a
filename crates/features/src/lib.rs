//! # Churn Platform Features
//!
//! The feature store (C2) and vectorizer (C3): ingest per-family partial
//! feature updates, merge and retrieve them per user, and turn the merged
//! view into the fixed-length vector the scoring model expects.

pub mod model;
pub mod store;
pub mod vectorizer;

pub use model::{
    BehaviorFeatures, CartItemRef, EngagementFeatures, FeatureFamily, FeatureValue, FlatFeatureMap,
    ProfileFeatures, RealtimeFeatures, SupportFeatures, TransactionalFeatures,
};
pub use store::FeatureStore;
pub use vectorizer::{families_present, feature_value_at, has_any_signal, vectorize, FEATURE_COLUMNS, VECTOR_LEN};
