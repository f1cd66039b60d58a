//! # Churn Platform Workflows
//!
//! The two checkpointed staged pipelines (C8, C9): recommendations
//! (cart → features → risk → vector search → discount ranking → cache)
//! and prediction (features → score → decide → generate → send).

pub mod prediction;
pub mod recommendation;

pub use prediction::{PredictionOutcome, PredictionState, PredictionStep, PredictionWorkflow, StepTimings};
pub use recommendation::{
    missing_index_error, read_cached, RankedRecommendation, RecommendationRecord, RecommendationState,
    RecommendationStep, RecommendationsWorkflow,
};
