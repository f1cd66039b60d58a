//! Prediction workflow (C9): `retrieve_features → predict_churn →
//! decide_nudge → (generate_nudge → send_nudge | end)`, with a parallel
//! `error_handler` terminal, checkpointed after every node.
//!
//! The node sequence is represented as a sum-type state with one variant
//! per step (`PredictionStep`) and a pure transition function per step,
//! per the "staged workflows → first-class state machine" design note:
//! the runtime loop below owns persistence and message logging, each
//! `step_*` function owns only its own node's business logic.

use churn_core::checkpoint::Checkpointer;
use churn_core::error::{Error, ErrorCode, Result};
use churn_features::{FeatureStore, FlatFeatureMap};
use churn_nudge::{MessageContext, NudgeEngine, NudgeOutcome};
use churn_scoring::{ChurnPrediction, ChurnScorer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStep {
    RetrieveFeatures,
    PredictChurn,
    DecideNudge,
    GenerateNudge,
    SendNudge,
    End,
    Error,
}

/// Checkpointed state for one prediction run. Every node appends a short
/// human-readable reasoning line to `messages` for observability, mirroring
/// the AI-role message list from the source graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionState {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_features: Option<FlatFeatureMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_freshness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub churn_prediction: Option<ChurnPrediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_nudge: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nudge_outcome: Option<NudgeOutcome>,
    pub current_step: PredictionStep,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed: bool,
    pub messages: Vec<String>,
}

impl PredictionState {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            user_features: None,
            feature_freshness: None,
            churn_prediction: None,
            should_nudge: None,
            nudge_outcome: None,
            current_step: PredictionStep::RetrieveFeatures,
            error: None,
            completed: false,
            messages: Vec::new(),
        }
    }

    fn fail(&mut self, step: &str, message: impl Into<String>) {
        let message = message.into();
        error!(user_id = %self.user_id, step, error = %message, "prediction workflow step failed");
        self.error = Some(message);
        self.current_step = PredictionStep::Error;
        self.completed = true;
    }

    fn log(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }
}

/// Per-node wall-clock timings, captured for `/predict/test`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepTimings {
    pub retrieve_features_ms: u128,
    pub predict_churn_ms: u128,
    pub decide_nudge_ms: u128,
    pub generate_nudge_ms: u128,
}

#[derive(Debug)]
pub struct PredictionOutcome {
    pub state: PredictionState,
    pub timings: StepTimings,
}

pub struct PredictionWorkflow {
    features: Arc<FeatureStore>,
    scorer: Arc<ChurnScorer>,
    nudge: Arc<NudgeEngine>,
    checkpointer: Arc<dyn Checkpointer>,
}

impl PredictionWorkflow {
    pub fn new(
        features: Arc<FeatureStore>,
        scorer: Arc<ChurnScorer>,
        nudge: Arc<NudgeEngine>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        Self { features, scorer, nudge, checkpointer }
    }

    pub async fn run(&self, user_id: &str) -> Result<PredictionOutcome> {
        self.run_with_timings(user_id).await
    }

    async fn run_with_timings(&self, user_id: &str) -> Result<PredictionOutcome> {
        let thread_id = format!("predict_{user_id}");
        let mut state = PredictionState::new(user_id);
        let mut timings = StepTimings::default();
        let mut step_index = 0u32;

        self.checkpoint(&thread_id, step_index, &state).await;
        let started = tokio::time::Instant::now();
        self.step_retrieve_features(&mut state).await;
        timings.retrieve_features_ms = started.elapsed().as_millis();
        step_index += 1;
        self.checkpoint(&thread_id, step_index, &state).await;

        if state.current_step != PredictionStep::Error {
            let started = tokio::time::Instant::now();
            self.step_predict_churn(&mut state);
            timings.predict_churn_ms = started.elapsed().as_millis();
            step_index += 1;
            self.checkpoint(&thread_id, step_index, &state).await;
        }

        if state.current_step != PredictionStep::Error {
            let started = tokio::time::Instant::now();
            self.step_decide_nudge(&mut state);
            timings.decide_nudge_ms = started.elapsed().as_millis();
            step_index += 1;
            self.checkpoint(&thread_id, step_index, &state).await;
        }

        if state.current_step == PredictionStep::GenerateNudge {
            let started = tokio::time::Instant::now();
            self.step_generate_and_send_nudge(&mut state).await;
            timings.generate_nudge_ms = started.elapsed().as_millis();
            step_index += 1;
            self.checkpoint(&thread_id, step_index, &state).await;
        }

        if !state.completed {
            state.current_step = PredictionStep::End;
            state.completed = true;
            self.checkpoint(&thread_id, step_index + 1, &state).await;
        }

        if state.error.is_some() && state.user_features.is_none() {
            return Err(Error::new(ErrorCode::NotFound, "no features on record for user")
                .with_details(state.error.clone().unwrap_or_default()));
        }

        Ok(PredictionOutcome { state, timings })
    }

    async fn checkpoint(&self, thread_id: &str, step_index: u32, state: &PredictionState) {
        let snapshot = serde_json::to_value(state).expect("PredictionState always serializes");
        if let Err(e) = self.checkpointer.save(thread_id, "prediction", step_index, snapshot).await {
            warn!(thread_id, error = %e, "prediction checkpoint save failed, continuing in-memory");
        }
    }

    async fn step_retrieve_features(&self, state: &mut PredictionState) {
        match self.features.retrieve_all(&state.user_id).await {
            Ok((features, freshness)) if !features.is_empty() => {
                state.log(format!("retrieved {} feature(s) for {}", features.len(), state.user_id));
                state.user_features = Some(features);
                state.feature_freshness = freshness;
                state.current_step = PredictionStep::PredictChurn;
            }
            Ok(_) => state.fail("retrieve_features", "no features on record for user"),
            Err(e) => state.fail("retrieve_features", e.to_string()),
        }
    }

    fn step_predict_churn(&self, state: &mut PredictionState) {
        let Some(features) = state.user_features.as_ref() else {
            state.fail("predict_churn", "missing features from prior step");
            return;
        };
        let prediction = self.scorer.predict_churn(features);
        state.log(format!(
            "churn probability {:.2} ({})",
            prediction.churn_probability,
            prediction.risk_segment.as_str()
        ));
        state.churn_prediction = Some(prediction);
        state.current_step = PredictionStep::DecideNudge;
    }

    fn step_decide_nudge(&self, state: &mut PredictionState) {
        let Some(prediction) = state.churn_prediction.as_ref() else {
            state.fail("decide_nudge", "missing churn prediction from prior step");
            return;
        };
        let matched = churn_nudge::find_matching_rule(prediction.churn_probability, &prediction.churn_reasons);
        state.should_nudge = Some(matched.is_some());
        if matched.is_some() {
            state.log("nudge decision: trigger");
            state.current_step = PredictionStep::GenerateNudge;
        } else {
            state.log("nudge decision: none");
            state.current_step = PredictionStep::End;
            state.completed = true;
        }
    }

    async fn step_generate_and_send_nudge(&self, state: &mut PredictionState) {
        let Some(prediction) = state.churn_prediction.clone() else {
            state.fail("generate_nudge", "missing churn prediction from prior step");
            return;
        };
        let context = message_context_from_features(state.user_features.as_ref());

        match self.nudge.trigger(&state.user_id, prediction.churn_probability, &prediction.churn_reasons, &context).await {
            Ok(outcome) => {
                state.log(format!("nudge sent via rule {}", outcome.rule_matched));
                state.nudge_outcome = Some(outcome);
                state.current_step = PredictionStep::SendNudge;
                state.completed = true;
            }
            Err(e) => {
                warn!(user_id = %state.user_id, error = %e, "nudge trigger failed, prediction still completes");
                state.log(format!("nudge trigger failed: {e}"));
                state.current_step = PredictionStep::SendNudge;
                state.completed = true;
            }
        }
    }
}

fn message_context_from_features(features: Option<&FlatFeatureMap>) -> MessageContext {
    let mut context = MessageContext::default();
    let Some(features) = features else {
        return context;
    };
    context.loyalty_tier = features.get("loyalty_tier").and_then(|v| v.as_str()).map(String::from);
    context.orders_6m = features.get("orders_6m").and_then(|v| v.as_f64()).map(|v| v as i64);
    context.avg_order_val = features.get("avg_order_val").and_then(|v| v.as_f64());
    context.days_last_purch = features.get("days_last_purch").and_then(|v| v.as_f64()).map(|v| v as i64);
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_core::checkpoint::InMemoryCheckpointer;
    use churn_core::kv_store::{InMemoryKvStore, KvStore};
    use churn_features::FeatureFamily;
    use churn_scoring::{ChurnScorer, ModelArtifact, RuleBasedExplainer, Tree, TreeNode};
    use serde_json::json;
    use std::sync::Arc;

    fn workflow() -> (PredictionWorkflow, Arc<FeatureStore>) {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let features = Arc::new(FeatureStore::new(kv.clone()));
        let model = Arc::new(ModelArtifact {
            trees: vec![Tree {
                nodes: vec![TreeNode { feature_index: 0, threshold: 0.0, left: usize::MAX, right: usize::MAX, leaf_weight: 3.0 }],
            }],
            base_score: 0.0,
        });
        let scorer = Arc::new(ChurnScorer::new(model, Box::new(RuleBasedExplainer)));
        let http = reqwest::Client::new();
        let generator = churn_nudge::MessageGenerator::new(http.clone(), "http://localhost:9".to_string(), "k".to_string(), "m".to_string());
        let nudge = Arc::new(NudgeEngine::new(kv, http, "http://localhost:9".to_string(), generator));
        let checkpointer: Arc<dyn Checkpointer> = Arc::new(InMemoryCheckpointer::new());
        (PredictionWorkflow::new(features.clone(), scorer, nudge, checkpointer), features)
    }

    #[tokio::test]
    async fn missing_features_surfaces_not_found() {
        let (workflow, _features) = workflow();
        let err = workflow.run("ghost").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn full_run_with_features_completes_and_checkpoints_every_node() {
        let (workflow, features) = workflow();
        features.ingest("u1", FeatureFamily::Behavior, json!({"days_last_login": 20})).await.unwrap();

        let outcome = workflow.run("u1").await.unwrap();
        assert!(outcome.state.completed);
        assert!(outcome.state.churn_prediction.is_some());
        assert!(!outcome.state.messages.is_empty());
    }
}
