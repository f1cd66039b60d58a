use churn_catalog::ProductIndex;
use churn_core::{Checkpointer, Config, KvStore, MetricsRegistry, ValueStore};
use churn_features::FeatureStore;
use churn_nudge::NudgeEngine;
use churn_scoring::ChurnScorer;
use churn_workflows::{PredictionWorkflow, RecommendationsWorkflow};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub kv: Arc<dyn KvStore>,
    pub value_store: Arc<dyn ValueStore>,
    pub checkpointer: Arc<dyn Checkpointer>,
    pub features: Arc<FeatureStore>,
    pub scorer: Arc<ChurnScorer>,
    pub nudge: Arc<NudgeEngine>,
    pub index: Arc<ProductIndex>,
    pub prediction_workflow: Arc<PredictionWorkflow>,
    pub recommendations_workflow: Arc<RecommendationsWorkflow>,
    pub metrics: Arc<MetricsRegistry>,
    index_ready: Arc<AtomicBool>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        kv: Arc<dyn KvStore>,
        value_store: Arc<dyn ValueStore>,
        checkpointer: Arc<dyn Checkpointer>,
        features: Arc<FeatureStore>,
        scorer: Arc<ChurnScorer>,
        nudge: Arc<NudgeEngine>,
        index: Arc<ProductIndex>,
        prediction_workflow: Arc<PredictionWorkflow>,
        recommendations_workflow: Arc<RecommendationsWorkflow>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            kv,
            value_store,
            checkpointer,
            features,
            scorer,
            nudge,
            index,
            prediction_workflow,
            recommendations_workflow,
            metrics,
            index_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_index_ready(&self) {
        self.index_ready.store(true, Ordering::Relaxed);
    }

    pub fn index_ready(&self) -> bool {
        self.index_ready.load(Ordering::Relaxed)
    }
}
