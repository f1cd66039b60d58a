//! Prometheus metrics registry, mirroring the teacher's
//! `MetricsRegistry`/`MetricsService` split: a process-wide [`prometheus::Registry`]
//! plus typed handles for the counters/histograms the platform emits.
//!
//! The public scrape endpoint (`GET /metrics`) is intentionally stubbed at
//! the API layer — telemetry/monitoring endpoints are out of scope per the
//! platform specification — but the registry and instrumentation points
//! below are real and exercised by the workflows.

use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};

#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Registry,
    pub predictions_total: IntCounterVec,
    pub nudges_triggered_total: IntCounterVec,
    pub recommendation_latency: Histogram,
    pub kv_store_op_latency: Histogram,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let predictions_total = IntCounterVec::new(
            Opts::new("churn_predictions_total", "Total churn predictions served"),
            &["risk_segment"],
        )
        .expect("metric names are static and valid");

        let nudges_triggered_total = IntCounterVec::new(
            Opts::new("churn_nudges_triggered_total", "Total nudges triggered"),
            &["rule_id"],
        )
        .expect("metric names are static and valid");

        let recommendation_latency = Histogram::with_opts(HistogramOpts::new(
            "churn_recommendation_latency_seconds",
            "Latency of the recommendations workflow",
        ))
        .expect("metric names are static and valid");

        let kv_store_op_latency = Histogram::with_opts(HistogramOpts::new(
            "churn_kv_store_op_latency_seconds",
            "Latency of KV store operations",
        ))
        .expect("metric names are static and valid");

        registry
            .register(Box::new(predictions_total.clone()))
            .expect("registration of a fresh metric cannot collide");
        registry
            .register(Box::new(nudges_triggered_total.clone()))
            .expect("registration of a fresh metric cannot collide");
        registry
            .register(Box::new(recommendation_latency.clone()))
            .expect("registration of a fresh metric cannot collide");
        registry
            .register(Box::new(kv_store_op_latency.clone()))
            .expect("registration of a fresh metric cannot collide");

        Self {
            registry,
            predictions_total,
            nudges_triggered_total,
            recommendation_latency,
            kv_store_op_latency,
        }
    }

    pub fn record_prediction(&self, risk_segment: &str) {
        self.predictions_total.with_label_values(&[risk_segment]).inc();
    }

    pub fn record_nudge(&self, rule_id: &str) {
        self.nudges_triggered_total.with_label_values(&[rule_id]).inc();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_prediction_increments_counter() {
        let metrics = MetricsRegistry::new();
        metrics.record_prediction("critical");
        metrics.record_prediction("critical");
        let value = metrics
            .predictions_total
            .with_label_values(&["critical"])
            .get();
        assert_eq!(value, 2);
    }
}
