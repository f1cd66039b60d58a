//! `ChurnScorer`: vectorize, query the model, apply the dynamic
//! cart-abandonment boost, segment, and explain — the full C4 algorithm
//! from feature map to prediction response.

use crate::explainer::{ChurnReason, Explainer};
use crate::model::ModelArtifact;
use churn_features::vectorizer::{vectorize, FEATURE_COLUMNS};
use churn_features::FlatFeatureMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSegment {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskSegment {
    pub fn from_probability(p: f64) -> Self {
        if p >= 0.8 {
            RiskSegment::Critical
        } else if p >= 0.6 {
            RiskSegment::High
        } else if p >= 0.4 {
            RiskSegment::Medium
        } else {
            RiskSegment::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskSegment::Critical => "critical",
            RiskSegment::High => "high",
            RiskSegment::Medium => "medium",
            RiskSegment::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChurnPrediction {
    pub churn_probability: f64,
    pub risk_segment: RiskSegment,
    pub churn_reasons: Vec<String>,
    pub feature_importance: HashMap<String, f64>,
    pub shap_values: HashMap<String, f64>,
    pub confidence_score: f64,
}

pub struct ChurnScorer {
    model: Arc<ModelArtifact>,
    explainer: Box<dyn Explainer>,
}

impl ChurnScorer {
    pub fn new(model: Arc<ModelArtifact>, explainer: Box<dyn Explainer>) -> Self {
        Self { model, explainer }
    }

    pub fn predict_churn(&self, features: &FlatFeatureMap) -> ChurnPrediction {
        let vector = vectorize(features);

        let base_p = self.model.predict_proba(&vector);
        let abandon_count = features.get("abandon_count").and_then(|v| v.as_f64()).unwrap_or(0.0) as i64;
        let boosted_p = apply_abandon_boost(base_p, abandon_count);

        let risk_segment = RiskSegment::from_probability(boosted_p);
        let reasons: Vec<ChurnReason> = self.explainer.explain(features, &vector, boosted_p);

        let contributions = self.explainer.contributions(&vector);
        let mut feature_importance = HashMap::new();
        let mut shap_values = HashMap::new();
        for (idx, value) in contributions {
            if let Some(name) = FEATURE_COLUMNS.get(idx) {
                feature_importance.insert(name.to_string(), value.abs());
                shap_values.insert(name.to_string(), value);
            }
        }

        ChurnPrediction {
            churn_probability: boosted_p,
            risk_segment,
            churn_reasons: reasons.into_iter().map(|r| r.phrase).collect(),
            feature_importance,
            shap_values,
            confidence_score: confidence_score(boosted_p),
        }
    }
}

/// `spec.md` §4.4 step 3: add `0.10`/`0.15`/`0.20` for `abandon_count`
/// `1`/`2`/`>=3`, capped at `0.95`.
fn apply_abandon_boost(p: f64, abandon_count: i64) -> f64 {
    let boost = match abandon_count {
        n if n >= 3 => 0.20,
        2 => 0.15,
        1 => 0.10,
        _ => 0.0,
    };
    (p + boost).min(0.95)
}

fn confidence_score(p: f64) -> f64 {
    (p - 0.5).abs().mul_add(2.0, 0.0).clamp(0.6, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explainer::RuleBasedExplainer;
    use crate::model::{Tree, TreeNode};
    use churn_features::FeatureValue;

    fn flat_model(base_score: f64) -> ModelArtifact {
        ModelArtifact {
            trees: vec![Tree {
                nodes: vec![TreeNode {
                    feature_index: 0,
                    threshold: 0.0,
                    left: usize::MAX,
                    right: usize::MAX,
                    leaf_weight: 0.0,
                }],
            }],
            base_score,
        }
    }

    fn map(entries: &[(&str, f64)]) -> FlatFeatureMap {
        entries.iter().map(|(k, v)| (k.to_string(), FeatureValue::Number(*v))).collect()
    }

    #[test]
    fn probability_stays_within_bounds() {
        let scorer = ChurnScorer::new(Arc::new(flat_model(10.0)), Box::new(RuleBasedExplainer));
        let pred = scorer.predict_churn(&map(&[("abandon_count", 5.0)]));
        assert!(pred.churn_probability >= 0.0 && pred.churn_probability <= 0.95);
    }

    #[test]
    fn boost_is_monotone_in_abandon_count_until_cap() {
        let scorer = ChurnScorer::new(Arc::new(flat_model(-1.0)), Box::new(RuleBasedExplainer));
        let p0 = scorer.predict_churn(&map(&[("abandon_count", 0.0)])).churn_probability;
        let p1 = scorer.predict_churn(&map(&[("abandon_count", 1.0)])).churn_probability;
        let p2 = scorer.predict_churn(&map(&[("abandon_count", 2.0)])).churn_probability;
        let p3 = scorer.predict_churn(&map(&[("abandon_count", 3.0)])).churn_probability;
        assert!(p0 <= p1 && p1 <= p2 && p2 <= p3);
    }

    #[test]
    fn segment_boundaries_match_spec() {
        assert_eq!(RiskSegment::from_probability(0.8), RiskSegment::Critical);
        assert_eq!(RiskSegment::from_probability(0.79), RiskSegment::High);
        assert_eq!(RiskSegment::from_probability(0.6), RiskSegment::High);
        assert_eq!(RiskSegment::from_probability(0.4), RiskSegment::Medium);
        assert_eq!(RiskSegment::from_probability(0.39), RiskSegment::Low);
    }

    #[test]
    fn confidence_score_is_clamped() {
        assert_eq!(confidence_score(0.5), 0.6);
        assert_eq!(confidence_score(1.0), 0.95);
    }
}
