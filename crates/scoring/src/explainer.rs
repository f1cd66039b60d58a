//! Explanation strategies for a single prediction: attribution-based
//! (walks the model's own decision paths) with a rule-based fallback that
//! fires on fixed feature thresholds when no attribution explainer is
//! configured.

use crate::model::{ModelArtifact, Tree};
use churn_features::vectorizer::FEATURE_COLUMNS;
use churn_features::FlatFeatureMap;
use std::collections::HashMap;
use std::sync::Arc;

/// A single human-facing churn reason, optionally tied to the feature
/// that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChurnReason {
    pub code: String,
    pub phrase: String,
}

pub trait Explainer: Send + Sync {
    fn explain(&self, features: &FlatFeatureMap, vector: &[f64], churn_prob: f64) -> Vec<ChurnReason>;

    /// Raw per-slot signed contributions, exposed separately so the
    /// scorer can populate `feature_importance`/`shap_values` without
    /// re-deriving the human phrases. Returns an empty map for
    /// explainers that don't compute per-feature attributions.
    fn contributions(&self, _vector: &[f64]) -> HashMap<usize, f64> {
        HashMap::new()
    }
}

/// Phrase table for the top contributing features, `spec.md` §4.4 step 5.
fn phrase_for(feature_name: &str, features: &FlatFeatureMap) -> Option<String> {
    match feature_name {
        "days_last_login" => features
            .get("days_last_login")
            .and_then(|v| v.as_f64())
            .map(|n| format!("Inactive for {} days", n as i64)),
        "abandon_count" => features
            .get("abandon_count")
            .and_then(|v| v.as_f64())
            .map(|n| format!("Abandoned cart {} times recently", n as i64)),
        "cart_abandon" => Some("High cart abandonment rate".to_string()),
        "sess_7d" => Some("Low recent session activity".to_string()),
        "csat_score" => Some("Poor support satisfaction".to_string()),
        "refund_rate" => Some("Elevated refund rate".to_string()),
        "days_last_purch" => Some("Declining purchase activity".to_string()),
        "tickets_90d" => Some("Elevated support ticket volume".to_string()),
        _ => None,
    }
}

/// Walks every tree's decision path for this prediction and accumulates
/// each split feature's signed contribution to the leaf sum — a
/// from-scratch analog of a path-dependent TreeExplainer, scoped to this
/// single-prediction use case, without a `shap` dependency.
pub struct AttributionExplainer {
    model: Arc<ModelArtifact>,
}

impl AttributionExplainer {
    pub fn new(model: Arc<ModelArtifact>) -> Self {
        Self { model }
    }
}

impl Explainer for AttributionExplainer {
    fn contributions(&self, vector: &[f64]) -> HashMap<usize, f64> {
        let mut out = HashMap::new();
        for tree in &self.model.trees {
            let (_, path) = tree.walk(vector);
            for window in path.windows(2) {
                let (parent_idx, child_idx) = (window[0], window[1]);
                let parent = &tree.nodes[parent_idx];
                let sibling_idx = if parent.left == child_idx { parent.right } else { parent.left };
                let taken = leaf_weight_of(tree, child_idx);
                let sibling = leaf_weight_of(tree, sibling_idx);
                *out.entry(parent.feature_index).or_insert(0.0) += taken - sibling;
            }
        }
        out
    }

    fn explain(&self, features: &FlatFeatureMap, vector: &[f64], _churn_prob: f64) -> Vec<ChurnReason> {
        let mut ranked: Vec<(usize, f64)> = self
            .contributions(vector)
            .into_iter()
            .filter(|(_, c)| *c > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        ranked
            .into_iter()
            .take(5)
            .filter_map(|(idx, _)| {
                let name = FEATURE_COLUMNS.get(idx)?;
                let phrase = phrase_for(trim_enc_suffix(name), features)?;
                Some(ChurnReason {
                    code: name.to_string(),
                    phrase,
                })
            })
            .collect()
    }
}

fn trim_enc_suffix(name: &str) -> &str {
    name.trim_end_matches("_enc")
}

fn leaf_weight_of(tree: &Tree, idx: usize) -> f64 {
    let mut i = idx;
    loop {
        let node = &tree.nodes[i];
        if node.is_leaf() {
            return node.leaf_weight;
        }
        i = node.left;
    }
}

/// Fixed threshold rules lifted verbatim from the original predictor's
/// `_generate_churn_reasons`, used when no attribution explainer is
/// configured.
pub struct RuleBasedExplainer;

impl Explainer for RuleBasedExplainer {
    fn explain(&self, features: &FlatFeatureMap, _vector: &[f64], churn_prob: f64) -> Vec<ChurnReason> {
        let get = |name: &str| features.get(name).and_then(|v| v.as_f64());
        let mut reasons = Vec::new();

        if get("days_last_login").unwrap_or(0.0) > 7.0 {
            reasons.push(reason("INACTIVITY"));
        }
        if get("cart_abandon").unwrap_or(0.0) > 0.5 {
            reasons.push(reason("CART_ABANDONMENT"));
        }
        if get("sess_7d").unwrap_or(0.0) < 2.0 {
            reasons.push(reason("LOW_ENGAGEMENT"));
        }
        if get("csat_score").unwrap_or(5.0) < 3.0 {
            reasons.push(reason("POOR_SUPPORT_EXPERIENCE"));
        }
        if get("refund_rate").unwrap_or(0.0) > 0.3 {
            reasons.push(reason("HIGH_REFUND_RATE"));
        }
        if get("days_last_purch").unwrap_or(0.0) > 30.0 {
            reasons.push(reason("PURCHASE_DECLINE"));
        }
        if get("tickets_90d").unwrap_or(0.0) > 3.0 {
            reasons.push(reason("SUPPORT_ISSUES"));
        }

        if reasons.is_empty() && churn_prob > 0.6 {
            reasons.push(reason("BEHAVIORAL_PATTERNS"));
        }

        reasons.truncate(3);
        reasons
    }
}

fn reason(code: &str) -> ChurnReason {
    ChurnReason {
        code: code.to_string(),
        phrase: code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TreeNode;
    use churn_features::FeatureValue;

    fn map(entries: &[(&str, f64)]) -> FlatFeatureMap {
        entries.iter().map(|(k, v)| (k.to_string(), FeatureValue::Number(*v))).collect()
    }

    #[test]
    fn rule_based_explainer_fires_inactivity_and_cart_abandonment() {
        let features = map(&[("days_last_login", 20.0), ("cart_abandon", 0.8)]);
        let reasons = RuleBasedExplainer.explain(&features, &[0.0; 36], 0.9);
        let codes: Vec<_> = reasons.iter().map(|r| r.code.as_str()).collect();
        assert!(codes.contains(&"INACTIVITY"));
        assert!(codes.contains(&"CART_ABANDONMENT"));
    }

    #[test]
    fn rule_based_explainer_caps_at_three_reasons() {
        let features = map(&[
            ("days_last_login", 20.0),
            ("cart_abandon", 0.8),
            ("sess_7d", 0.0),
            ("csat_score", 1.0),
            ("refund_rate", 0.9),
        ]);
        let reasons = RuleBasedExplainer.explain(&features, &[0.0; 36], 0.9);
        assert_eq!(reasons.len(), 3);
    }

    #[test]
    fn rule_based_explainer_falls_back_to_behavioral_patterns() {
        let reasons = RuleBasedExplainer.explain(&FlatFeatureMap::new(), &[0.0; 36], 0.7);
        assert_eq!(reasons, vec![reason("BEHAVIORAL_PATTERNS")]);
    }

    #[test]
    fn rule_based_explainer_emits_nothing_when_low_risk_and_clean() {
        let reasons = RuleBasedExplainer.explain(&FlatFeatureMap::new(), &[0.0; 36], 0.3);
        assert!(reasons.is_empty());
    }

    #[test]
    fn attribution_explainer_credits_the_decisive_split_feature() {
        let tree = Tree {
            nodes: vec![
                TreeNode { feature_index: 7, threshold: 5.0, left: 1, right: 2, leaf_weight: 0.0 },
                TreeNode { feature_index: 0, threshold: 0.0, left: usize::MAX, right: usize::MAX, leaf_weight: -2.0 },
                TreeNode { feature_index: 0, threshold: 0.0, left: usize::MAX, right: usize::MAX, leaf_weight: 2.0 },
            ],
        };
        let model = Arc::new(ModelArtifact { trees: vec![tree], base_score: 0.0 });
        let explainer = AttributionExplainer::new(model);

        let mut vector = [0.0f64; 36];
        vector[7] = 20.0;
        let features = map(&[("days_last_login", 20.0)]);

        let reasons = explainer.explain(&features, &vector, 0.9);
        assert_eq!(reasons[0].code, "days_last_login");
        assert_eq!(reasons[0].phrase, "Inactive for 20 days");
    }
}
