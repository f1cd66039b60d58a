//! The persisted model artifact: a small gradient-boosted ensemble over
//! the 36-slot feature vector. Training is out of scope, but the artifact
//! format is the scorer's actual contract, so it is a first-class,
//! JSON-serializable type rather than an opaque blob.

use churn_core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One split or leaf node in a tree, stored as a flat array with
/// `left`/`right` child indices (`usize::MAX` marks "no child", i.e. a
/// leaf).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature_index: usize,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
    /// Leaf weight, meaningful only when both children are absent.
    pub leaf_weight: f64,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.left == usize::MAX && self.right == usize::MAX
    }
}

/// A single shallow decision tree, at most depth 6, over the 36-slot
/// vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Walks the tree for `vector`, returning the leaf weight and the
    /// decision path (node indices visited, root first).
    pub fn walk(&self, vector: &[f64]) -> (f64, Vec<usize>) {
        let mut path = Vec::new();
        let mut idx = 0usize;
        loop {
            path.push(idx);
            let node = &self.nodes[idx];
            if node.is_leaf() {
                return (node.leaf_weight, path);
            }
            let value = vector.get(node.feature_index).copied().unwrap_or(0.0);
            idx = if value < node.threshold { node.left } else { node.right };
        }
    }
}

/// The full ensemble: sum of tree leaf weights through a logistic link,
/// the same `sum-of-trees -> sigmoid` contract `XGBClassifier.predict_proba`
/// exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub trees: Vec<Tree>,
    #[serde(default)]
    pub base_score: f64,
}

impl ModelArtifact {
    pub fn predict_proba(&self, vector: &[f64]) -> f64 {
        let sum: f64 = self.base_score + self.trees.iter().map(|t| t.walk(vector).0).sum::<f64>();
        sigmoid(sum)
    }

    /// Decision paths for every tree, for the attribution explainer.
    pub fn walk_all(&self, vector: &[f64]) -> Vec<(f64, Vec<usize>)> {
        self.trees.iter().map(|t| t.walk(vector)).collect()
    }

    /// Loads from the first existing path among `primary` and a fixed
    /// fallback list, matching the multi-path load behavior of the
    /// original predictor. A missing artifact is a fatal startup error,
    /// never a synthetic fallback model.
    pub fn load(primary: Option<&str>) -> Result<Self> {
        let mut candidates: Vec<String> = Vec::new();
        if let Some(p) = primary {
            candidates.push(p.to_string());
        }
        candidates.push("./models/churn_model.json".to_string());
        candidates.push("/app/models/churn_model.json".to_string());

        for path in &candidates {
            if Path::new(path).exists() {
                let bytes = std::fs::read(path)
                    .map_err(|e| Error::new(churn_core::error::ErrorCode::ModelMissing, e.to_string()))?;
                let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;
                return Ok(artifact);
            }
        }

        Err(Error::new(
            churn_core::error::ErrorCode::ModelMissing,
            format!("no model artifact found in any of: {candidates:?}"),
        ))
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_tree(feature_index: usize, threshold: f64, low_weight: f64, high_weight: f64) -> Tree {
        Tree {
            nodes: vec![
                TreeNode { feature_index, threshold, left: 1, right: 2, leaf_weight: 0.0 },
                TreeNode { feature_index: 0, threshold: 0.0, left: usize::MAX, right: usize::MAX, leaf_weight: low_weight },
                TreeNode { feature_index: 0, threshold: 0.0, left: usize::MAX, right: usize::MAX, leaf_weight: high_weight },
            ],
        }
    }

    #[test]
    fn tree_walks_to_correct_leaf() {
        let tree = stub_tree(7, 5.0, -1.0, 1.0);
        let mut vector = [0.0f64; 36];
        vector[7] = 10.0;
        let (weight, path) = tree.walk(&vector);
        assert_eq!(weight, 1.0);
        assert_eq!(path, vec![0, 2]);
    }

    #[test]
    fn ensemble_sums_trees_through_sigmoid() {
        let artifact = ModelArtifact {
            trees: vec![stub_tree(7, 5.0, -2.0, 2.0), stub_tree(13, 0.5, -2.0, 2.0)],
            base_score: 0.0,
        };
        let mut vector = [0.0f64; 36];
        vector[7] = 10.0;
        vector[13] = 0.9;
        let p = artifact.predict_proba(&vector);
        assert!(p > 0.95);
    }

    #[test]
    fn load_fails_fatally_when_no_artifact_exists() {
        let result = ModelArtifact::load(Some("/nonexistent/path/model.json"));
        assert!(result.is_err());
    }
}
