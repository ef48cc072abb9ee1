//! Boosted tree-ensemble evaluator
//!
//! Multi-class forest in the round-robin boosting layout: tree `i` adds to
//! class `i mod num_classes`. Prediction walks each tree from node 0 (go
//! left when `features[split] < threshold`), sums leaf weights per class on
//! top of the per-class base score, then applies a stabilized softmax.
//!
//! A tree that hits an out-of-range feature index or exceeds its hop budget
//! (cycle guard) contributes 0 instead of failing the whole prediction.
//!
//! [`TreeEnsembleEvaluator`] is the public contract: either a loaded model
//! or the degraded branch, which answers every prediction with a uniform
//! distribution over the known class count.

use super::tree_format::{parse_document, BaseScore, ForestDescription, TreeArrays};
use crate::error::{InferenceError, ModelLoadError};
use crate::types::ClassProbabilities;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Child index marking a leaf
const LEAF_SENTINEL: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: u32,
        right: u32,
    },
    Leaf {
        weight: f32,
    },
}

/// Outcome of walking one tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TreeWalk {
    Leaf(f32),
    FeatureOutOfRange { feature: usize },
    HopLimit,
}

/// One decision tree; node 0 is the root
#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn from_arrays(index: usize, arrays: TreeArrays) -> Result<Self, ModelLoadError> {
        let invalid = |reason: String| ModelLoadError::Invalid { tree: index, reason };

        let n = arrays.left_children.len();
        if n == 0 {
            return Err(invalid("tree has no nodes".to_string()));
        }
        let lengths = [
            ("rightChildren", arrays.right_children.len()),
            ("splitFeatureIndices", arrays.split_features.len()),
            ("splitThresholds", arrays.split_thresholds.len()),
            ("leafWeights", arrays.leaf_weights.len()),
        ];
        for (name, len) in lengths {
            if len != n {
                return Err(invalid(format!("{} has {} entries, leftChildren has {}", name, len, n)));
            }
        }

        let mut nodes = Vec::new();
        nodes
            .try_reserve_exact(n)
            .map_err(|_| ModelLoadError::Allocation { what: "tree nodes" })?;

        let child = |node: usize, value: i64| -> Result<u32, ModelLoadError> {
            if value < 0 || value as usize >= n {
                return Err(ModelLoadError::Invalid {
                    tree: index,
                    reason: format!("node {} has child index {} outside 0..{}", node, value, n),
                });
            }
            Ok(value as u32)
        };

        for node in 0..n {
            let left = arrays.left_children[node];
            let right = arrays.right_children[node];

            if left == LEAF_SENTINEL {
                let weight = arrays.leaf_weights[node];
                if !weight.is_finite() {
                    return Err(invalid(format!("leaf {} has non-finite weight", node)));
                }
                nodes.push(Node::Leaf { weight: weight as f32 });
                continue;
            }

            let feature = arrays.split_features[node];
            if feature < 0 {
                return Err(invalid(format!("node {} splits on negative feature {}", node, feature)));
            }
            let threshold = arrays.split_thresholds[node];
            if threshold.is_nan() {
                return Err(invalid(format!("node {} has NaN threshold", node)));
            }
            nodes.push(Node::Split {
                feature: feature as usize,
                threshold: threshold as f32,
                left: child(node, left)?,
                right: child(node, right)?,
            });
        }

        Ok(Self { nodes })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Walk from the root to a leaf, visiting at most `max_hops` split nodes
    pub fn walk(&self, features: &[f32], max_hops: usize) -> TreeWalk {
        let mut index = 0usize;
        for _ in 0..=max_hops {
            match self.nodes[index] {
                Node::Leaf { weight } => return TreeWalk::Leaf(weight),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let Some(&value) = features.get(feature) else {
                        return TreeWalk::FeatureOutOfRange { feature };
                    };
                    index = (if value < threshold { left } else { right }) as usize;
                }
            }
        }
        TreeWalk::HopLimit
    }

    fn max_feature_index(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }
}

/// Loader options
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Class count to use when the artifact carries none (bare tree array)
    pub num_classes_hint: Option<usize>,
    /// Hop budget per tree; `None` uses each tree's node count
    pub max_hops: Option<usize>,
    /// Expected feature vector length, used only to warn about mismatches
    pub expected_features: Option<usize>,
}

/// Raw result of one forest evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct TreePrediction {
    pub probabilities: ClassProbabilities,
    /// Per-class raw scores before softmax
    pub raw_scores: Vec<f64>,
    /// Trees whose contribution was dropped (bad feature index or hop limit)
    pub aborted_trees: usize,
}

/// Immutable loaded forest; safe to share across concurrent evaluations
#[derive(Debug, Clone)]
pub struct TreeEnsembleModel {
    trees: Vec<DecisionTree>,
    num_classes: usize,
    base_scores: Vec<f64>,
    max_hops: Option<usize>,
}

impl TreeEnsembleModel {
    /// Load from a JSON artifact on disk
    pub fn from_path(path: &Path, options: &LoadOptions) -> Result<Self, ModelLoadError> {
        if !path.exists() {
            return Err(ModelLoadError::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        Self::from_json_slice(&bytes, options)
    }

    /// Load from JSON text in any supported shape
    pub fn from_json_slice(bytes: &[u8], options: &LoadOptions) -> Result<Self, ModelLoadError> {
        let description = ForestDescription::from(parse_document(bytes)?);
        Self::from_description(description, options)
    }

    fn from_description(description: ForestDescription, options: &LoadOptions) -> Result<Self, ModelLoadError> {
        let num_classes = match description.num_class {
            Some(n) if n.fract() == 0.0 && n >= 2.0 => n as usize,
            Some(n) => {
                return Err(ModelLoadError::Metadata(format!(
                    "numClass must be an integer >= 2, got {}",
                    n
                )))
            }
            None => match options.num_classes_hint {
                Some(n) if n >= 2 => n,
                _ => {
                    return Err(ModelLoadError::Metadata(
                        "artifact has no numClass and no class count was supplied".to_string(),
                    ))
                }
            },
        };

        if description.trees.is_empty() {
            return Err(ModelLoadError::EmptyForest);
        }

        if let Some(tree_classes) = &description.tree_classes {
            if tree_classes.len() != description.trees.len() {
                return Err(ModelLoadError::Metadata(format!(
                    "tree_info has {} entries for {} trees",
                    tree_classes.len(),
                    description.trees.len()
                )));
            }
            if let Some(tree) = tree_classes
                .iter()
                .enumerate()
                .position(|(i, &class)| class != (i % num_classes) as i64)
            {
                return Err(ModelLoadError::Metadata(format!(
                    "tree {} is not in round-robin class order",
                    tree
                )));
            }
        }

        let base_scores = resolve_base_scores(description.base_score.as_ref(), num_classes)?;

        let mut trees = Vec::new();
        trees
            .try_reserve_exact(description.trees.len())
            .map_err(|_| ModelLoadError::Allocation { what: "forest" })?;
        for (index, arrays) in description.trees.into_iter().enumerate() {
            trees.push(DecisionTree::from_arrays(index, arrays)?);
        }

        let model = Self {
            trees,
            num_classes,
            base_scores,
            max_hops: options.max_hops,
        };

        if let (Some(expected), Some(max_feature)) = (options.expected_features, model.max_feature_index()) {
            if max_feature >= expected {
                warn!(
                    "Tree ensemble splits on feature {} but windows provide {} features; affected trees will contribute 0",
                    max_feature, expected
                );
            }
        }

        Ok(model)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn base_scores(&self) -> &[f64] {
        &self.base_scores
    }

    /// Highest feature index any split reads
    pub fn max_feature_index(&self) -> Option<usize> {
        self.trees.iter().filter_map(DecisionTree::max_feature_index).max()
    }

    /// Evaluate against a flattened feature vector
    pub fn evaluate(&self, features: &[f32]) -> TreePrediction {
        let mut raw_scores = self.base_scores.clone();
        let mut aborted_trees = 0;

        for (index, tree) in self.trees.iter().enumerate() {
            let hops = self.max_hops.unwrap_or_else(|| tree.node_count());
            match tree.walk(features, hops) {
                TreeWalk::Leaf(weight) => raw_scores[index % self.num_classes] += weight as f64,
                TreeWalk::FeatureOutOfRange { .. } | TreeWalk::HopLimit => aborted_trees += 1,
            }
        }

        TreePrediction {
            probabilities: ClassProbabilities::from_logits(&raw_scores),
            raw_scores,
            aborted_trees,
        }
    }
}

fn resolve_base_scores(base_score: Option<&BaseScore>, num_classes: usize) -> Result<Vec<f64>, ModelLoadError> {
    let scores = match base_score {
        None => vec![0.0; num_classes],
        Some(BaseScore::Scalar(value)) => {
            let value = value
                .as_f64()
                .ok_or_else(|| ModelLoadError::Metadata("baseScore is not numeric".to_string()))?;
            vec![value; num_classes]
        }
        Some(BaseScore::PerClass(values)) => {
            if values.len() != num_classes {
                return Err(ModelLoadError::Metadata(format!(
                    "baseScore has {} entries for {} classes",
                    values.len(),
                    num_classes
                )));
            }
            values
                .iter()
                .map(|v| v.as_f64())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| ModelLoadError::Metadata("baseScore is not numeric".to_string()))?
        }
    };

    if scores.iter().any(|s| !s.is_finite()) {
        return Err(ModelLoadError::Metadata("baseScore is not finite".to_string()));
    }
    Ok(scores)
}

/// Tree-ensemble predictor with an explicit degraded mode
#[derive(Debug, Clone)]
pub struct TreeEnsembleEvaluator {
    model: Option<Arc<TreeEnsembleModel>>,
    num_classes: usize,
    degraded_reason: Option<String>,
}

impl TreeEnsembleEvaluator {
    pub fn from_model(model: TreeEnsembleModel) -> Self {
        Self {
            num_classes: model.num_classes(),
            model: Some(Arc::new(model)),
            degraded_reason: None,
        }
    }

    /// Degraded evaluator answering with a uniform distribution
    pub fn degraded(num_classes: usize, reason: impl Into<String>) -> Self {
        Self {
            model: None,
            num_classes,
            degraded_reason: Some(reason.into()),
        }
    }

    /// Load a model, falling back to degraded mode on any load error
    ///
    /// `fallback_classes` is the class count the degraded branch reports
    /// (normally detected from the sequence model or label list).
    pub fn load_or_degraded(path: &Path, options: &LoadOptions, fallback_classes: usize) -> Self {
        match TreeEnsembleModel::from_path(path, options) {
            Ok(model) => {
                info!(
                    "Loaded tree ensemble from {}: {} trees, {} classes",
                    path.display(),
                    model.tree_count(),
                    model.num_classes()
                );
                Self::from_model(model)
            }
            Err(e) => {
                error!("Failed to load tree ensemble from {}: {}", path.display(), e);
                Self::degraded(fallback_classes, e.to_string())
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.model.is_none()
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded_reason.as_deref()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn model(&self) -> Option<&Arc<TreeEnsembleModel>> {
        self.model.as_ref()
    }

    /// Full evaluation; `Err(NotLoaded)` in degraded mode
    pub fn evaluate(&self, features: &[f32]) -> Result<TreePrediction, InferenceError> {
        self.model
            .as_ref()
            .map(|model| model.evaluate(features))
            .ok_or(InferenceError::NotLoaded)
    }

    /// Class probabilities; uniform in degraded mode
    pub fn predict(&self, features: &[f32]) -> ClassProbabilities {
        match self.evaluate(features) {
            Ok(prediction) => prediction.probabilities,
            Err(_) => ClassProbabilities::uniform(self.num_classes),
        }
    }
}
