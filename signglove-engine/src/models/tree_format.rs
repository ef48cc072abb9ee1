//! Serialized tree-ensemble shapes accepted by the loader
//!
//! Three JSON shapes describe the same forest:
//! - **Hierarchical**: the gradient-boosting library's native model dump
//!   (`learner.learner_model_param` + `learner.gradient_booster.model.trees`),
//!   with numeric metadata stored as strings and leaf values in
//!   `split_conditions`
//! - **Flat object**: `{ numClass, baseScore, trees: [...] }` with camelCase
//!   parallel arrays per tree
//! - **Tree array**: a bare `[tree, tree, ...]`; the class count must come
//!   from the caller
//!
//! Every shape is normalized into [`ForestDescription`] before validation.

use serde::Deserialize;

/// Number that may be serialized as a JSON number or a numeric string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Numeric::Number(v) => Some(*v),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Base score as a scalar (broadcast to all classes) or one value per class
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum BaseScore {
    PerClass(Vec<Numeric>),
    Scalar(Numeric),
}

#[derive(Debug)]
pub(crate) enum ModelDocument {
    Hierarchical(HierarchicalDocument),
    Flat(FlatDocument),
    TreeArray(Vec<FlatTree>),
}

/// Detect the document shape and deserialize it
///
/// Dispatches on the top-level structure first so a malformed document
/// reports the field that broke instead of a generic no-variant error.
pub(crate) fn parse_document(bytes: &[u8]) -> Result<ModelDocument, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    if value.is_array() {
        Ok(ModelDocument::TreeArray(serde_json::from_value(value)?))
    } else if value.get("learner").is_some() {
        Ok(ModelDocument::Hierarchical(serde_json::from_value(value)?))
    } else {
        Ok(ModelDocument::Flat(serde_json::from_value(value)?))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HierarchicalDocument {
    learner: Learner,
}

#[derive(Debug, Deserialize)]
struct Learner {
    learner_model_param: LearnerModelParam,
    gradient_booster: GradientBooster,
}

#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    num_class: Numeric,
    #[serde(default)]
    base_score: Option<BaseScore>,
}

#[derive(Debug, Deserialize)]
struct GradientBooster {
    model: BoosterModel,
}

#[derive(Debug, Deserialize)]
struct BoosterModel {
    trees: Vec<HierarchicalTree>,
    #[serde(default)]
    tree_info: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
struct HierarchicalTree {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FlatDocument {
    #[serde(alias = "num_class")]
    num_class: Option<Numeric>,
    #[serde(default, alias = "base_score")]
    base_score: Option<BaseScore>,
    trees: Vec<FlatTree>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FlatTree {
    #[serde(alias = "left_children")]
    left_children: Vec<i64>,
    #[serde(alias = "right_children")]
    right_children: Vec<i64>,
    #[serde(alias = "split_feature_indices")]
    split_feature_indices: Vec<i64>,
    #[serde(alias = "split_thresholds")]
    split_thresholds: Vec<f64>,
    #[serde(alias = "leaf_weights")]
    leaf_weights: Vec<f64>,
}

/// Shape-independent description of one tree (parallel arrays by node index)
#[derive(Debug, Clone)]
pub(crate) struct TreeArrays {
    pub left_children: Vec<i64>,
    pub right_children: Vec<i64>,
    pub split_features: Vec<i64>,
    pub split_thresholds: Vec<f64>,
    pub leaf_weights: Vec<f64>,
}

/// Shape-independent forest description, not yet validated
#[derive(Debug, Clone)]
pub(crate) struct ForestDescription {
    pub num_class: Option<f64>,
    pub base_score: Option<BaseScore>,
    pub trees: Vec<TreeArrays>,
    /// Per-tree class assignment, when the artifact records one
    pub tree_classes: Option<Vec<i64>>,
}

impl From<ModelDocument> for ForestDescription {
    fn from(document: ModelDocument) -> Self {
        match document {
            ModelDocument::Hierarchical(doc) => {
                let learner = doc.learner;
                let trees = learner
                    .gradient_booster
                    .model
                    .trees
                    .into_iter()
                    .map(|tree| TreeArrays {
                        // Leaves keep their value in split_conditions
                        leaf_weights: tree.split_conditions.clone(),
                        left_children: tree.left_children,
                        right_children: tree.right_children,
                        split_features: tree.split_indices,
                        split_thresholds: tree.split_conditions,
                    })
                    .collect();
                ForestDescription {
                    num_class: learner.learner_model_param.num_class.as_f64(),
                    base_score: learner.learner_model_param.base_score,
                    trees,
                    tree_classes: learner.gradient_booster.model.tree_info,
                }
            }
            ModelDocument::Flat(doc) => ForestDescription {
                num_class: doc.num_class.and_then(|n| n.as_f64()),
                base_score: doc.base_score,
                trees: doc.trees.into_iter().map(TreeArrays::from).collect(),
                tree_classes: None,
            },
            ModelDocument::TreeArray(trees) => ForestDescription {
                num_class: None,
                base_score: None,
                trees: trees.into_iter().map(TreeArrays::from).collect(),
                tree_classes: None,
            },
        }
    }
}

impl From<FlatTree> for TreeArrays {
    fn from(tree: FlatTree) -> Self {
        TreeArrays {
            left_children: tree.left_children,
            right_children: tree.right_children,
            split_features: tree.split_feature_indices,
            split_thresholds: tree.split_thresholds,
            leaf_weights: tree.leaf_weights,
        }
    }
}
