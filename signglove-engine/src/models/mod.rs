//! Model boundary: tree-ensemble evaluator, sequence adapter, class labels

pub mod labels;
pub mod sequence;
pub mod tree_ensemble;
mod tree_format;

pub use labels::{LabelSet, SymbolKind};
pub use sequence::{SequenceModelAdapter, SequenceRuntime};
pub use tree_ensemble::{LoadOptions, TreeEnsembleEvaluator, TreeEnsembleModel, TreePrediction, TreeWalk};
