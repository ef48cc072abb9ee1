//! Per-window inference: both sub-models, fallbacks, fusion
//!
//! The two evaluations are independent and run concurrently on the
//! blocking pool. Each one that fails, panics or overruns the optional
//! budget contributes a uniform distribution for that window only.

use crate::error::{Error, InferenceError, Result};
use crate::fusion::{fuse, FusedDecision, FusionWeights};
use crate::models::{SequenceModelAdapter, TreeEnsembleEvaluator, TreePrediction};
use crate::types::ClassProbabilities;
use crate::window::Window;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// Result of running one window through the engine
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInference {
    pub decision: FusedDecision,
    /// Sequence contribution was a uniform fallback
    pub sequence_fallback: bool,
    /// Tree contribution was a uniform fallback
    pub tree_fallback: bool,
    /// Trees dropped from the tree contribution
    pub aborted_trees: usize,
}

impl WindowInference {
    pub fn fallback_count(&self) -> usize {
        usize::from(self.sequence_fallback) + usize::from(self.tree_fallback)
    }
}

/// Read-only inference pipeline shared by the session's consumer task
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    sequence: Arc<SequenceModelAdapter>,
    tree: Arc<TreeEnsembleEvaluator>,
    weights: FusionWeights,
    residual: f32,
    budget: Option<Duration>,
    num_classes: usize,
}

impl InferenceEngine {
    /// Assemble the engine
    ///
    /// Fails when neither sub-model is loaded or when they disagree on the
    /// class count.
    pub fn new(
        sequence: SequenceModelAdapter,
        tree: TreeEnsembleEvaluator,
        weights: FusionWeights,
    ) -> Result<Self> {
        if sequence.is_degraded() && tree.is_degraded() {
            return Err(Error::Session(format!(
                "no usable model: sequence ({}), tree ensemble ({})",
                sequence.degraded_reason().unwrap_or("unavailable"),
                tree.degraded_reason().unwrap_or("unavailable")
            )));
        }
        if sequence.num_classes() != tree.num_classes() {
            return Err(Error::Session(format!(
                "class count mismatch: sequence model has {}, tree ensemble has {}",
                sequence.num_classes(),
                tree.num_classes()
            )));
        }

        Ok(Self {
            num_classes: tree.num_classes(),
            sequence: Arc::new(sequence),
            tree: Arc::new(tree),
            weights,
            residual: 0.0,
            budget: None,
        })
    }

    /// Value of the trailing residual feature slot
    pub fn with_residual(mut self, residual: f32) -> Self {
        self.residual = residual;
        self
    }

    /// Per-evaluation time budget
    ///
    /// An overrun only replaces that contribution with uniform: the blocking
    /// task keeps its pool thread until the model returns. Tree walks are
    /// bounded by the per-tree hop limit; a sequence runtime must bound itself.
    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.budget = budget;
        self
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn window_length(&self) -> usize {
        self.sequence.window_length()
    }

    pub fn sequence(&self) -> &SequenceModelAdapter {
        &self.sequence
    }

    pub fn tree(&self) -> &TreeEnsembleEvaluator {
        &self.tree
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    /// Run both sub-models on a fixed-length window and fuse
    pub async fn infer(&self, window: &Window) -> WindowInference {
        let sequence_task = (!self.sequence.is_degraded()).then(|| {
            let adapter = Arc::clone(&self.sequence);
            let window = window.clone();
            tokio::task::spawn_blocking(move || adapter.evaluate(&window))
        });
        let tree_task = (!self.tree.is_degraded()).then(|| {
            let evaluator = Arc::clone(&self.tree);
            let features = window.flatten_with_residual(self.residual);
            tokio::task::spawn_blocking(move || evaluator.evaluate(&features))
        });

        let (sequence_result, tree_result) = tokio::join!(
            self.await_task(sequence_task),
            self.await_task(tree_task)
        );

        let (sequence_probs, sequence_fallback) = match sequence_result {
            Ok(probabilities) => (probabilities, false),
            Err(e) => {
                self.log_failure("sequence model", &e);
                (ClassProbabilities::uniform(self.num_classes), true)
            }
        };

        let (tree_probs, tree_fallback, aborted_trees) = match tree_result {
            Ok(TreePrediction {
                probabilities,
                aborted_trees,
                ..
            }) => (probabilities, false, aborted_trees),
            Err(e) => {
                self.log_failure("tree ensemble", &e);
                (ClassProbabilities::uniform(self.num_classes), true, 0)
            }
        };

        let decision = fuse(&sequence_probs, &tree_probs, self.weights)
            .unwrap_or_else(|| FusedDecision::uniform(self.num_classes));

        WindowInference {
            decision,
            sequence_fallback,
            tree_fallback,
            aborted_trees,
        }
    }

    fn await_task<T>(
        &self,
        task: Option<JoinHandle<std::result::Result<T, InferenceError>>>,
    ) -> impl Future<Output = std::result::Result<T, InferenceError>> {
        let budget = self.budget;
        async move {
            let Some(task) = task else {
                return Err(InferenceError::NotLoaded);
            };
            let joined = match budget {
                Some(budget) => match tokio::time::timeout(budget, task).await {
                    Ok(joined) => joined,
                    Err(_) => return Err(InferenceError::Timeout(budget.as_millis() as u64)),
                },
                None => task.await,
            };
            joined.map_err(|e| InferenceError::Join(e.to_string()))?
        }
    }

    fn log_failure(&self, model: &str, error: &InferenceError) {
        // Degraded models fall back on every window; that is reported once at startup
        if *error != InferenceError::NotLoaded {
            warn!("{} evaluation failed, using uniform fallback: {}", model, error);
        }
    }
}
